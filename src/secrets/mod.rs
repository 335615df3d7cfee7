//! Credential encryption and storage.
//!
//! The [`EnvelopeEncryptor`] is the core of gcredstash: it sends plaintext to
//! the key-management service, stores only the returned ciphertext, and reverses
//! the path on reads.
//!
//! # Value types
//!
//! - [`SecretString`]: plaintext, redacted in `Debug`, `Display` and `Serialize`
//! - [`Ciphertext`]: opaque token from the key-management service
//!
//! # Batches
//!
//! `put_all` and `get_all` report per-entry failures next to the successes
//! ([`PutAllReport`], [`GetAllReport`]) instead of aborting the batch.

pub mod batch;
pub mod encryptor;
pub mod types;

pub use batch::{EntryFailure, GetAllReport, PutAllReport};
pub use encryptor::{validate_name, EnvelopeEncryptor, MAX_NAME_BYTES};
pub use types::{Ciphertext, SecretString};

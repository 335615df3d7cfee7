//! # gcredstash
//!
//! A command-line credential vault. Credentials are encrypted by Google Cloud
//! KMS (envelope encryption: the key never leaves KMS) and only the resulting
//! ciphertext is stored, one Cloud Datastore entity per credential.
//!
//! ## Architecture
//!
//! ```text
//! CLI (Dispatcher) → EnvelopeEncryptor → KeyManagementService (Cloud KMS)
//!                                      ↘ SecretStore → DocumentStore (Cloud Datastore)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use gcredstash::config::ConfigLayer;
//! use gcredstash::cli::{Dispatcher, OutputFormat};
//!
//! # async fn run() -> gcredstash::Result<()> {
//! let config = ConfigLayer::from_env()?.resolve()?;
//! let dispatcher = Dispatcher::connect(config, OutputFormat::Json)?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod google;
pub mod kms;
pub mod observability;
pub mod secrets;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types and traits
pub use config::Config;
pub use errors::{Result, VaultError};
pub use secrets::{EnvelopeEncryptor, SecretString};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

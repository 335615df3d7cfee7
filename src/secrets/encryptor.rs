//! Envelope Encryptor.
//!
//! Plaintext goes to Cloud KMS as base64, the returned ciphertext token goes to
//! the [`SecretStore`]; reads reverse the path. No cryptography happens here.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::batch::{EntryFailure, GetAllReport, PutAllReport};
use super::{Ciphertext, SecretString};
use crate::errors::{RemoteService, Result, VaultError};
use crate::kms::{
    CryptoKey, CryptoKeyName, CryptoKeyPurpose, KeyManagementService, KeyRing, KeyRingName,
    LocationName,
};
use crate::store::SecretStore;

/// Longest credential name the document store accepts, in bytes
pub const MAX_NAME_BYTES: usize = 1500;

/// Reject names the document store cannot key on.
///
/// Runs before any remote call.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::invalid_argument("name", "must not be empty"));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(VaultError::invalid_argument(
            "name",
            format!("must be at most {} bytes, got {}", MAX_NAME_BYTES, name.len()),
        ));
    }
    if name.len() >= 4 && name.starts_with("__") && name.ends_with("__") {
        return Err(VaultError::invalid_argument(
            "name",
            format!("'{}' is reserved (names of the form __*__)", name),
        ));
    }
    Ok(())
}

/// Credential operations over a key-management service and a Secret Store
#[derive(Debug, Clone)]
pub struct EnvelopeEncryptor {
    kms: Arc<dyn KeyManagementService>,
    store: SecretStore,
    batch_concurrency: usize,
}

impl EnvelopeEncryptor {
    pub fn new(kms: Arc<dyn KeyManagementService>, store: SecretStore) -> Self {
        Self { kms, store, batch_concurrency: 1 }
    }

    /// Number of batch entries in flight at once; 1 keeps batches sequential
    pub fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency.max(1);
        self
    }

    pub fn batch_concurrency(&self) -> usize {
        self.batch_concurrency
    }

    /// Encrypt a plaintext value under `key`
    pub async fn encrypt(&self, key: &CryptoKeyName, plaintext: &SecretString) -> Result<Ciphertext> {
        let encoded = SecretString::new(STANDARD.encode(plaintext.expose_secret()));
        let token = self.kms.encrypt(key, encoded.expose_secret()).await?;

        if token.is_empty() {
            return Err(VaultError::remote(
                RemoteService::KeyManagement,
                None,
                "encrypt returned an empty ciphertext",
            ));
        }
        Ok(Ciphertext::new(token))
    }

    /// Decrypt a ciphertext token produced under `key`
    pub async fn decrypt(&self, key: &CryptoKeyName, ciphertext: &Ciphertext) -> Result<SecretString> {
        let encoded = SecretString::new(self.kms.decrypt(key, ciphertext.as_str()).await?);

        let bytes = STANDARD.decode(encoded.expose_secret()).map_err(|e| {
            VaultError::remote(
                RemoteService::KeyManagement,
                None,
                format!("decrypt returned invalid base64: {}", e),
            )
        })?;

        SecretString::from_utf8(bytes).map_err(|_| {
            VaultError::remote(
                RemoteService::KeyManagement,
                None,
                "decrypted plaintext is not valid UTF-8",
            )
        })
    }

    /// Plaintext of `name`, or `None` when no record exists
    pub async fn get(
        &self,
        key: &CryptoKeyName,
        collection: &str,
        name: &str,
    ) -> Result<Option<SecretString>> {
        validate_name(name)?;

        let Some(ciphertext) = self.store.get(collection, name).await? else {
            return Ok(None);
        };

        let plaintext = self.decrypt(key, &ciphertext).await?;
        debug!(collection, name, "Decrypted credential");
        Ok(Some(plaintext))
    }

    /// Encrypt `value` and store it under `name`, replacing any previous value
    pub async fn put(
        &self,
        key: &CryptoKeyName,
        collection: &str,
        name: &str,
        value: &SecretString,
    ) -> Result<()> {
        validate_name(name)?;

        let ciphertext = self.encrypt(key, value).await?;
        self.store.put(collection, name, &ciphertext).await?;

        info!(collection, name, "Stored credential");
        Ok(())
    }

    /// `put` every entry. Earlier successes stay committed when a later entry fails.
    pub async fn put_all(
        &self,
        key: &CryptoKeyName,
        collection: &str,
        credentials: BTreeMap<String, SecretString>,
    ) -> PutAllReport {
        let total = credentials.len();
        let results: Vec<(String, Result<()>)> = stream::iter(credentials)
            .map(|(name, value)| async move {
                let result = self.put(key, collection, &name, &value).await;
                (name, result)
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        let mut report = PutAllReport::default();
        for (name, result) in results {
            match result {
                Ok(()) => report.stored.push(name),
                Err(error) => {
                    warn!(collection, name = %name, error = %error, "Failed to store credential");
                    report.failures.push(EntryFailure::new(name, error));
                }
            }
        }
        report.stored.sort();
        report.failures.sort_by(|a, b| a.name.cmp(&b.name));

        info!(collection, total, failed = report.failures.len(), "put-all finished");
        report
    }

    /// Decrypt every credential in the collection.
    ///
    /// Fails as a whole only when the collection cannot be listed.
    pub async fn get_all(&self, key: &CryptoKeyName, collection: &str) -> Result<GetAllReport> {
        let names = self.store.list(collection).await?;
        let total = names.len();

        let results: Vec<(String, Result<Option<SecretString>>)> = stream::iter(names)
            .map(|name| async move {
                let result = self.get(key, collection, &name).await;
                (name, result)
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        let mut report = GetAllReport::default();
        for (name, result) in results {
            match result {
                Ok(Some(value)) => {
                    report.credentials.insert(name, value);
                }
                // Listed but unreadable by name: deleted meanwhile, or keyed by numeric id.
                Ok(None) => {
                    warn!(collection, name = %name, "Listed credential has no record");
                    let error = VaultError::not_found(collection, name.as_str());
                    report.failures.push(EntryFailure::new(name, error));
                }
                Err(error) => {
                    warn!(collection, name = %name, error = %error, "Failed to decrypt credential");
                    report.failures.push(EntryFailure::new(name, error));
                }
            }
        }
        report.failures.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(collection, total, failed = report.failures.len(), "get-all finished");
        Ok(report)
    }

    /// Credential names in the collection, sorted
    pub async fn list(&self, collection: &str) -> Result<Vec<String>> {
        let mut names = self.store.list(collection).await?;
        names.sort();
        Ok(names)
    }

    /// Provision a key ring under `parent`
    pub async fn create_key_ring(&self, parent: &LocationName, key_ring_id: &str) -> Result<KeyRing> {
        self.kms.create_key_ring(parent, key_ring_id).await
    }

    /// Provision an encrypt/decrypt key in `key_ring`
    pub async fn create_key(&self, key_ring: &KeyRingName, crypto_key_id: &str) -> Result<CryptoKey> {
        self.kms.create_crypto_key(key_ring, crypto_key_id, CryptoKeyPurpose::EncryptDecrypt).await
    }
}

//! In-memory doubles of the key-management service and the document store.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::errors::{RemoteService, Result, VaultError};
use crate::kms::{
    CryptoKey, CryptoKeyName, CryptoKeyPurpose, KeyManagementService, KeyRing, KeyRingName,
    LocationName,
};
use crate::store::{DocumentStore, Entity, EntityKey, PropertyValue, CIPHER_PROPERTY};

const MASK: u8 = 0x5a;

fn kms_error(status: u16, message: &str) -> VaultError {
    VaultError::remote(RemoteService::KeyManagement, Some(status), message)
}

/// Key-management double.
///
/// Ciphertext is bound to the key that produced it and carries a nonce, so
/// equal plaintexts encrypt differently.
#[derive(Debug, Default)]
pub struct FakeKms {
    key_rings: Mutex<HashSet<String>>,
    crypto_keys: Mutex<HashSet<String>>,
    failing_encrypts: Mutex<HashSet<String>>,
    failing_decrypts: Mutex<HashSet<String>>,
    nonce: AtomicUsize,
    pub encrypt_calls: AtomicUsize,
    pub decrypt_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl FakeKms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: &CryptoKeyName) -> Self {
        let kms = Self::new();
        kms.register_key(key);
        kms
    }

    pub fn register_key(&self, key: &CryptoKeyName) {
        self.key_rings.lock().unwrap().insert(key.key_ring().to_string());
        self.crypto_keys.lock().unwrap().insert(key.to_string());
    }

    /// Make `encrypt` fail for this plaintext
    pub fn fail_encrypt_of(&self, plaintext: &str) {
        self.failing_encrypts.lock().unwrap().insert(plaintext.to_string());
    }

    /// Make `decrypt` fail for ciphertext of this plaintext
    pub fn fail_decrypt_of(&self, plaintext: &str) {
        self.failing_decrypts.lock().unwrap().insert(plaintext.to_string());
    }

    fn require_key(&self, name: &CryptoKeyName) -> Result<()> {
        if self.crypto_keys.lock().unwrap().contains(&name.to_string()) {
            Ok(())
        } else {
            Err(kms_error(404, "CryptoKey not found"))
        }
    }

    fn plaintext_of(encoded: &str) -> String {
        STANDARD
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl KeyManagementService for FakeKms {
    async fn encrypt(&self, name: &CryptoKeyName, plaintext_b64: &str) -> Result<String> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.require_key(name)?;

        if self.failing_encrypts.lock().unwrap().contains(&Self::plaintext_of(plaintext_b64)) {
            return Err(kms_error(503, "injected encrypt failure"));
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let envelope = format!("{}|{}|{}", name, nonce, plaintext_b64);
        let masked: Vec<u8> = envelope.bytes().map(|b| b ^ MASK).collect();
        Ok(STANDARD.encode(masked))
    }

    async fn decrypt(&self, name: &CryptoKeyName, ciphertext: &str) -> Result<String> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.require_key(name)?;

        let masked = STANDARD.decode(ciphertext).map_err(|_| kms_error(400, "invalid ciphertext"))?;
        let envelope = String::from_utf8(masked.into_iter().map(|b| b ^ MASK).collect())
            .map_err(|_| kms_error(400, "invalid ciphertext"))?;

        let mut parts = envelope.splitn(3, '|');
        let (Some(key), Some(_nonce), Some(plaintext_b64)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(kms_error(400, "invalid ciphertext"));
        };

        if key != name.to_string() {
            return Err(kms_error(400, "Decryption failed: the ciphertext is invalid"));
        }
        if self.failing_decrypts.lock().unwrap().contains(&Self::plaintext_of(plaintext_b64)) {
            return Err(kms_error(503, "injected decrypt failure"));
        }
        Ok(plaintext_b64.to_string())
    }

    async fn create_key_ring(&self, parent: &LocationName, key_ring_id: &str) -> Result<KeyRing> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let name = parent.key_ring(key_ring_id).to_string();
        if !self.key_rings.lock().unwrap().insert(name.clone()) {
            return Err(VaultError::conflict(name));
        }
        Ok(KeyRing { name, create_time: None })
    }

    async fn create_crypto_key(
        &self,
        parent: &KeyRingName,
        crypto_key_id: &str,
        purpose: CryptoKeyPurpose,
    ) -> Result<CryptoKey> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.key_rings.lock().unwrap().contains(&parent.to_string()) {
            return Err(kms_error(404, "KeyRing not found"));
        }
        let name = parent.crypto_key(crypto_key_id).to_string();
        if !self.crypto_keys.lock().unwrap().insert(name.clone()) {
            return Err(VaultError::conflict(name));
        }
        Ok(CryptoKey { name, purpose: Some(purpose), create_time: None })
    }
}

/// Document-store double keeping entities in a sorted map
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    entities: Mutex<BTreeMap<EntityKey, Entity>>,
    fail_lookup: Mutex<Option<String>>,
    fail_query: Mutex<Option<String>>,
    listed_only: Mutex<Vec<EntityKey>>,
    operations: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, kind: &str, name: &str) -> Option<Entity> {
        self.entities.lock().unwrap().get(&EntityKey::new(kind, name)).cloned()
    }

    /// Raw bytes of the `cipher` property
    pub fn cipher(&self, kind: &str, name: &str) -> Option<Vec<u8>> {
        let entity = self.entity(kind, name)?;
        match &entity.property(CIPHER_PROPERTY)?.value {
            PropertyValue::Blob(bytes) => Some(bytes.clone()),
            PropertyValue::String(text) => Some(text.clone().into_bytes()),
        }
    }

    pub fn fail_next_lookup(&self, message: &str) {
        *self.fail_lookup.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_next_query(&self, message: &str) {
        *self.fail_query.lock().unwrap() = Some(message.to_string());
    }

    /// Report `name` from `query_keys` while `lookup` never finds it
    pub fn list_without_record(&self, kind: &str, name: &str) {
        self.listed_only.lock().unwrap().push(EntityKey::new(kind, name));
    }

    /// Lookups, upserts and queries served so far
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn lookup(&self, key: &EntityKey) -> Result<Option<Entity>> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_lookup.lock().unwrap().take() {
            return Err(VaultError::remote(RemoteService::DocumentStore, Some(403), message));
        }
        Ok(self.entities.lock().unwrap().get(key).cloned())
    }

    async fn upsert(&self, entity: Entity) -> Result<()> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        self.entities.lock().unwrap().insert(entity.key.clone(), entity);
        Ok(())
    }

    async fn query_keys(&self, kind: &str) -> Result<Vec<EntityKey>> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_query.lock().unwrap().take() {
            return Err(VaultError::remote(RemoteService::DocumentStore, Some(503), message));
        }
        let mut keys: Vec<EntityKey> =
            self.entities.lock().unwrap().keys().filter(|key| key.kind == kind).cloned().collect();
        keys.extend(self.listed_only.lock().unwrap().iter().filter(|key| key.kind == kind).cloned());
        Ok(keys)
    }
}

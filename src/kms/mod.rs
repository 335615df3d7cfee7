//! Key-management collaborator.
//!
//! [`KeyManagementService`] is the contract gcredstash needs from Cloud KMS:
//! encrypt and decrypt base64 payloads under a crypto key, and provision key
//! rings and keys. [`CloudKmsClient`] implements it over the REST API.

pub mod client;
pub mod resource;

pub use client::CloudKmsClient;
pub use resource::{CryptoKeyName, KeyRingName, LocationName};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// What a crypto key may be used for. gcredstash only creates symmetric keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CryptoKeyPurpose {
    EncryptDecrypt,
}

/// A provisioned key ring, as reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRing {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

/// A provisioned crypto key, as reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoKey {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<CryptoKeyPurpose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
}

/// External key-management service.
///
/// Payloads are base64 text on both sides of the call, mirroring the wire
/// format; ciphertext is opaque to callers.
#[async_trait]
pub trait KeyManagementService: Send + Sync + std::fmt::Debug {
    /// Encrypt `plaintext_b64` under the key `name`, returning the ciphertext token
    async fn encrypt(&self, name: &CryptoKeyName, plaintext_b64: &str) -> Result<String>;

    /// Decrypt a ciphertext token produced by the same key, returning base64 plaintext
    async fn decrypt(&self, name: &CryptoKeyName, ciphertext: &str) -> Result<String>;

    /// Create key ring `key_ring_id` under `parent`
    async fn create_key_ring(&self, parent: &LocationName, key_ring_id: &str) -> Result<KeyRing>;

    /// Create crypto key `crypto_key_id` under `parent`
    async fn create_crypto_key(
        &self,
        parent: &KeyRingName,
        crypto_key_id: &str,
        purpose: CryptoKeyPurpose,
    ) -> Result<CryptoKey>;
}

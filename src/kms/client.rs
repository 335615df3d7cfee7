//! Cloud KMS REST client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    CryptoKey, CryptoKeyName, CryptoKeyPurpose, KeyManagementService, KeyRing, KeyRingName,
    LocationName,
};
use crate::auth::TokenProvider;
use crate::errors::{RemoteService, Result, VaultError};
use crate::google::GoogleApiClient;

#[derive(Serialize)]
struct EncryptRequest<'a> {
    plaintext: &'a str,
}

#[derive(Deserialize)]
struct EncryptResponse {
    ciphertext: String,
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
    ciphertext: &'a str,
}

#[derive(Deserialize)]
struct DecryptResponse {
    // Omitted by the service when the plaintext is empty.
    #[serde(default)]
    plaintext: String,
}

#[derive(Serialize)]
struct CreateCryptoKeyRequest {
    purpose: CryptoKeyPurpose,
}

/// [`KeyManagementService`] backed by `cloudkms.googleapis.com`
#[derive(Debug, Clone)]
pub struct CloudKmsClient {
    api: GoogleApiClient,
}

impl CloudKmsClient {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let api = GoogleApiClient::new(RemoteService::KeyManagement, endpoint, timeout, tokens)?;
        debug!(endpoint = %api.base_url(), "Cloud KMS client ready");
        Ok(Self { api })
    }
}

/// Treat HTTP 409 on a create call as the resource already existing
fn conflict_on_409(err: VaultError, resource: String) -> VaultError {
    match err.remote_status() {
        Some(409) => VaultError::conflict(resource),
        _ => err,
    }
}

#[async_trait]
impl KeyManagementService for CloudKmsClient {
    async fn encrypt(&self, name: &CryptoKeyName, plaintext_b64: &str) -> Result<String> {
        let response: EncryptResponse = self
            .api
            .post_json(
                "encrypt",
                &format!("{}:encrypt", name),
                &[],
                &EncryptRequest { plaintext: plaintext_b64 },
            )
            .await?;
        Ok(response.ciphertext)
    }

    async fn decrypt(&self, name: &CryptoKeyName, ciphertext: &str) -> Result<String> {
        let response: DecryptResponse = self
            .api
            .post_json(
                "decrypt",
                &format!("{}:decrypt", name),
                &[],
                &DecryptRequest { ciphertext },
            )
            .await?;
        Ok(response.plaintext)
    }

    async fn create_key_ring(&self, parent: &LocationName, key_ring_id: &str) -> Result<KeyRing> {
        let key_ring: KeyRing = self
            .api
            .post_json(
                "create_key_ring",
                &format!("{}/keyRings", parent),
                &[("keyRingId", key_ring_id)],
                &serde_json::json!({}),
            )
            .await
            .map_err(|e| conflict_on_409(e, parent.key_ring(key_ring_id).to_string()))?;

        info!(key_ring = %key_ring.name, "Created key ring");
        Ok(key_ring)
    }

    async fn create_crypto_key(
        &self,
        parent: &KeyRingName,
        crypto_key_id: &str,
        purpose: CryptoKeyPurpose,
    ) -> Result<CryptoKey> {
        let crypto_key: CryptoKey = self
            .api
            .post_json(
                "create_crypto_key",
                &format!("{}/cryptoKeys", parent),
                &[("cryptoKeyId", crypto_key_id)],
                &CreateCryptoKeyRequest { purpose },
            )
            .await
            .map_err(|e| conflict_on_409(e, parent.crypto_key(crypto_key_id).to_string()))?;

        info!(crypto_key = %crypto_key.name, "Created crypto key");
        Ok(crypto_key)
    }
}

//! Secret Store: (collection, name) → ciphertext

use std::sync::Arc;
use tracing::debug;

use super::{DocumentStore, Entity, EntityKey, Property, PropertyValue};
use crate::errors::{RemoteService, Result, VaultError};
use crate::secrets::Ciphertext;

/// Property holding the ciphertext token
pub const CIPHER_PROPERTY: &str = "cipher";

/// Cipher records in a document store. Does not retry.
#[derive(Debug, Clone)]
pub struct SecretStore {
    store: Arc<dyn DocumentStore>,
}

impl SecretStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Stored ciphertext, or `None` when no record exists
    pub async fn get(&self, collection: &str, name: &str) -> Result<Option<Ciphertext>> {
        let key = EntityKey::new(collection, name);
        let Some(entity) = self.store.lookup(&key).await? else {
            debug!(collection, name, "No cipher record");
            return Ok(None);
        };

        let bytes = match entity.property(CIPHER_PROPERTY).map(|p| &p.value) {
            Some(PropertyValue::Blob(bytes)) => bytes.clone(),
            Some(PropertyValue::String(text)) => text.clone().into_bytes(),
            None => {
                return Err(malformed(collection, name, "record has no cipher property"));
            }
        };

        Ciphertext::from_stored_bytes(bytes)
            .map(Some)
            .map_err(|_| malformed(collection, name, "cipher property is not valid UTF-8"))
    }

    /// Insert or overwrite the record for (collection, name)
    pub async fn put(&self, collection: &str, name: &str, ciphertext: &Ciphertext) -> Result<()> {
        let entity = Entity::new(EntityKey::new(collection, name))
            .with_property(CIPHER_PROPERTY, Property::unindexed_blob(ciphertext.as_bytes()));

        self.store.upsert(entity).await?;
        debug!(collection, name, "Stored cipher record");
        Ok(())
    }

    /// Names of every record in the collection, in store order
    pub async fn list(&self, collection: &str) -> Result<Vec<String>> {
        let keys = self.store.query_keys(collection).await?;
        Ok(keys.into_iter().map(|key| key.name).collect())
    }
}

fn malformed(collection: &str, name: &str, reason: &str) -> VaultError {
    VaultError::remote(
        RemoteService::DocumentStore,
        None,
        format!("{} ({}/{})", reason, collection, name),
    )
}

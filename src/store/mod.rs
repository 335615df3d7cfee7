//! Document-store collaborator and the Secret Store built on it.
//!
//! [`DocumentStore`] is the minimal slice of a Datastore-like database that
//! gcredstash needs: point lookup, upsert and a keys-only scan of one kind.
//! [`SecretStore`] maps (collection, name) to a single non-indexed `cipher`
//! blob on top of it.

pub mod datastore;
pub mod secret_store;

pub use datastore::DatastoreClient;
pub use secret_store::{SecretStore, CIPHER_PROPERTY};

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::errors::Result;

/// Key of an entity: its kind (collection) and string name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self { kind: kind.into(), name: name.into() }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Blob(Vec<u8>),
    String(String),
}

// Values may hold ciphertext.
impl std::fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob(bytes) => write!(f, "Blob({} bytes)", bytes.len()),
            Self::String(s) => write!(f, "String({} bytes)", s.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub value: PropertyValue,
    pub exclude_from_indexes: bool,
}

impl Property {
    /// A blob property kept out of every index
    pub fn unindexed_blob(bytes: impl Into<Vec<u8>>) -> Self {
        Self { value: PropertyValue::Blob(bytes.into()), exclude_from_indexes: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub key: EntityKey,
    pub properties: BTreeMap<String, Property>,
}

impl Entity {
    pub fn new(key: EntityKey) -> Self {
        Self { key, properties: BTreeMap::new() }
    }

    pub fn with_property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }
}

/// External document store
#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Fetch one entity. A missing entity is `Ok(None)`.
    async fn lookup(&self, key: &EntityKey) -> Result<Option<Entity>>;

    /// Insert or replace an entity
    async fn upsert(&self, entity: Entity) -> Result<()>;

    /// Every key of `kind`, in store order
    async fn query_keys(&self, kind: &str) -> Result<Vec<EntityKey>>;
}

//! Cloud Datastore REST client.
//!
//! Uses three RPCs of the `v1` API:
//! - `projects/{project}:lookup` for point reads
//! - `projects/{project}:commit` with one non-transactional `upsert` mutation
//! - `projects/{project}:runQuery` with a `__key__` projection, paged on
//!   `endCursor` while the batch reports `NOT_FINISHED`
//!
//! Works against the Datastore emulator when built with an anonymous token
//! provider and the emulator's `http://host:port` endpoint.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{DocumentStore, Entity, EntityKey, Property, PropertyValue};
use crate::auth::TokenProvider;
use crate::errors::{RemoteService, Result, VaultError};
use crate::google::GoogleApiClient;

/// Cap on query pages, so a server that never finishes cannot loop forever
const MAX_QUERY_PAGES: usize = 10_000;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct WirePartitionId {
    project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct WirePathElement {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct WireKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    partition_id: Option<WirePartitionId>,
    path: Vec<WirePathElement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blob_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    exclude_from_indexes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEntity {
    key: WireKey,
    #[serde(default)]
    properties: BTreeMap<String, WireValue>,
}

#[derive(Serialize)]
struct LookupRequest<'a> {
    keys: [&'a WireKey; 1],
}

#[derive(Deserialize)]
struct EntityResult {
    entity: WireEntity,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    found: Vec<EntityResult>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Mutation {
    upsert: WireEntity,
}

#[derive(Serialize)]
struct CommitRequest {
    mode: &'static str,
    mutations: Vec<Mutation>,
}

#[derive(Deserialize)]
struct CommitResponse {}

#[derive(Serialize)]
struct KindExpression<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct PropertyReference {
    name: &'static str,
}

#[derive(Serialize)]
struct Projection {
    property: PropertyReference,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Query<'a> {
    kind: [KindExpression<'a>; 1],
    projection: [Projection; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryRequest<'a> {
    partition_id: WirePartitionId,
    query: Query<'a>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBatch {
    #[serde(default)]
    entity_results: Vec<EntityResult>,
    #[serde(default)]
    end_cursor: Option<String>,
    #[serde(default)]
    more_results: Option<String>,
}

#[derive(Deserialize)]
struct RunQueryResponse {
    batch: QueryBatch,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`DocumentStore`] backed by Cloud Datastore (or its emulator)
#[derive(Debug, Clone)]
pub struct DatastoreClient {
    api: GoogleApiClient,
    project_id: String,
    namespace: Option<String>,
}

impl DatastoreClient {
    pub fn new(
        project_id: impl Into<String>,
        namespace: Option<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let api = GoogleApiClient::new(RemoteService::DocumentStore, endpoint, timeout, tokens)?;
        let namespace = namespace.filter(|ns| !ns.is_empty());
        debug!(endpoint = %api.base_url(), namespace = ?namespace, "Datastore client ready");
        Ok(Self { api, project_id: project_id.into(), namespace })
    }

    fn partition(&self) -> WirePartitionId {
        WirePartitionId { project_id: self.project_id.clone(), namespace_id: self.namespace.clone() }
    }

    fn wire_key(&self, key: &EntityKey) -> WireKey {
        WireKey {
            partition_id: Some(self.partition()),
            path: vec![WirePathElement {
                kind: key.kind.clone(),
                name: Some(key.name.clone()),
                id: None,
            }],
        }
    }

    fn rpc_path(&self, method: &str) -> String {
        format!("projects/{}:{}", self.project_id, method)
    }
}

fn entity_key(key: WireKey) -> Result<EntityKey> {
    let element = key.path.into_iter().last().ok_or_else(|| {
        VaultError::remote(RemoteService::DocumentStore, None, "entity key has an empty path")
    })?;

    let name = element.name.or(element.id).ok_or_else(|| {
        VaultError::remote(RemoteService::DocumentStore, None, "entity key has no name or id")
    })?;

    Ok(EntityKey { kind: element.kind, name })
}

fn decode_blob(encoded: &str) -> Result<Vec<u8>> {
    STANDARD.decode(encoded).or_else(|_| URL_SAFE.decode(encoded)).map_err(|e| {
        VaultError::remote(RemoteService::DocumentStore, None, format!("invalid blobValue: {}", e))
    })
}

fn from_wire(entity: WireEntity) -> Result<Entity> {
    let mut properties = BTreeMap::new();
    for (name, value) in entity.properties {
        let decoded = match (value.blob_value, value.string_value) {
            (Some(blob), _) => PropertyValue::Blob(decode_blob(&blob)?),
            (None, Some(text)) => PropertyValue::String(text),
            // Other value types are not used by gcredstash.
            (None, None) => continue,
        };
        properties.insert(
            name,
            Property { value: decoded, exclude_from_indexes: value.exclude_from_indexes },
        );
    }

    Ok(Entity { key: entity_key(entity.key)?, properties })
}

fn to_wire_properties(properties: BTreeMap<String, Property>) -> BTreeMap<String, WireValue> {
    properties
        .into_iter()
        .map(|(name, property)| {
            let mut value =
                WireValue { exclude_from_indexes: property.exclude_from_indexes, ..Default::default() };
            match property.value {
                PropertyValue::Blob(bytes) => value.blob_value = Some(STANDARD.encode(bytes)),
                PropertyValue::String(text) => value.string_value = Some(text),
            }
            (name, value)
        })
        .collect()
}

#[async_trait]
impl DocumentStore for DatastoreClient {
    async fn lookup(&self, key: &EntityKey) -> Result<Option<Entity>> {
        let wire_key = self.wire_key(key);
        let response: LookupResponse = self
            .api
            .post_json("lookup", &self.rpc_path("lookup"), &[], &LookupRequest { keys: [&wire_key] })
            .await?;

        response.found.into_iter().next().map(|result| from_wire(result.entity)).transpose()
    }

    async fn upsert(&self, entity: Entity) -> Result<()> {
        let request = CommitRequest {
            mode: "NON_TRANSACTIONAL",
            mutations: vec![Mutation {
                upsert: WireEntity {
                    key: self.wire_key(&entity.key),
                    properties: to_wire_properties(entity.properties),
                },
            }],
        };

        let _: CommitResponse =
            self.api.post_json("commit", &self.rpc_path("commit"), &[], &request).await?;
        Ok(())
    }

    async fn query_keys(&self, kind: &str) -> Result<Vec<EntityKey>> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..MAX_QUERY_PAGES {
            let request = RunQueryRequest {
                partition_id: self.partition(),
                query: Query {
                    kind: [KindExpression { name: kind }],
                    projection: [Projection { property: PropertyReference { name: "__key__" } }],
                    start_cursor: cursor.clone(),
                },
            };

            let response: RunQueryResponse =
                self.api.post_json("run_query", &self.rpc_path("runQuery"), &[], &request).await?;
            let batch = response.batch;

            for result in batch.entity_results {
                keys.push(entity_key(result.entity.key)?);
            }

            let not_finished = batch.more_results.as_deref() == Some("NOT_FINISHED");
            let advanced = batch.end_cursor.is_some() && batch.end_cursor != cursor;
            if !(not_finished && advanced) {
                debug!(kind, pages = page + 1, keys = keys.len(), "Query complete");
                return Ok(keys);
            }
            cursor = batch.end_cursor;
        }

        Err(VaultError::remote(
            RemoteService::DocumentStore,
            None,
            format!("query over kind '{}' did not finish after {} pages", kind, MAX_QUERY_PAGES),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_wire_format() {
        let properties = BTreeMap::from([(
            "cipher".to_string(),
            Property::unindexed_blob(b"CiQA".to_vec()),
        )]);

        let json = serde_json::to_value(to_wire_properties(properties)).unwrap();
        assert_eq!(json, json!({"cipher": {"blobValue": "Q2lRQQ==", "excludeFromIndexes": true}}));
    }

    #[test]
    fn test_entity_from_lookup_response() {
        let entity: WireEntity = serde_json::from_value(json!({
            "key": {
                "partitionId": {"projectId": "p"},
                "path": [{"kind": "Credentials", "name": "DB"}]
            },
            "properties": {
                "cipher": {"blobValue": "Q2lRQQ==", "excludeFromIndexes": true},
                "owner": {"stringValue": "ops"},
                "count": {"integerValue": "3"}
            }
        }))
        .unwrap();

        let entity = from_wire(entity).unwrap();
        assert_eq!(entity.key, EntityKey::new("Credentials", "DB"));
        assert_eq!(entity.property("cipher").unwrap().value, PropertyValue::Blob(b"CiQA".to_vec()));
        assert_eq!(
            entity.property("owner").unwrap().value,
            PropertyValue::String("ops".to_string())
        );
        assert!(entity.property("count").is_none());
    }

    #[test]
    fn test_numeric_id_keys_use_id_as_name() {
        let key = WireKey {
            partition_id: None,
            path: vec![WirePathElement { kind: "K".into(), name: None, id: Some("42".into()) }],
        };
        assert_eq!(entity_key(key).unwrap(), EntityKey::new("K", "42"));
    }

    #[test]
    fn test_namespace_in_partition() {
        let client = DatastoreClient::new(
            "p",
            Some("staging".to_string()),
            "http://localhost:8081",
            Duration::from_secs(1),
            Arc::new(crate::auth::AnonymousTokenProvider),
        )
        .unwrap();

        let key = serde_json::to_value(client.wire_key(&EntityKey::new("Credentials", "DB"))).unwrap();
        assert_eq!(
            key,
            json!({
                "partitionId": {"projectId": "p", "namespaceId": "staging"},
                "path": [{"kind": "Credentials", "name": "DB"}]
            })
        );
    }

    #[test]
    fn test_empty_namespace_is_default_namespace() {
        let client = DatastoreClient::new(
            "p",
            Some(String::new()),
            "http://localhost:8081",
            Duration::from_secs(1),
            Arc::new(crate::auth::AnonymousTokenProvider),
        )
        .unwrap();
        assert!(client.partition().namespace_id.is_none());
    }
}

//! Stateful wiremock fake of the Google REST APIs used by gcredstash.
//!
//! One mock server answers both APIs:
//! - Cloud KMS `:encrypt` / `:decrypt` and key ring / crypto key creation
//! - Cloud Datastore `:lookup`, `:commit` and `:runQuery` (two keys per page)
//!
//! Ciphertext is `base64("ct|{key}|{plaintext_b64}")`, so decrypting with a
//! different key fails the way Cloud KMS does.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{header, method, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use gcredstash::config::{Config, DatastoreEndpoint};
use gcredstash::SecretString;

pub const PROJECT: &str = "test-project";
pub const KEY_RING: &str = "vault";
pub const CRYPTO_KEY: &str = "credentials";
pub const TOKEN: &str = "ya29.test-token";
pub const PAGE_SIZE: usize = 2;

/// (namespace, kind, name)
type EntityId = (String, String, String);

#[derive(Default)]
struct State {
    key_rings: BTreeSet<String>,
    crypto_keys: BTreeSet<String>,
    entities: BTreeMap<EntityId, Value>,
}

pub struct FakeGoogle {
    pub server: MockServer,
    state: Arc<Mutex<State>>,
}

fn google_error(status: u16, code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": {"code": status, "message": message, "status": code}
    }))
}

fn body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap_or(Value::Null)
}

/// Resource name from `/v1/{name}:{verb}`
fn resource(request: &Request, verb: &str) -> String {
    let path = request.url.path();
    path.trim_start_matches("/v1/").trim_end_matches(verb).to_string()
}

fn query(request: &Request, key: &str) -> Option<String> {
    request.url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
}

fn entity_id(key: &Value) -> EntityId {
    let namespace = key["partitionId"]["namespaceId"].as_str().unwrap_or("").to_string();
    let element = &key["path"][0];
    (
        namespace,
        element["kind"].as_str().unwrap_or("").to_string(),
        element["name"].as_str().unwrap_or("").to_string(),
    )
}

impl FakeGoogle {
    /// Start the fake with the default key ring and crypto key provisioned
    pub async fn start() -> Self {
        let fake = Self::start_empty().await;
        {
            let mut state = fake.state.lock().unwrap();
            let ring = format!("projects/{}/locations/global/keyRings/{}", PROJECT, KEY_RING);
            state.crypto_keys.insert(format!("{}/cryptoKeys/{}", ring, CRYPTO_KEY));
            state.key_rings.insert(ring);
        }
        fake
    }

    /// Start the fake with no KMS resources
    pub async fn start_empty() -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(State::default()));

        let s = state.clone();
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1/projects/[^/]+/locations/[^/]+/keyRings/[^/]+/cryptoKeys/[^/]+:encrypt$"))
            .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
            .respond_with(move |request: &Request| {
                let key = resource(request, ":encrypt");
                if !s.lock().unwrap().crypto_keys.contains(&key) {
                    return google_error(404, "NOT_FOUND", &format!("{} not found.", key));
                }
                let plaintext = body(request)["plaintext"].as_str().unwrap_or("").to_string();
                let ciphertext = STANDARD.encode(format!("ct|{}|{}", key, plaintext));
                ResponseTemplate::new(200).set_body_json(json!({
                    "name": format!("{}/cryptoKeyVersions/1", key),
                    "ciphertext": ciphertext
                }))
            })
            .mount(&server)
            .await;

        let s = state.clone();
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1/projects/[^/]+/locations/[^/]+/keyRings/[^/]+/cryptoKeys/[^/]+:decrypt$"))
            .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
            .respond_with(move |request: &Request| {
                let key = resource(request, ":decrypt");
                if !s.lock().unwrap().crypto_keys.contains(&key) {
                    return google_error(404, "NOT_FOUND", &format!("{} not found.", key));
                }
                let ciphertext = body(request)["ciphertext"].as_str().unwrap_or("").to_string();
                let decoded = STANDARD
                    .decode(ciphertext)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .unwrap_or_default();
                let mut parts = decoded.splitn(3, '|');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some("ct"), Some(bound), Some(plaintext)) if bound == key => {
                        if plaintext.is_empty() {
                            // Proto3 JSON omits empty bytes fields.
                            ResponseTemplate::new(200).set_body_json(json!({}))
                        } else {
                            ResponseTemplate::new(200).set_body_json(json!({"plaintext": plaintext}))
                        }
                    }
                    _ => google_error(400, "INVALID_ARGUMENT", "Decryption failed: the ciphertext is invalid."),
                }
            })
            .mount(&server)
            .await;

        let s = state.clone();
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1/projects/[^/]+/locations/[^/]+/keyRings$"))
            .respond_with(move |request: &Request| {
                let parent = request.url.path().trim_start_matches("/v1/").trim_end_matches("/keyRings").to_string();
                let Some(id) = query(request, "keyRingId") else {
                    return google_error(400, "INVALID_ARGUMENT", "keyRingId is required");
                };
                let name = format!("{}/keyRings/{}", parent, id);
                if !s.lock().unwrap().key_rings.insert(name.clone()) {
                    return google_error(409, "ALREADY_EXISTS", &format!("KeyRing {} already exists.", name));
                }
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": name, "createTime": "2024-01-01T00:00:00Z"}))
            })
            .mount(&server)
            .await;

        let s = state.clone();
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1/projects/[^/]+/locations/[^/]+/keyRings/[^/]+/cryptoKeys$"))
            .respond_with(move |request: &Request| {
                let parent = request.url.path().trim_start_matches("/v1/").trim_end_matches("/cryptoKeys").to_string();
                let Some(id) = query(request, "cryptoKeyId") else {
                    return google_error(400, "INVALID_ARGUMENT", "cryptoKeyId is required");
                };
                let purpose = body(request)["purpose"].as_str().unwrap_or("").to_string();
                let mut state = s.lock().unwrap();
                if !state.key_rings.contains(&parent) {
                    return google_error(404, "NOT_FOUND", &format!("KeyRing {} not found.", parent));
                }
                let name = format!("{}/cryptoKeys/{}", parent, id);
                if !state.crypto_keys.insert(name.clone()) {
                    return google_error(409, "ALREADY_EXISTS", &format!("CryptoKey {} already exists.", name));
                }
                ResponseTemplate::new(200).set_body_json(json!({
                    "name": name,
                    "purpose": purpose,
                    "createTime": "2024-01-01T00:00:00Z",
                    "versionTemplate": {"algorithm": "GOOGLE_SYMMETRIC_ENCRYPTION"}
                }))
            })
            .mount(&server)
            .await;

        let s = state.clone();
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1/projects/[^/:]+:lookup$"))
            .respond_with(move |request: &Request| {
                let key = body(request)["keys"][0].clone();
                match s.lock().unwrap().entities.get(&entity_id(&key)) {
                    Some(entity) => ResponseTemplate::new(200)
                        .set_body_json(json!({"found": [{"entity": entity, "version": "1"}]})),
                    None => ResponseTemplate::new(200)
                        .set_body_json(json!({"missing": [{"entity": {"key": key}, "version": "1"}]})),
                }
            })
            .mount(&server)
            .await;

        let s = state.clone();
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1/projects/[^/:]+:commit$"))
            .respond_with(move |request: &Request| {
                let request = body(request);
                if request["mode"] != "NON_TRANSACTIONAL" {
                    return google_error(400, "INVALID_ARGUMENT", "transaction required");
                }
                let entity = request["mutations"][0]["upsert"].clone();
                s.lock().unwrap().entities.insert(entity_id(&entity["key"]), entity);
                ResponseTemplate::new(200)
                    .set_body_json(json!({"mutationResults": [{"version": "1"}], "indexUpdates": 0}))
            })
            .mount(&server)
            .await;

        let s = state.clone();
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1/projects/[^/:]+:runQuery$"))
            .respond_with(move |request: &Request| {
                let request = body(request);
                let namespace = request["partitionId"]["namespaceId"].as_str().unwrap_or("").to_string();
                let kind = request["query"]["kind"][0]["name"].as_str().unwrap_or("").to_string();
                let offset: usize = request["query"]["startCursor"]
                    .as_str()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);

                let keys: Vec<Value> = s
                    .lock()
                    .unwrap()
                    .entities
                    .iter()
                    .filter(|((ns, k, _), _)| *ns == namespace && *k == kind)
                    .map(|(_, entity)| entity["key"].clone())
                    .collect();

                let page: Vec<Value> = keys
                    .iter()
                    .skip(offset)
                    .take(PAGE_SIZE)
                    .map(|key| json!({"entity": {"key": key}}))
                    .collect();
                let end = offset + page.len();
                let more = if end < keys.len() { "NOT_FINISHED" } else { "NO_MORE_RESULTS" };

                ResponseTemplate::new(200).set_body_json(json!({
                    "batch": {
                        "entityResultType": "PROJECTION",
                        "entityResults": page,
                        "endCursor": end.to_string(),
                        "moreResults": more
                    }
                }))
            })
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Configuration pointing both clients at this fake
    pub fn config(&self) -> Config {
        Config {
            project_id: Some(PROJECT.to_string()),
            key_ring_id: Some(KEY_RING.to_string()),
            crypto_key_id: Some(CRYPTO_KEY.to_string()),
            kms_endpoint: self.uri(),
            datastore: DatastoreEndpoint { url: self.uri(), authenticated: true },
            access_token: Some(SecretString::new(TOKEN)),
            ..Config::default()
        }
    }

    /// Stored entity JSON, as the Datastore API would return it
    pub fn entity(&self, namespace: &str, kind: &str, name: &str) -> Option<Value> {
        let id = (namespace.to_string(), kind.to_string(), name.to_string());
        self.state.lock().unwrap().entities.get(&id).cloned()
    }

    /// Insert an entity directly, bypassing the client
    pub fn insert_entity(&self, entity: Value) {
        self.state.lock().unwrap().entities.insert(entity_id(&entity["key"]), entity);
    }

    pub fn entity_count(&self) -> usize {
        self.state.lock().unwrap().entities.len()
    }

    /// Requests received for a path suffix such as `:encrypt`
    pub async fn requests_ending_with(&self, suffix: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().ends_with(suffix))
            .count()
    }
}

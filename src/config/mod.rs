//! # Configuration Management
//!
//! gcredstash is configured from four layers, highest priority first:
//! command-line flags, environment variables, a TOML file
//! (`~/.gcredstash/config.toml` by default) and built-in defaults.
//!
//! Each layer is a [`ConfigLayer`] of optional values; layers are stacked
//! with [`ConfigLayer::overlay`] and turned into the final [`Config`] with
//! [`ConfigLayer::resolve`]. The resulting `Config` is built once per process
//! and passed by reference to whatever needs it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{Result, VaultError};
use crate::kms::{CryptoKeyName, KeyRingName, LocationName};
use crate::secrets::SecretString;

/// Location used when none is configured
pub const DEFAULT_LOCATION_ID: &str = "global";

/// Datastore kind used when none is configured
pub const DEFAULT_COLLECTION: &str = "Credentials";

pub const DEFAULT_KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";
pub const DEFAULT_DATASTORE_ENDPOINT: &str = "https://datastore.googleapis.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 1;

/// Environment variables read by [`ConfigLayer::from_env`], with the legacy
/// names accepted as fallbacks.
pub mod env_vars {
    pub const PROJECT_ID: &[&str] = &["GCREDSTASH_PROJECT_ID", "PROJECT_ID", "GOOGLE_CLOUD_PROJECT"];
    pub const LOCATION_ID: &[&str] = &["GCREDSTASH_LOCATION_ID", "DEFAULT_LOCATION_ID"];
    pub const KEY_RING_ID: &[&str] = &["GCREDSTASH_KEY_RING_ID", "DEFAULT_KEY_RING_ID"];
    pub const CRYPTO_KEY_ID: &[&str] = &["GCREDSTASH_CRYPTO_KEY_ID", "DEFAULT_CRYPTO_KEY_ID"];
    pub const COLLECTION: &[&str] = &["GCREDSTASH_DATASTORE_KIND", "DEFAULT_DATASTORE_KIND"];
    pub const NAMESPACE: &[&str] = &["GCREDSTASH_DATASTORE_NAMESPACE"];
    pub const KMS_ENDPOINT: &[&str] = &["GCREDSTASH_KMS_ENDPOINT"];
    pub const DATASTORE_ENDPOINT: &[&str] = &["GCREDSTASH_DATASTORE_ENDPOINT"];
    pub const DATASTORE_EMULATOR_HOST: &[&str] = &["DATASTORE_EMULATOR_HOST"];
    pub const CREDENTIALS_FILE: &[&str] = &["GOOGLE_APPLICATION_CREDENTIALS"];
    pub const ACCESS_TOKEN: &[&str] = &["GCREDSTASH_ACCESS_TOKEN"];
    pub const TIMEOUT_SECS: &[&str] = &["GCREDSTASH_TIMEOUT_SECS"];
    pub const BATCH_CONCURRENCY: &[&str] = &["GCREDSTASH_BATCH_CONCURRENCY"];
    pub const CONFIG_FILE: &[&str] = &["GCREDSTASH_CONFIG"];
}

/// One layer of optional settings.
///
/// The TOML file deserializes straight into this type; unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub project_id: Option<String>,
    pub location_id: Option<String>,
    pub key_ring_id: Option<String>,
    pub crypto_key_id: Option<String>,
    pub collection: Option<String>,
    pub namespace: Option<String>,
    pub kms_endpoint: Option<String>,
    pub datastore_endpoint: Option<String>,
    pub datastore_emulator_host: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub batch_concurrency: Option<usize>,
    /// Only ever read from the environment
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl ConfigLayer {
    /// Read the layer from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the layer through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names.iter().find_map(|name| lookup(name).filter(|value| !value.trim().is_empty()))
        };

        let timeout_secs = first(env_vars::TIMEOUT_SECS)
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|e| {
                    VaultError::config(format!("Invalid GCREDSTASH_TIMEOUT_SECS '{}': {}", raw, e))
                })
            })
            .transpose()?;

        let batch_concurrency = first(env_vars::BATCH_CONCURRENCY)
            .map(|raw| {
                raw.trim().parse::<usize>().map_err(|e| {
                    VaultError::config(format!(
                        "Invalid GCREDSTASH_BATCH_CONCURRENCY '{}': {}",
                        raw, e
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            project_id: first(env_vars::PROJECT_ID),
            location_id: first(env_vars::LOCATION_ID),
            key_ring_id: first(env_vars::KEY_RING_ID),
            crypto_key_id: first(env_vars::CRYPTO_KEY_ID),
            collection: first(env_vars::COLLECTION),
            namespace: first(env_vars::NAMESPACE),
            kms_endpoint: first(env_vars::KMS_ENDPOINT),
            datastore_endpoint: first(env_vars::DATASTORE_ENDPOINT),
            datastore_emulator_host: first(env_vars::DATASTORE_EMULATOR_HOST),
            credentials_file: first(env_vars::CREDENTIALS_FILE).map(PathBuf::from),
            timeout_secs,
            batch_concurrency,
            access_token: first(env_vars::ACCESS_TOKEN),
        })
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| VaultError::config(format!("Invalid config file: {}", e)))
    }

    /// Load a TOML file. A missing file is an empty layer.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            VaultError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&contents).map_err(|e| {
            VaultError::config(format!("{} ({})", e, path.display()))
        })
    }

    /// Fill every unset value of `self` from `lower`
    pub fn overlay(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            project_id: self.project_id.or(lower.project_id),
            location_id: self.location_id.or(lower.location_id),
            key_ring_id: self.key_ring_id.or(lower.key_ring_id),
            crypto_key_id: self.crypto_key_id.or(lower.crypto_key_id),
            collection: self.collection.or(lower.collection),
            namespace: self.namespace.or(lower.namespace),
            kms_endpoint: self.kms_endpoint.or(lower.kms_endpoint),
            datastore_endpoint: self.datastore_endpoint.or(lower.datastore_endpoint),
            datastore_emulator_host: self.datastore_emulator_host.or(lower.datastore_emulator_host),
            credentials_file: self.credentials_file.or(lower.credentials_file),
            timeout_secs: self.timeout_secs.or(lower.timeout_secs),
            batch_concurrency: self.batch_concurrency.or(lower.batch_concurrency),
            access_token: self.access_token.or(lower.access_token),
        }
    }

    /// Apply built-in defaults and produce the process configuration
    pub fn resolve(self) -> Result<Config> {
        let batch_concurrency = self.batch_concurrency.unwrap_or(DEFAULT_BATCH_CONCURRENCY);
        if batch_concurrency == 0 {
            return Err(VaultError::config("batch concurrency must be at least 1"));
        }

        // The emulator speaks plain HTTP and takes no credentials.
        let datastore = match (self.datastore_endpoint, self.datastore_emulator_host) {
            (Some(url), _) => DatastoreEndpoint { url, authenticated: true },
            (None, Some(host)) => DatastoreEndpoint {
                url: if host.starts_with("http://") || host.starts_with("https://") {
                    host
                } else {
                    format!("http://{}", host)
                },
                authenticated: false,
            },
            (None, None) => {
                DatastoreEndpoint { url: DEFAULT_DATASTORE_ENDPOINT.to_string(), authenticated: true }
            }
        };

        Ok(Config {
            project_id: self.project_id,
            location_id: self.location_id.unwrap_or_else(|| DEFAULT_LOCATION_ID.to_string()),
            key_ring_id: self.key_ring_id,
            crypto_key_id: self.crypto_key_id,
            collection: self.collection.unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            namespace: self.namespace,
            kms_endpoint: self.kms_endpoint.unwrap_or_else(|| DEFAULT_KMS_ENDPOINT.to_string()),
            datastore,
            credentials_file: self.credentials_file,
            access_token: self.access_token.map(SecretString::new),
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            batch_concurrency,
        })
    }
}

/// Where the document store lives and whether it needs a bearer token
#[derive(Debug, Clone, PartialEq)]
pub struct DatastoreEndpoint {
    pub url: String,
    pub authenticated: bool,
}

/// Resolved process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub project_id: Option<String>,
    pub location_id: String,
    pub key_ring_id: Option<String>,
    pub crypto_key_id: Option<String>,
    pub collection: String,
    pub namespace: Option<String>,
    pub kms_endpoint: String,
    pub datastore: DatastoreEndpoint,
    pub credentials_file: Option<PathBuf>,
    pub access_token: Option<SecretString>,
    pub timeout_secs: u64,
    pub batch_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            location_id: DEFAULT_LOCATION_ID.to_string(),
            key_ring_id: None,
            crypto_key_id: None,
            collection: DEFAULT_COLLECTION.to_string(),
            namespace: None,
            kms_endpoint: DEFAULT_KMS_ENDPOINT.to_string(),
            datastore: DatastoreEndpoint {
                url: DEFAULT_DATASTORE_ENDPOINT.to_string(),
                authenticated: true,
            },
            credentials_file: None,
            access_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl Config {
    pub fn project_id(&self) -> Result<&str> {
        required(self.project_id.as_deref(), "project id", "--project-id", env_vars::PROJECT_ID[0])
    }

    pub fn key_ring_id(&self) -> Result<&str> {
        required(self.key_ring_id.as_deref(), "key ring id", "--keyring-id", env_vars::KEY_RING_ID[0])
    }

    pub fn crypto_key_id(&self) -> Result<&str> {
        required(
            self.crypto_key_id.as_deref(),
            "crypto key id",
            "--key-id",
            env_vars::CRYPTO_KEY_ID[0],
        )
    }

    /// Parent of key rings: `projects/{project}/locations/{location}`
    pub fn location_name(&self) -> Result<LocationName> {
        Ok(LocationName::new(self.project_id()?, self.location_id.as_str()))
    }

    /// Parent of crypto keys
    pub fn key_ring_name(&self) -> Result<KeyRingName> {
        Ok(self.location_name()?.key_ring(self.key_ring_id()?))
    }

    /// Key used to encrypt and decrypt credentials
    pub fn crypto_key_name(&self) -> Result<CryptoKeyName> {
        Ok(self.key_ring_name()?.crypto_key(self.crypto_key_id()?))
    }
}

fn required<'a>(value: Option<&'a str>, what: &str, flag: &str, env: &str) -> Result<&'a str> {
    value.ok_or_else(|| {
        VaultError::config(format!("{} is not set; pass {} or set {}", what, flag, env))
    })
}

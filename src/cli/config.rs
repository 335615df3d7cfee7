//! Configuration resolution for the gcredstash CLI
//!
//! Builds the process [`Config`] from command-line flags, the environment and
//! `~/.gcredstash/config.toml`, in that priority order.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::GlobalArgs;
use crate::config::{env_vars, Config, ConfigLayer};
use crate::errors::{Result, VaultError};

/// Default configuration file path (~/.gcredstash/config.toml)
pub fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).ok()?;

    let mut path = PathBuf::from(home);
    path.push(".gcredstash");
    path.push("config.toml");
    Some(path)
}

/// Where the configuration file is read from.
///
/// Checks, in order: the `--config` flag, `GCREDSTASH_CONFIG`, the default path.
/// The boolean is true when the path was named explicitly.
pub fn resolve_config_path<F>(flag: Option<&Path>, lookup: F) -> Option<(PathBuf, bool)>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = flag {
        debug!("Using config file from --config flag: {}", path.display());
        return Some((path.to_path_buf(), true));
    }

    if let Some(path) = env_vars::CONFIG_FILE.iter().find_map(|name| lookup(name)) {
        if !path.is_empty() {
            debug!("Using config file from GCREDSTASH_CONFIG: {}", path);
            return Some((PathBuf::from(path), true));
        }
    }

    default_config_path().map(|path| (path, false))
}

/// Settings given on the command line
pub fn flag_layer(args: &GlobalArgs) -> ConfigLayer {
    ConfigLayer {
        project_id: args.project_id.clone(),
        location_id: args.location_id.clone(),
        key_ring_id: args.keyring_id.clone(),
        crypto_key_id: args.key_id.clone(),
        collection: args.collection.clone(),
        namespace: args.namespace.clone(),
        ..ConfigLayer::default()
    }
}

/// Resolve the process configuration: flags > environment > file > defaults
pub fn resolve(args: &GlobalArgs) -> Result<Config> {
    let env = ConfigLayer::from_env()?;

    let file = match resolve_config_path(args.config.as_deref(), |key| std::env::var(key).ok()) {
        Some((path, true)) if !path.exists() => {
            return Err(VaultError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Some((path, _)) => ConfigLayer::load_file(&path)?,
        None => ConfigLayer::default(),
    };

    flag_layer(args).overlay(env).overlay(file).resolve()
}

/// Resolved configuration as shown by `gcredstash config show`.
///
/// The access token is reported only as present or absent.
#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub project_id: Option<String>,
    pub location_id: String,
    pub key_ring_id: Option<String>,
    pub crypto_key_id: Option<String>,
    pub collection: String,
    pub namespace: Option<String>,
    pub kms_endpoint: String,
    pub datastore_endpoint: String,
    pub datastore_authenticated: bool,
    pub credentials_file: Option<PathBuf>,
    pub access_token_set: bool,
    pub timeout_secs: u64,
    pub batch_concurrency: usize,
}

impl From<&Config> for ConfigView {
    fn from(config: &Config) -> Self {
        Self {
            project_id: config.project_id.clone(),
            location_id: config.location_id.clone(),
            key_ring_id: config.key_ring_id.clone(),
            crypto_key_id: config.crypto_key_id.clone(),
            collection: config.collection.clone(),
            namespace: config.namespace.clone(),
            kms_endpoint: config.kms_endpoint.clone(),
            datastore_endpoint: config.datastore.url.clone(),
            datastore_authenticated: config.datastore.authenticated,
            credentials_file: config.credentials_file.clone(),
            access_token_set: config.access_token.is_some(),
            timeout_secs: config.timeout_secs,
            batch_concurrency: config.batch_concurrency,
        }
    }
}

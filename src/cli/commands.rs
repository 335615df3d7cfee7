//! Command Dispatcher: maps CLI verbs onto the Envelope Encryptor.

use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroize;

use super::config::ConfigView;
use super::output::{self, OutputFormat};
use super::{Commands, ConfigCommands};
use crate::auth::{AnonymousTokenProvider, LazyTokenProvider, TokenProvider};
use crate::config::Config;
use crate::errors::{Result, VaultError};
use crate::kms::CloudKmsClient;
use crate::secrets::{EnvelopeEncryptor, SecretString};
use crate::store::{DatastoreClient, SecretStore};

/// Runs one command against the configured services
#[derive(Debug)]
pub struct Dispatcher {
    config: Config,
    encryptor: EnvelopeEncryptor,
    format: OutputFormat,
}

impl Dispatcher {
    pub fn new(config: Config, encryptor: EnvelopeEncryptor, format: OutputFormat) -> Self {
        Self { config, encryptor, format }
    }

    /// Build the Cloud KMS and Datastore clients from configuration.
    ///
    /// Credentials are resolved on the first authenticated request.
    pub fn connect(config: Config, format: OutputFormat) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let tokens: Arc<dyn TokenProvider> = Arc::new(LazyTokenProvider::new(&config));

        let kms = CloudKmsClient::new(config.kms_endpoint.as_str(), timeout, tokens.clone())?;

        let store_tokens: Arc<dyn TokenProvider> = if config.datastore.authenticated {
            tokens
        } else {
            Arc::new(AnonymousTokenProvider)
        };
        let datastore = DatastoreClient::new(
            config.project_id()?,
            config.namespace.clone(),
            config.datastore.url.as_str(),
            timeout,
            store_tokens,
        )?;

        let encryptor =
            EnvelopeEncryptor::new(Arc::new(kms), SecretStore::new(Arc::new(datastore)))
                .with_batch_concurrency(config.batch_concurrency);

        Ok(Self::new(config, encryptor, format))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute `command`, writing results to `out` and per-entry failures to `err`
    pub async fn execute<W: Write, E: Write>(
        &self,
        command: Commands,
        out: &mut W,
        err: &mut E,
    ) -> Result<()> {
        let collection = self.config.collection.as_str();
        debug!(command = command.name(), collection, "Dispatching command");

        match command {
            Commands::CreateKeyring { new_keyring_id } => {
                let parent = self.config.location_name()?;
                let key_ring = self.encryptor.create_key_ring(&parent, &new_keyring_id).await?;
                output::write_structured(out, &key_ring, self.format)
            }

            Commands::CreateKey { new_key_id } => {
                let parent = self.config.key_ring_name()?;
                let crypto_key = self.encryptor.create_key(&parent, &new_key_id).await?;
                output::write_structured(out, &crypto_key, self.format)
            }

            Commands::Get { name, no_newline } => {
                let key = self.config.crypto_key_name()?;
                let value = self
                    .encryptor
                    .get(&key, collection, &name)
                    .await?
                    .ok_or_else(|| VaultError::not_found(collection, name.as_str()))?;

                write!(out, "{}", value.expose_secret())?;
                if !no_newline {
                    writeln!(out)?;
                }
                Ok(())
            }

            Commands::Put { name, plaintext } => {
                let key = self.config.crypto_key_name()?;
                let value = read_value(&plaintext)?;
                self.encryptor.put(&key, collection, &name, &value).await
            }

            Commands::PutAll { file } => {
                let key = self.config.crypto_key_name()?;
                let credentials = parse_credentials(&read_source(&file)?)?;
                let report = self.encryptor.put_all(&key, collection, credentials).await;

                output::write_names(out, &report.stored, self.format)?;
                output::write_failures(err, &report.failures)?;
                report.incomplete_error().map_or(Ok(()), Err)
            }

            Commands::GetAll => {
                let key = self.config.crypto_key_name()?;
                let mut report = self.encryptor.get_all(&key, collection).await?;
                if self.format == OutputFormat::Env {
                    output::reject_env_unsafe_names(&mut report);
                }

                output::write_credentials(out, &report.credentials, self.format)?;
                output::write_failures(err, &report.failures)?;
                report.incomplete_error().map_or(Ok(()), Err)
            }

            Commands::List => {
                let names = self.encryptor.list(collection).await?;
                info!(collection, count = names.len(), "Listed credentials");
                output::write_names(out, &names, self.format)
            }

            Commands::Config { command: ConfigCommands::Show } => {
                output::write_structured(out, &ConfigView::from(&self.config), self.format)
            }
        }
    }
}

/// Value given to `put`: the argument itself, or stdin when it is `-`.
///
/// One trailing newline is dropped from stdin.
fn read_value(argument: &str) -> Result<SecretString> {
    if argument != "-" {
        return Ok(SecretString::new(argument));
    }

    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    let trimmed = buffer.strip_suffix('\n').map(|s| s.strip_suffix('\r').unwrap_or(s));
    let value = SecretString::new(trimmed.unwrap_or(&buffer));
    buffer.zeroize();
    Ok(value)
}

/// Contents of a file, or stdin for `-`
fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer);
    }

    std::fs::read_to_string(source).map_err(|e| {
        VaultError::invalid_argument("file", format!("cannot read '{}': {}", source, e))
    })
}

/// Parse a JSON object of credential name to string value
pub fn parse_credentials(document: &str) -> Result<BTreeMap<String, SecretString>> {
    let value: Value = serde_json::from_str(document).map_err(|e| {
        VaultError::invalid_argument("credentials", format!("not valid JSON: {}", e))
    })?;

    let Value::Object(entries) = value else {
        return Err(VaultError::invalid_argument(
            "credentials",
            "must be a JSON object mapping names to string values",
        ));
    };

    entries
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(text) => Ok((name, SecretString::new(text))),
            _ => Err(VaultError::invalid_argument(
                format!("credentials.{}", name),
                "value must be a string",
            )),
        })
        .collect()
}

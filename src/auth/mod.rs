//! OAuth2 bearer tokens for the Google REST APIs.
//!
//! Three sources are supported, picked once at start-up by [`token_provider`]:
//! - a fixed token from `GCREDSTASH_ACCESS_TOKEN` (CI, short-lived tokens
//!   minted by `gcloud auth print-access-token`)
//! - no token at all, when every configured endpoint is the Datastore emulator
//! - `yup-oauth2`, using the configured service account key file or
//!   Application Default Credentials

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::{
    ApplicationDefaultCredentialsAuthenticator, ApplicationDefaultCredentialsFlowOpts,
    ServiceAccountAuthenticator,
};

use crate::config::Config;
use crate::errors::{RemoteService, Result, VaultError};
use crate::secrets::SecretString;

/// Scope covering both Cloud KMS and Cloud Datastore
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Source of bearer tokens for outgoing requests
#[async_trait]
pub trait TokenProvider: Send + Sync + fmt::Debug {
    /// Token to attach, or `None` to send the request unauthenticated
    async fn access_token(&self) -> Result<Option<SecretString>>;
}

/// A token supplied up front
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<Option<SecretString>> {
        Ok(Some(self.token.clone()))
    }
}

/// Sends requests without an `Authorization` header (Datastore emulator)
#[derive(Debug, Clone, Default)]
pub struct AnonymousTokenProvider;

#[async_trait]
impl TokenProvider for AnonymousTokenProvider {
    async fn access_token(&self) -> Result<Option<SecretString>> {
        Ok(None)
    }
}

/// Tokens minted by `yup-oauth2` and cached by its authenticator
pub struct OAuthTokenProvider {
    authenticator: DefaultAuthenticator,
    source: &'static str,
}

impl fmt::Debug for OAuthTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokenProvider")
            .field("source", &self.source)
            .field("authenticator", &"[Authenticator]")
            .finish()
    }
}

impl OAuthTokenProvider {
    /// Authenticate with a service account key file
    pub async fn from_service_account_file(path: &Path) -> Result<Self> {
        let key = yup_oauth2::read_service_account_key(path).await.map_err(|e| {
            VaultError::config(format!(
                "Failed to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;

        let authenticator = ServiceAccountAuthenticator::builder(key).build().await.map_err(|e| {
            VaultError::config(format!("Failed to build service account authenticator: {}", e))
        })?;

        info!(key_file = %path.display(), "Using service account credentials");
        Ok(Self { authenticator, source: "service_account" })
    }

    /// Authenticate with Application Default Credentials
    pub async fn from_application_default() -> Result<Self> {
        let opts = ApplicationDefaultCredentialsFlowOpts::default();
        let authenticator = match ApplicationDefaultCredentialsAuthenticator::builder(opts).await {
            yup_oauth2::authenticator::ApplicationDefaultCredentialsTypes::InstanceMetadata(
                builder,
            ) => builder.build().await,
            yup_oauth2::authenticator::ApplicationDefaultCredentialsTypes::ServiceAccount(
                builder,
            ) => builder.build().await,
        }
        .map_err(|e| {
            VaultError::config(format!(
                "Failed to set up Application Default Credentials. Set \
                 GOOGLE_APPLICATION_CREDENTIALS or GCREDSTASH_ACCESS_TOKEN: {}",
                e
            ))
        })?;

        info!("Using Application Default Credentials");
        Ok(Self { authenticator, source: "application_default" })
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn access_token(&self) -> Result<Option<SecretString>> {
        let token = self
            .authenticator
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| VaultError::remote(RemoteService::Auth, None, e.to_string()))?;

        let token = token.token().ok_or_else(|| {
            VaultError::remote(RemoteService::Auth, None, "token endpoint returned no access token")
        })?;

        debug!(source = self.source, "Obtained OAuth2 access token");
        Ok(Some(SecretString::new(token)))
    }
}

/// Resolves the real provider on first use.
///
/// Commands that never reach an authenticated endpoint (for example `list`
/// against the Datastore emulator) then run without Google credentials.
#[derive(Debug)]
pub struct LazyTokenProvider {
    config: Config,
    inner: OnceCell<Arc<dyn TokenProvider>>,
}

impl LazyTokenProvider {
    pub fn new(config: &Config) -> Self {
        Self { config: config.clone(), inner: OnceCell::new() }
    }
}

#[async_trait]
impl TokenProvider for LazyTokenProvider {
    async fn access_token(&self) -> Result<Option<SecretString>> {
        let provider = self.inner.get_or_try_init(|| token_provider(&self.config)).await?;
        provider.access_token().await
    }
}

/// Pick the token source for this process from configuration.
///
/// Only called for endpoints that need credentials; the emulator path uses
/// [`AnonymousTokenProvider`] directly.
pub async fn token_provider(config: &Config) -> Result<Arc<dyn TokenProvider>> {
    if let Some(token) = &config.access_token {
        debug!("Using access token from GCREDSTASH_ACCESS_TOKEN");
        return Ok(Arc::new(StaticTokenProvider::new(token.clone())));
    }

    match &config.credentials_file {
        Some(path) => Ok(Arc::new(OAuthTokenProvider::from_service_account_file(path).await?)),
        None => Ok(Arc::new(OAuthTokenProvider::from_application_default().await?)),
    }
}

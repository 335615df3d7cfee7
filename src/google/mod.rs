//! HTTP plumbing shared by the Cloud KMS and Cloud Datastore clients.
//!
//! Both APIs are JSON over HTTPS with `POST {base}/v1/{resource}:{verb}` calls,
//! bearer-token auth and the same error envelope:
//!
//! ```json
//! {"error": {"code": 409, "message": "KeyRing ... already exists.", "status": "ALREADY_EXISTS"}}
//! ```
//!
//! Every failure (transport, timeout, non-2xx, undecodable body) becomes a
//! [`VaultError::RemoteServiceFailure`] tagged with the service it came from.

use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, Instrument};

use crate::auth::TokenProvider;
use crate::errors::{RemoteService, Result, VaultError};

/// Google API error envelope
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Authenticated JSON client for one Google REST API
#[derive(Debug, Clone)]
pub struct GoogleApiClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    service: RemoteService,
}

impl GoogleApiClient {
    pub fn new(
        service: RemoteService,
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gcredstash/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| VaultError::internal(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url, tokens, service })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn service(&self) -> RemoteService {
        self.service
    }

    /// Full URL for an API path such as `projects/p:lookup`
    pub fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `POST` a JSON body and decode the JSON response
    pub async fn post_json<B, R>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let span = crate::remote_span!(self.service, operation, path);
        async {
            let url = self.url(path);
            debug!("POST {}", url);

            let mut request = self.http.post(&url).query(query).json(body);
            if let Some(token) = self.tokens.access_token().await? {
                request = request.bearer_auth(token.expose_secret());
            }

            let response = request.send().await.map_err(|e| self.transport_error(e))?;
            self.handle_response(response).await
        }
        .instrument(span)
        .await
    }

    /// Check the status and decode the body
    async fn handle_response<R: DeserializeOwned>(&self, response: Response) -> Result<R> {
        let status = response.status();
        debug!(status = status.as_u16(), "Response status");

        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            trace!("Error response:\n{}", body);
            return Err(self.error_from_body(status.as_u16(), &body));
        }

        // Response bodies may contain ciphertext or plaintext; never log them.
        serde_json::from_str(&body).map_err(|e| {
            VaultError::remote(
                self.service,
                Some(status.as_u16()),
                format!("Failed to decode response: {}", e),
            )
        })
    }

    fn error_from_body(&self, status: u16, body: &str) -> VaultError {
        let message = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => match envelope.error.status {
                Some(code) if !code.is_empty() => format!("{} ({})", envelope.error.message, code),
                _ => envelope.error.message,
            },
            Err(_) if body.trim().is_empty() => "empty error response".to_string(),
            Err(_) => body.trim().to_string(),
        };
        VaultError::remote(self.service, Some(status), message)
    }

    fn transport_error(&self, err: reqwest::Error) -> VaultError {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        VaultError::remote(self.service, status, message)
    }
}

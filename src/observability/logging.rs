//! # Structured Logging
//!
//! Span macros for calls that leave the process. Spans carry the service,
//! the operation and the resource path; never attach plaintext or ciphertext.

/// Create a tracing span for a call to an external service.
///
/// ```rust,ignore
/// let span = remote_span!("kms", "encrypt", key.to_string());
/// let span = remote_span!("datastore", "lookup", kind, name = %name);
/// ```
#[macro_export]
macro_rules! remote_span {
    ($service:expr, $operation:expr, $resource:expr) => {
        tracing::debug_span!(
            "remote_call",
            service = %$service,
            operation = %$operation,
            resource = %$resource
        )
    };
    ($service:expr, $operation:expr, $resource:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "remote_call",
            service = %$service,
            operation = %$operation,
            resource = %$resource,
            $($field)*
        )
    };
}

/// Log the resolved configuration at debug level
pub fn log_config_info(config: &crate::config::Config) {
    tracing::debug!(
        project_id = ?config.project_id,
        location_id = %config.location_id,
        key_ring_id = ?config.key_ring_id,
        crypto_key_id = ?config.crypto_key_id,
        collection = %config.collection,
        namespace = ?config.namespace,
        kms_endpoint = %config.kms_endpoint,
        datastore_endpoint = %config.datastore.url,
        datastore_authenticated = config.datastore.authenticated,
        batch_concurrency = config.batch_concurrency,
        "gcredstash configuration"
    );
}

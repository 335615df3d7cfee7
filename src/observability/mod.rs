//! # Observability
//!
//! Structured logging for the gcredstash CLI. Logs always go to stderr so that
//! stdout carries only command output (credential values, listings).

pub mod logging;

pub use logging::log_config_info;

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::errors::{Result, VaultError};

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Default filter directive when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "gcredstash=debug"
    } else {
        "gcredstash=warn"
    }
}

/// Subscriber writing `format` lines through `writer`, filtered by `filter`
pub fn build_subscriber<W>(
    filter: EnvFilter,
    format: LogFormat,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => {
            Box::new(registry.with(fmt::layer().json().with_writer(writer).with_current_span(true)))
        }
        LogFormat::Text => Box::new(registry.with(fmt::layer().with_writer(writer).with_target(false))),
    }
}

/// Initialize the global tracing subscriber, logging to stderr.
///
/// `RUST_LOG` wins over the `verbose` default. Fails if a subscriber is
/// already installed.
pub fn init_logging(verbose: bool, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing::subscriber::set_global_default(build_subscriber(filter, format, std::io::stderr))
        .map_err(|e| VaultError::internal(format!("Failed to initialize logging: {}", e)))
}

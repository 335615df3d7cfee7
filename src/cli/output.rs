//! Output rendering for CLI commands
//!
//! Results go to stdout as JSON (default), YAML, or shell-style `NAME='value'`
//! lines. Per-entry batch failures go to stderr.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

use crate::errors::{Result, VaultError};
use crate::secrets::{EntryFailure, GetAllReport, SecretString};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    /// `NAME='value'` lines, one per credential
    Env,
}

/// Write any serializable value as JSON or YAML
pub fn write_structured<W: Write, T: Serialize + ?Sized>(
    out: &mut W,
    data: &T,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(data)
                .map_err(|e| VaultError::internal(format!("Failed to serialize to YAML: {}", e)))?;
            write!(out, "{}", yaml)?;
        }
        OutputFormat::Json | OutputFormat::Env => {
            writeln!(out, "{}", serde_json::to_string_pretty(data)?)?;
        }
    }
    Ok(())
}

/// Write decrypted credentials. This is where plaintext leaves the process.
pub fn write_credentials<W: Write>(
    out: &mut W,
    credentials: &BTreeMap<String, SecretString>,
    format: OutputFormat,
) -> Result<()> {
    let exposed: BTreeMap<&str, &str> =
        credentials.iter().map(|(name, value)| (name.as_str(), value.expose_secret())).collect();

    match format {
        OutputFormat::Env => {
            if let Some(name) = exposed.keys().find(|name| !is_shell_identifier(name)) {
                return Err(unsafe_env_name(name));
            }
            for (name, value) in exposed {
                writeln!(out, "{}={}", name, shell_quote(value))?;
            }
            Ok(())
        }
        _ => write_structured(out, &exposed, format),
    }
}

/// True for `[A-Za-z_][A-Za-z0-9_]*`, the names a POSIX shell can assign
pub fn is_shell_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn unsafe_env_name(name: &str) -> VaultError {
    VaultError::invalid_argument(
        "name",
        format!("'{}' is not a shell variable name; use -o json or -o yaml", name.escape_default()),
    )
}

/// Move credentials that cannot be rendered as `NAME='value'` into the failures
pub fn reject_env_unsafe_names(report: &mut GetAllReport) {
    let unsafe_names: Vec<String> =
        report.credentials.keys().filter(|name| !is_shell_identifier(name)).cloned().collect();
    if unsafe_names.is_empty() {
        return;
    }

    for name in unsafe_names {
        report.credentials.remove(&name);
        let error = unsafe_env_name(&name);
        report.failures.push(EntryFailure::new(name, error));
    }
    report.failures.sort_by(|a, b| a.name.cmp(&b.name));
}

/// Write credential names; `env` format prints one per line
pub fn write_names<W: Write>(out: &mut W, names: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Env => {
            for name in names {
                writeln!(out, "{}", name)?;
            }
            Ok(())
        }
        _ => write_structured(out, names, format),
    }
}

/// Write one `error[kind]: name: message` line per failed entry
pub fn write_failures<W: Write>(err: &mut W, failures: &[EntryFailure]) -> Result<()> {
    for failure in failures {
        writeln!(err, "error[{}]: {}: {}", failure.error.kind(), failure.name, failure.error)?;
    }
    Ok(())
}

/// Single-quote a value for POSIX shells
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

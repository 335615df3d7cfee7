//! Results of `put_all` / `get_all`.
//!
//! Batches never abort on a single bad entry: successes and per-entry
//! failures are reported side by side.

use std::collections::BTreeMap;

use super::SecretString;
use crate::errors::VaultError;

/// One credential of a batch that could not be processed
#[derive(Debug)]
pub struct EntryFailure {
    pub name: String,
    pub error: VaultError,
}

impl EntryFailure {
    pub fn new(name: impl Into<String>, error: VaultError) -> Self {
        Self { name: name.into(), error }
    }
}

fn incomplete(failures: &[EntryFailure], total: usize) -> Option<VaultError> {
    if failures.is_empty() {
        return None;
    }
    Some(VaultError::BatchIncomplete {
        failed: failures.iter().map(|f| f.name.clone()).collect(),
        total,
    })
}

/// Outcome of `put_all`; both lists are sorted by name
#[derive(Debug, Default)]
pub struct PutAllReport {
    pub stored: Vec<String>,
    pub failures: Vec<EntryFailure>,
}

impl PutAllReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.stored.len() + self.failures.len()
    }

    /// `BatchIncomplete` naming the failed entries, if any failed
    pub fn incomplete_error(&self) -> Option<VaultError> {
        incomplete(&self.failures, self.total())
    }
}

/// Outcome of `get_all`
#[derive(Debug, Default)]
pub struct GetAllReport {
    pub credentials: BTreeMap<String, SecretString>,
    pub failures: Vec<EntryFailure>,
}

impl GetAllReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.credentials.len() + self.failures.len()
    }

    pub fn incomplete_error(&self) -> Option<VaultError> {
        incomplete(&self.failures, self.total())
    }
}

//! Cloud KMS resource names.
//!
//! Names are built by substituting identifiers into the fixed path template
//! `projects/{project}/locations/{location}/keyRings/{keyring}/cryptoKeys/{key}`.
//! They are passed to the service verbatim; whether they resolve to an
//! enabled key is for the service to decide.

use std::fmt;

/// `projects/{project}/locations/{location}`, the parent of key rings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationName {
    project: String,
    location: String,
}

impl LocationName {
    pub fn new(project: impl Into<String>, location: impl Into<String>) -> Self {
        Self { project: project.into(), location: location.into() }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn key_ring(&self, key_ring: impl Into<String>) -> KeyRingName {
        KeyRingName { location: self.clone(), key_ring: key_ring.into() }
    }
}

impl fmt::Display for LocationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/locations/{}", self.project, self.location)
    }
}

/// `…/keyRings/{keyring}`, the parent of crypto keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRingName {
    location: LocationName,
    key_ring: String,
}

impl KeyRingName {
    pub fn location(&self) -> &LocationName {
        &self.location
    }

    pub fn key_ring_id(&self) -> &str {
        &self.key_ring
    }

    pub fn crypto_key(&self, crypto_key: impl Into<String>) -> CryptoKeyName {
        CryptoKeyName { key_ring: self.clone(), crypto_key: crypto_key.into() }
    }
}

impl fmt::Display for KeyRingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/keyRings/{}", self.location, self.key_ring)
    }
}

/// Fully qualified key reference used for encrypt and decrypt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CryptoKeyName {
    key_ring: KeyRingName,
    crypto_key: String,
}

impl CryptoKeyName {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        key_ring: impl Into<String>,
        crypto_key: impl Into<String>,
    ) -> Self {
        LocationName::new(project, location).key_ring(key_ring).crypto_key(crypto_key)
    }

    pub fn key_ring(&self) -> &KeyRingName {
        &self.key_ring
    }

    pub fn crypto_key_id(&self) -> &str {
        &self.crypto_key
    }
}

impl fmt::Display for CryptoKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/cryptoKeys/{}", self.key_ring, self.crypto_key)
    }
}

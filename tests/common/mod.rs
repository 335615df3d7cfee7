//! Common test utilities for all integration tests.
//!
//! Provides an in-process fake of the Cloud KMS and Cloud Datastore REST APIs.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod google;

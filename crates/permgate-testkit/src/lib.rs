//! # Permgate Testkit
//!
//! Test doubles for the seams between permgate crates: an in-memory broker
//! cluster, a scripted admin check, and bearer token fixtures.
//!
//! Depend on this crate from `tests/` integration tests only. Unit tests in
//! `permgate-authorization` or `permgate-log` would see two copies of those
//! crates' types.

#![allow(clippy::unwrap_used, clippy::expect_used)]

pub mod authorization;
pub mod cluster;

pub use authorization::{CheckCall, ScriptedAdminCheck, TokenBuilder, Verdict};
pub use cluster::{broker, instant_retry, provision, MemoryCluster};

//! # Permgate Service
//!
//! HTTP gateway that accepts rights mutations, runs them through the
//! authorization gate, and publishes one change event per accepted
//! mutation.
//!
//! - [`config`]: TOML configuration with `PERMGATE_*` overrides
//! - [`mutation`]: the per-request state machine and its error mapping
//! - [`http`]: axum routes over a shared [`MutationService`]

#![forbid(unsafe_code)]

pub mod config;
pub mod http;
pub mod mutation;

pub use config::{AuthorizationConfig, Config, ConfigError, LogConfig};
pub use http::{router, serve};
pub use mutation::{MutationError, MutationService, MutationState};

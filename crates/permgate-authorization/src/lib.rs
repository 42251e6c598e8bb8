//! # Permgate Authorization
//!
//! Decides whether a caller may change rights on a resource.
//!
//! - [`AuthContext`]: caller identity decoded from the bearer token
//! - [`AdminCheck`]: seam to the external authorization-check service,
//!   with [`HttpAdminCheck`] and the explicit [`AllowAll`] opt-out
//! - [`AuthorizationGate`]: self-protection rules, then the admin check

#![forbid(unsafe_code)]

pub mod check;
pub mod context;
pub mod gate;

pub use check::{AccessDenied, AdminCheck, AllowAll, CheckError, HttpAdminCheck};
pub use context::{AuthContext, TokenError};
pub use gate::{check_self_protection, AuthorizationGate, GateError, SelfProtectionViolation};

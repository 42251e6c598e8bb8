//! Permgate Core - Rights Change Model
//!
//! This crate holds the pure, I/O-free foundation shared by every other
//! permgate crate:
//!
//! - `types`: resource coordinates and principals (users and groups)
//! - `rights`: right strings and the flag rules the gateway inspects
//! - `event`: the canonical rights-change message and its compaction key
//! - `retry`: bounded retry with backoff for broker and startup operations
//!
//! Nothing here stores rights state. A `ChangeEvent` is built per accepted
//! mutation, published, and dropped.

#![forbid(unsafe_code)]

/// Validation and decoding errors
pub mod errors;

/// Change events and the wire schema
pub mod event;

/// Retry policy with backoff
pub mod retry;

/// Right strings and flag rules
pub mod rights;

/// Resource and principal identifiers
pub mod types;

pub use errors::{DecodeError, ValidationError};
pub use event::{ChangeEvent, Command, CompactionKey, RightsMutation};
pub use retry::{BackoffStrategy, RetryPolicy, RetryResult};
pub use rights::{has_admin_flag, is_reserved_group, validate_right, Right};
pub use types::{GroupName, Principal, ResourceId, ResourceKind, ResourceRef, UserId};

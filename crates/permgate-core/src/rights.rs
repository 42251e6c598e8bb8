//! Right strings
//!
//! A right is a short string in which each character is an independent
//! flag. The gateway interprets exactly one flag, [`ADMIN_FLAG`]; all other
//! characters are carried through to consumers untouched.
//!
//! An empty right means "no rights" and is what a PUT without a right
//! segment assigns. It is not the same as a DELETE, which removes the
//! assignment entirely.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Flag character granting administrative control over a resource
pub const ADMIN_FLAG: char = 'a';

/// Group whose rights only structural admins may remove or downgrade
pub const RESERVED_ADMIN_GROUP: &str = "admin";

/// Whether `right` is acceptable as a right value.
///
/// Every string is accepted; flags are opaque to the gateway.
#[inline]
pub fn validate_right(_right: &str) -> bool {
    true
}

/// Whether `right` contains the admin flag
#[inline]
pub fn has_admin_flag(right: &str) -> bool {
    right.contains(ADMIN_FLAG)
}

/// Whether `group` is the reserved admin group
#[inline]
pub fn is_reserved_group(group: &str) -> bool {
    group == RESERVED_ADMIN_GROUP
}

/// A right value, e.g. `"rwxa"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Right(String);

impl Right {
    /// Wrap a right string
    pub fn new(right: impl Into<String>) -> Self {
        Self(right.into())
    }

    /// The "no rights" value assigned by a clearing PUT
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Whether this is the "no rights" value
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this right confers administrative control
    pub fn grants_admin(&self) -> bool {
        has_admin_flag(&self.0)
    }

    /// Borrow the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Right {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Right {
    fn from(right: &str) -> Self {
        Self::new(right)
    }
}

impl From<String> for Right {
    fn from(right: String) -> Self {
        Self(right)
    }
}

//! Resource and principal identifiers
//!
//! All identifiers are opaque strings taken from request path segments.
//! The only thing checked is that a segment can address something: it is
//! non-empty and free of control characters.

use crate::errors::ValidationError;
use crate::rights::is_reserved_group;
use serde::{Deserialize, Serialize};
use std::fmt;

fn check_segment(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::empty(field));
    }
    if value.chars().any(char::is_control) {
        return Err(ValidationError::control_character(field));
    }
    Ok(())
}

macro_rules! segment_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse from a path segment
            pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
                let value = value.into();
                check_segment($field, &value)?;
                Ok(Self(value))
            }

            /// Borrow the underlying string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

segment_id!(
    /// Kind of protected object, e.g. `device` or `process`
    ResourceKind,
    "kind"
);

segment_id!(
    /// Identifier of a protected object within its kind
    ResourceId,
    "resource"
);

segment_id!(
    /// Opaque user identifier, as carried in the caller's token `sub` claim
    UserId,
    "user"
);

segment_id!(
    /// Group name. `admin` is reserved, see [`is_reserved_group`].
    GroupName,
    "group"
);

impl GroupName {
    /// Whether this is the structural `admin` group
    pub fn is_reserved(&self) -> bool {
        is_reserved_group(&self.0)
    }
}

/// Coordinates of a protected object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource kind
    pub kind: ResourceKind,
    /// Resource identifier
    pub id: ResourceId,
}

impl ResourceRef {
    /// Build from already validated parts
    pub fn new(kind: ResourceKind, id: ResourceId) -> Self {
        Self { kind, id }
    }

    /// Parse both path segments
    pub fn parse(kind: impl Into<String>, id: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            kind: ResourceKind::parse(kind)?,
            id: ResourceId::parse(id)?,
        })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Holder of a right: exactly one user or one group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    /// A single user
    User(UserId),
    /// A named group
    Group(GroupName),
}

impl Principal {
    /// Principal label used in compaction keys and logs
    pub fn label(&self) -> &'static str {
        match self {
            Principal::User(_) => "user",
            Principal::Group(_) => "group",
        }
    }

    /// User or group name
    pub fn name(&self) -> &str {
        match self {
            Principal::User(user) => user.as_str(),
            Principal::Group(group) => group.as_str(),
        }
    }

    /// The user, if this principal is one
    pub fn as_user(&self) -> Option<&UserId> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Group(_) => None,
        }
    }

    /// The group, if this principal is one
    pub fn as_group(&self) -> Option<&GroupName> {
        match self {
            Principal::User(_) => None,
            Principal::Group(group) => Some(group),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label(), self.name())
    }
}

impl From<UserId> for Principal {
    fn from(user: UserId) -> Self {
        Principal::User(user)
    }
}

impl From<GroupName> for Principal {
    fn from(group: GroupName) -> Self {
        Principal::Group(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_validation() {
        assert!(UserId::parse("alice").is_ok());
        assert_eq!(UserId::parse(""), Err(ValidationError::empty("user")));
        assert_eq!(
            ResourceId::parse("dev\n1"),
            Err(ValidationError::control_character("resource"))
        );
        // separators are opaque, not structure
        assert!(ResourceId::parse("urn:infai:ses:device:1/2").is_ok());
    }

    #[test]
    fn test_reserved_group() {
        assert!(GroupName::parse("admin").unwrap().is_reserved());
        assert!(!GroupName::parse("admins").unwrap().is_reserved());
    }

    #[test]
    fn test_principal_accessors() {
        let user: Principal = UserId::parse("alice").unwrap().into();
        assert_eq!(user.label(), "user");
        assert_eq!(user.name(), "alice");
        assert!(user.as_group().is_none());
        assert_eq!(user.to_string(), "user:alice");

        let group: Principal = GroupName::parse("operators").unwrap().into();
        assert_eq!(group.as_group().map(GroupName::as_str), Some("operators"));
        assert!(group.as_user().is_none());
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        let parsed: Result<ResourceKind, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
    }
}

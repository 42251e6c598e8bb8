//! Rights change events
//!
//! A [`ChangeEvent`] is the only thing permgate ever writes to the log.
//! Its wire form is a flat JSON object with fixed field names so that
//! every consumer version can parse it:
//!
//! ```json
//! {"command":"PUT","Kind":"device","Resource":"dev-1","User":"alice","Group":"","Right":"ra"}
//! ```
//!
//! Exactly one of `User` and `Group` is non-empty. `Right` is always empty
//! for `DELETE`.
//!
//! Events are compacted by [`CompactionKey`], which covers the resource and
//! the principal. Two updates for the same resource but different
//! principals therefore never supersede each other.

use crate::errors::DecodeError;
use crate::rights::Right;
use crate::types::{GroupName, Principal, ResourceId, ResourceKind, ResourceRef, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutation kind carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    /// Set (or clear, with an empty right) an assignment
    Put,
    /// Remove an assignment entirely
    Delete,
}

impl Command {
    /// Wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Put => "PUT",
            Command::Delete => "DELETE",
        }
    }

    fn parse(value: &str) -> Result<Self, DecodeError> {
        match value {
            "PUT" => Ok(Command::Put),
            "DELETE" => Ok(Command::Delete),
            other => Err(DecodeError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log key under which events are compacted
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompactionKey(String);

impl CompactionKey {
    /// Key for an assignment of `principal` on `resource`.
    ///
    /// Encoded as the compact JSON array `[kind, resource, label, name]`,
    /// so identifiers containing any separator cannot collide.
    pub fn for_assignment(resource: &ResourceRef, principal: &Principal) -> Self {
        let key = serde_json::json!([
            resource.kind.as_str(),
            resource.id.as_str(),
            principal.label(),
            principal.name(),
        ]);
        Self(key.to_string())
    }

    /// Borrow the key
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key bytes as written to the log
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CompactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single rights change, ready to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    command: Command,
    resource: ResourceRef,
    principal: Principal,
    right: Option<Right>,
}

impl ChangeEvent {
    /// Assign `right` to `principal` on `resource`
    pub fn put(resource: ResourceRef, principal: Principal, right: Right) -> Self {
        Self {
            command: Command::Put,
            resource,
            principal,
            right: Some(right),
        }
    }

    /// Remove `principal`'s assignment on `resource`
    pub fn delete(resource: ResourceRef, principal: Principal) -> Self {
        Self {
            command: Command::Delete,
            resource,
            principal,
            right: None,
        }
    }

    /// Build the event for an authorized mutation. `right` is dropped for
    /// deletions.
    pub fn for_mutation(
        command: Command,
        resource: ResourceRef,
        principal: Principal,
        right: Right,
    ) -> Self {
        match command {
            Command::Put => Self::put(resource, principal, right),
            Command::Delete => Self::delete(resource, principal),
        }
    }

    /// Mutation kind
    pub fn command(&self) -> Command {
        self.command
    }

    /// Target resource
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// Target principal
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Assigned right; `None` for deletions
    pub fn right(&self) -> Option<&Right> {
        self.right.as_ref()
    }

    /// Key under which the log compacts this event
    pub fn compaction_key(&self) -> CompactionKey {
        CompactionKey::for_assignment(&self.resource, &self.principal)
    }

    /// Serialize to the wire schema
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&WireMessage::from(self))
    }

    /// Parse a wire message
    pub fn from_json(bytes: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireMessage = serde_json::from_slice(bytes)?;
        Self::try_from(wire)
    }
}

/// A requested change, before authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RightsMutation {
    /// PUT or DELETE
    pub command: Command,
    /// Target resource
    pub resource: ResourceRef,
    /// Whose assignment changes
    pub principal: Principal,
    /// New right; empty for clears and ignored for deletions
    pub right: Right,
}

impl RightsMutation {
    /// Assign `right`
    pub fn set(resource: ResourceRef, principal: Principal, right: Right) -> Self {
        Self {
            command: Command::Put,
            resource,
            principal,
            right,
        }
    }

    /// Assign the empty right
    pub fn clear(resource: ResourceRef, principal: Principal) -> Self {
        Self::set(resource, principal, Right::empty())
    }

    /// Remove the assignment
    pub fn delete(resource: ResourceRef, principal: Principal) -> Self {
        Self {
            command: Command::Delete,
            resource,
            principal,
            right: Right::empty(),
        }
    }

    /// Whether the principal would end up without the admin flag
    pub fn drops_admin(&self) -> bool {
        match self.command {
            Command::Delete => true,
            Command::Put => !self.right.grants_admin(),
        }
    }

    /// The event announcing this change
    pub fn into_event(self) -> ChangeEvent {
        ChangeEvent::for_mutation(self.command, self.resource, self.principal, self.right)
    }
}

/// Field layout shared with every consumer. Do not rename.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "command")]
    command: String,
    #[serde(rename = "Kind", default)]
    kind: String,
    #[serde(rename = "Resource", default)]
    resource: String,
    #[serde(rename = "User", default)]
    user: String,
    #[serde(rename = "Group", default)]
    group: String,
    #[serde(rename = "Right", default)]
    right: String,
}

impl From<&ChangeEvent> for WireMessage {
    fn from(event: &ChangeEvent) -> Self {
        let (user, group) = match &event.principal {
            Principal::User(user) => (user.to_string(), String::new()),
            Principal::Group(group) => (String::new(), group.to_string()),
        };
        Self {
            command: event.command.as_str().to_string(),
            kind: event.resource.kind.to_string(),
            resource: event.resource.id.to_string(),
            user,
            group,
            right: event.right.as_ref().map(Right::to_string).unwrap_or_default(),
        }
    }
}

impl TryFrom<WireMessage> for ChangeEvent {
    type Error = DecodeError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let command = Command::parse(&wire.command)?;
        let resource = ResourceRef::new(
            ResourceKind::parse(wire.kind)?,
            ResourceId::parse(wire.resource)?,
        );
        let principal = match (wire.user.is_empty(), wire.group.is_empty()) {
            (false, true) => Principal::User(UserId::parse(wire.user)?),
            (true, false) => Principal::Group(GroupName::parse(wire.group)?),
            _ => return Err(DecodeError::AmbiguousPrincipal),
        };
        Ok(Self::for_mutation(
            command,
            resource,
            principal,
            Right::new(wire.right),
        ))
    }
}

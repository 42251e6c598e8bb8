//! Authorization gate
//!
//! Decides whether a caller may apply a [`RightsMutation`]. Two layers run
//! in order:
//!
//! 1. Self-protection rules, evaluated locally from the token alone.
//! 2. The remote admin check, via [`AdminCheck`].
//!
//! A request that breaks a local rule never reaches the remote service.
//!
//! | Rule | Applies when | Status |
//! |---|---|---|
//! | `OwnRightsRemoval` | caller deletes their own user assignment | 400 |
//! | `OwnAdminRemoval` | caller PUTs a right without `a` on themselves | 400 |
//! | `ReservedGroupProtected` | non-admin caller deletes or drops `a` from group `admin` | 403 |

use crate::check::{AccessDenied, AdminCheck, CheckError};
use crate::context::AuthContext;
use permgate_core::{Command, Principal, RightsMutation};
use std::sync::Arc;

/// A local rule that rejects a mutation outright
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SelfProtectionViolation {
    /// Caller tried to delete their own assignment
    #[error("user cannot remove their own rights")]
    OwnRightsRemoval,

    /// Caller tried to drop their own admin flag
    #[error("user cannot remove their own administration right")]
    OwnAdminRemoval,

    /// Caller without the admin claim tried to demote the admin group
    #[error("only the admin group may remove admin rights from the admin group")]
    ReservedGroupProtected,
}

impl SelfProtectionViolation {
    /// Whether this is reported as forbidden rather than a bad request
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::ReservedGroupProtected)
    }
}

/// Why the gate stopped a mutation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// A local rule fired; the remote check was not consulted
    #[error(transparent)]
    SelfProtection(#[from] SelfProtectionViolation),

    /// The remote check denied, or could not be reached
    #[error(transparent)]
    Denied(#[from] AccessDenied),

    /// The remote check could not be built from local input
    #[error("{message}")]
    InvalidRequest {
        /// What went wrong
        message: String,
    },
}

impl From<CheckError> for GateError {
    fn from(err: CheckError) -> Self {
        match err {
            CheckError::Denied(denied) => Self::Denied(denied),
            CheckError::InvalidRequest { message } => Self::InvalidRequest { message },
        }
    }
}

/// Evaluate the self-protection rules for `mutation` requested by `ctx`
pub fn check_self_protection(
    ctx: &AuthContext,
    mutation: &RightsMutation,
) -> Result<(), SelfProtectionViolation> {
    match &mutation.principal {
        Principal::User(user) if user == ctx.user_id() => match mutation.command {
            Command::Delete => Err(SelfProtectionViolation::OwnRightsRemoval),
            Command::Put if !mutation.right.grants_admin() => {
                Err(SelfProtectionViolation::OwnAdminRemoval)
            }
            Command::Put => Ok(()),
        },
        Principal::Group(group) if group.is_reserved() && !ctx.is_admin() => {
            if mutation.drops_admin() {
                Err(SelfProtectionViolation::ReservedGroupProtected)
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// Local rules layered over a remote admin check
#[derive(Clone)]
pub struct AuthorizationGate {
    check: Arc<dyn AdminCheck>,
}

impl AuthorizationGate {
    /// Gate backed by `check`
    pub fn new(check: Arc<dyn AdminCheck>) -> Self {
        Self { check }
    }

    /// Admit or reject `mutation` on behalf of `ctx`
    pub async fn authorize(
        &self,
        ctx: &AuthContext,
        mutation: &RightsMutation,
    ) -> Result<(), GateError> {
        if let Err(violation) = check_self_protection(ctx, mutation) {
            tracing::warn!(
                user = %ctx.user_id(),
                principal = %mutation.principal,
                resource = %mutation.resource,
                %violation,
                "self-protection rule rejected mutation"
            );
            return Err(violation.into());
        }

        self.check.check_admin(ctx, &mutation.resource).await?;
        Ok(())
    }
}

impl std::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate").finish_non_exhaustive()
    }
}

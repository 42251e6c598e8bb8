//! Mutation orchestration
//!
//! Each request moves through a fixed sequence of states:
//!
//! ```text
//! Received -> Authorizing -> Denied
//!                         -> SelfProtectionViolation
//!                         -> CheckFailed
//!                         -> Authorized -> Publishing -> Published
//!                                                     -> PublishFailed
//! ```
//!
//! Every terminal state maps to exactly one response. Nothing is published
//! unless the gate admitted the request, and a request the gate admitted
//! either produces exactly one record or an error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use permgate_authorization::{
    AccessDenied, AuthContext, AuthorizationGate, GateError, SelfProtectionViolation, TokenError,
};
use permgate_core::{RightsMutation, ValidationError};
use permgate_log::{EventPublisher, PublishError, RecordPosition};
use std::fmt;
use tracing::{debug, info, warn};

/// Where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Parsed and validated
    Received,
    /// Gate is evaluating
    Authorizing,
    /// Remote check refused or was unavailable
    Denied,
    /// A local rule fired
    SelfProtectionViolation,
    /// The admin check could not be issued
    CheckFailed,
    /// Gate admitted the request
    Authorized,
    /// Event is being written
    Publishing,
    /// Event acknowledged
    Published,
    /// Event could not be written
    PublishFailed,
}

impl MutationState {
    /// Whether `next` may follow this state
    pub fn can_transition_to(self, next: MutationState) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Authorizing)
                | (
                    Self::Authorizing,
                    Self::Denied
                        | Self::SelfProtectionViolation
                        | Self::CheckFailed
                        | Self::Authorized
                )
                | (Self::Authorized, Self::Publishing)
                | (Self::Publishing, Self::Published | Self::PublishFailed)
        )
    }

    /// Whether the request is finished
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Denied
                | Self::SelfProtectionViolation
                | Self::CheckFailed
                | Self::Published
                | Self::PublishFailed
        )
    }
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Authorizing => "authorizing",
            Self::Denied => "denied",
            Self::SelfProtectionViolation => "self_protection_violation",
            Self::CheckFailed => "check_failed",
            Self::Authorized => "authorized",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::PublishFailed => "publish_failed",
        };
        f.write_str(name)
    }
}

/// Traces one request's state transitions
struct Lifecycle<'a> {
    state: MutationState,
    mutation: &'a RightsMutation,
}

impl<'a> Lifecycle<'a> {
    fn start(mutation: &'a RightsMutation) -> Self {
        debug!(
            command = %mutation.command,
            resource = %mutation.resource,
            principal = %mutation.principal,
            state = %MutationState::Received,
            "mutation received"
        );
        Self {
            state: MutationState::Received,
            mutation,
        }
    }

    fn advance(&mut self, next: MutationState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!(
            resource = %self.mutation.resource,
            principal = %self.mutation.principal,
            from = %self.state,
            to = %next,
            "mutation state"
        );
        self.state = next;
    }
}

/// Why a mutation was not applied
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// A path segment is not a usable identifier
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Caller credential missing or unreadable
    #[error(transparent)]
    Token(#[from] TokenError),

    /// A self-protection rule fired
    #[error(transparent)]
    SelfProtection(SelfProtectionViolation),

    /// Remote check refused or was unavailable
    #[error(transparent)]
    Denied(AccessDenied),

    /// The remote check could not be formed from local input
    #[error("{message}")]
    InvalidRequest {
        /// What went wrong
        message: String,
    },

    /// The event could not be written
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl From<GateError> for MutationError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::SelfProtection(violation) => Self::SelfProtection(violation),
            GateError::Denied(denied) => Self::Denied(denied),
            GateError::InvalidRequest { message } => Self::InvalidRequest { message },
        }
    }
}

impl MutationError {
    /// Response status
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Token(_) => StatusCode::BAD_REQUEST,
            Self::SelfProtection(violation) if violation.is_forbidden() => StatusCode::FORBIDDEN,
            Self::SelfProtection(_) => StatusCode::BAD_REQUEST,
            Self::Denied(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest { .. } | Self::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MutationError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Authorizes and publishes rights mutations
#[derive(Debug)]
pub struct MutationService {
    gate: AuthorizationGate,
    publisher: EventPublisher,
}

impl MutationService {
    /// Service deciding with `gate` and writing through `publisher`
    pub fn new(gate: AuthorizationGate, publisher: EventPublisher) -> Self {
        Self { gate, publisher }
    }

    /// Publisher in use
    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Authorize `mutation` for `ctx` and publish its event
    pub async fn apply(
        &self,
        ctx: &AuthContext,
        mutation: RightsMutation,
    ) -> Result<RecordPosition, MutationError> {
        let mut lifecycle = Lifecycle::start(&mutation);

        lifecycle.advance(MutationState::Authorizing);
        match self.gate.authorize(ctx, &mutation).await {
            Ok(()) => lifecycle.advance(MutationState::Authorized),
            Err(GateError::SelfProtection(violation)) => {
                lifecycle.advance(MutationState::SelfProtectionViolation);
                return Err(MutationError::SelfProtection(violation));
            }
            Err(GateError::Denied(denied)) => {
                lifecycle.advance(MutationState::Denied);
                info!(
                    user = %ctx.user_id(),
                    resource = %mutation.resource,
                    reason = %denied,
                    "mutation denied"
                );
                return Err(MutationError::Denied(denied));
            }
            Err(err @ GateError::InvalidRequest { .. }) => {
                lifecycle.advance(MutationState::CheckFailed);
                warn!(resource = %mutation.resource, error = %err, "admin check not attempted");
                return Err(err.into());
            }
        }

        lifecycle.advance(MutationState::Publishing);
        let event = mutation.clone().into_event();
        match self.publisher.publish(&event).await {
            Ok(position) => {
                lifecycle.advance(MutationState::Published);
                info!(
                    user = %ctx.user_id(),
                    command = %event.command(),
                    resource = %event.resource(),
                    principal = %event.principal(),
                    offset = position.offset,
                    "rights change published"
                );
                Ok(position)
            }
            Err(err) => {
                lifecycle.advance(MutationState::PublishFailed);
                tracing::error!(
                    resource = %event.resource(),
                    principal = %event.principal(),
                    error = %err,
                    "rights change not published"
                );
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permgate_log::BrokerError;

    type S = MutationState;

    #[test]
    fn test_transitions() {
        assert!(S::Received.can_transition_to(S::Authorizing));
        assert!(S::Authorizing.can_transition_to(S::SelfProtectionViolation));
        assert!(S::Authorizing.can_transition_to(S::CheckFailed));
        assert!(S::Authorized.can_transition_to(S::Publishing));
        assert!(S::Publishing.can_transition_to(S::PublishFailed));

        assert!(!S::Received.can_transition_to(S::Publishing));
        assert!(!S::Denied.can_transition_to(S::Publishing));
        assert!(!S::SelfProtectionViolation.can_transition_to(S::Authorized));
        assert!(!S::Published.can_transition_to(S::Publishing));
        assert!(!S::CheckFailed.can_transition_to(S::Publishing));
    }

    #[test]
    fn test_terminal_states() {
        for state in [
            S::Denied,
            S::SelfProtectionViolation,
            S::CheckFailed,
            S::Published,
            S::PublishFailed,
        ] {
            assert!(state.is_terminal());
        }
        for state in [S::Received, S::Authorizing, S::Authorized, S::Publishing] {
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                MutationError::Validation(ValidationError::empty("kind")),
                StatusCode::BAD_REQUEST,
            ),
            (
                MutationError::Token(TokenError::Missing),
                StatusCode::BAD_REQUEST,
            ),
            (
                MutationError::SelfProtection(SelfProtectionViolation::OwnRightsRemoval),
                StatusCode::BAD_REQUEST,
            ),
            (
                MutationError::SelfProtection(SelfProtectionViolation::OwnAdminRemoval),
                StatusCode::BAD_REQUEST,
            ),
            (
                MutationError::SelfProtection(SelfProtectionViolation::ReservedGroupProtected),
                StatusCode::FORBIDDEN,
            ),
            (
                MutationError::Denied(AccessDenied::Rejected { status: 403 }),
                StatusCode::UNAUTHORIZED,
            ),
            (
                MutationError::InvalidRequest {
                    message: "bad url".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                MutationError::Publish(PublishError::Rejected(BrokerError::rejected("too big"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status, "{error}");
        }
    }
}

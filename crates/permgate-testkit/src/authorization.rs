//! Authorization fixtures
//!
//! [`ScriptedAdminCheck`] answers every admin check with a fixed verdict
//! and records who asked. [`TokenBuilder`] mints unsigned bearer tokens in
//! the shape the gateway decodes.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use permgate_authorization::{AccessDenied, AdminCheck, AuthContext, CheckError};
use permgate_core::{ResourceRef, UserId};
use std::sync::{Arc, Mutex};

/// Answer given by a [`ScriptedAdminCheck`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Caller administers the resource
    Allow,
    /// Service answers with this status
    Deny(u16),
    /// Service cannot be reached
    Unreachable,
    /// The check request cannot be built
    InvalidRequest,
}

/// One recorded admin check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckCall {
    /// Caller
    pub user: UserId,
    /// Forwarded credential
    pub credential: String,
    /// Resource asked about
    pub resource: ResourceRef,
}

#[derive(Debug)]
struct Script {
    verdict: Verdict,
    calls: Vec<CheckCall>,
}

/// Admin check with a fixed, changeable answer
#[derive(Debug, Clone)]
pub struct ScriptedAdminCheck {
    script: Arc<Mutex<Script>>,
}

impl ScriptedAdminCheck {
    /// Check answering `verdict`
    pub fn new(verdict: Verdict) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                verdict,
                calls: Vec::new(),
            })),
        }
    }

    /// Grants every request
    pub fn allow() -> Self {
        Self::new(Verdict::Allow)
    }

    /// Rejects every request with `status`
    pub fn deny(status: u16) -> Self {
        Self::new(Verdict::Deny(status))
    }

    /// Behaves like a service that is down
    pub fn unreachable() -> Self {
        Self::new(Verdict::Unreachable)
    }

    /// Fails before any request is sent
    pub fn invalid_request() -> Self {
        Self::new(Verdict::InvalidRequest)
    }

    /// Change the answer for later requests
    pub fn set_verdict(&self, verdict: Verdict) {
        self.script.lock().unwrap().verdict = verdict;
    }

    /// Requests seen so far
    pub fn calls(&self) -> Vec<CheckCall> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Number of requests seen so far
    pub fn call_count(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }
}

#[async_trait]
impl AdminCheck for ScriptedAdminCheck {
    async fn check_admin(
        &self,
        ctx: &AuthContext,
        resource: &ResourceRef,
    ) -> Result<(), CheckError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(CheckCall {
            user: ctx.user_id().clone(),
            credential: ctx.credential().to_string(),
            resource: resource.clone(),
        });
        match script.verdict {
            Verdict::Allow => Ok(()),
            Verdict::Deny(status) => Err(AccessDenied::Rejected { status }.into()),
            Verdict::Unreachable => Err(AccessDenied::Unreachable {
                message: "connection refused".to_string(),
            }
            .into()),
            Verdict::InvalidRequest => Err(CheckError::InvalidRequest {
                message: "check URL cannot be formed".to_string(),
            }),
        }
    }
}

/// Builds unsigned JWT bearer tokens
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    subject: String,
    roles: Vec<String>,
}

impl TokenBuilder {
    /// Token for user `subject` with no roles
    pub fn user(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            roles: Vec::new(),
        }
    }

    /// Add the structural admin role
    pub fn admin(self) -> Self {
        self.role("admin")
    }

    /// Add a realm role
    pub fn role(mut self, role: &str) -> Self {
        self.roles.push(role.to_string());
        self
    }

    /// The bare `header.payload.signature` token
    pub fn token(&self) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = serde_json::json!({
            "sub": self.subject,
            "realm_access": { "roles": self.roles },
        });
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    /// `Authorization` header value
    pub fn header(&self) -> String {
        format!("Bearer {}", self.token())
    }

    /// Decoded caller context
    pub fn context(&self) -> AuthContext {
        AuthContext::from_authorization_header(&self.header())
            .expect("TokenBuilder produces decodable tokens")
    }
}

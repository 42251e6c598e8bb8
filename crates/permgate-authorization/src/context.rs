//! Caller identity
//!
//! The gateway runs behind an authenticating proxy, so the bearer token is
//! decoded here without signature verification. Only two facts are taken
//! from it: who the caller is (`sub`) and whether they belong to the
//! structural admin role (`realm_access.roles`). The raw header is kept so
//! it can be forwarded verbatim to the authorization-check service, which
//! does verify it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use permgate_core::rights::RESERVED_ADMIN_GROUP;
use permgate_core::{UserId, ValidationError};
use serde::Deserialize;

/// Errors reading the caller's credential
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// No `Authorization` header
    #[error("Missing authorization header")]
    Missing,

    /// Header present but not a three-part JWT
    #[error("Malformed token: {message}")]
    Malformed {
        /// What was wrong with the token
        message: String,
    },

    /// Token subject is not a usable user id
    #[error("Invalid token subject: {0}")]
    Subject(#[from] ValidationError),
}

impl TokenError {
    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    realm_access: RealmAccess,
}

#[derive(Debug, Default, Deserialize)]
struct RealmAccess {
    #[serde(default)]
    roles: Vec<String>,
}

/// Who is asking for a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    user_id: UserId,
    admin: bool,
    credential: String,
}

impl AuthContext {
    /// Build directly from known facts
    pub fn new(user_id: UserId, admin: bool, credential: impl Into<String>) -> Self {
        Self {
            user_id,
            admin,
            credential: credential.into(),
        }
    }

    /// Parse an `Authorization` header value (`Bearer <jwt>`)
    pub fn from_authorization_header(header: &str) -> Result<Self, TokenError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(TokenError::Missing);
        }

        let token = match header.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
            Some(_) => return Err(TokenError::malformed("unsupported authorization scheme")),
            None => header,
        };

        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(TokenError::malformed("expected three dot-separated segments")),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| TokenError::malformed(format!("payload is not base64url: {e}")))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| TokenError::malformed(format!("payload is not a claim set: {e}")))?;

        let admin = claims
            .realm_access
            .roles
            .iter()
            .any(|role| role == RESERVED_ADMIN_GROUP);

        Ok(Self {
            user_id: UserId::parse(claims.sub)?,
            admin,
            credential: header.to_string(),
        })
    }

    /// Caller's user id
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Whether the caller holds the structural admin claim
    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Header value to forward when impersonating the caller
    pub fn credential(&self) -> &str {
        &self.credential
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("Bearer {header}.{payload}.")
    }

    #[test]
    fn test_parse_plain_user() {
        let header = token(serde_json::json!({"sub": "alice"}));
        let ctx = AuthContext::from_authorization_header(&header).unwrap();
        assert_eq!(ctx.user_id().as_str(), "alice");
        assert!(!ctx.is_admin());
        assert_eq!(ctx.credential(), header);
    }

    #[test]
    fn test_parse_admin_role() {
        let header = token(serde_json::json!({
            "sub": "root",
            "realm_access": {"roles": ["user", "admin"]}
        }));
        let ctx = AuthContext::from_authorization_header(&header).unwrap();
        assert!(ctx.is_admin());
    }

    #[test]
    fn test_rejects_missing_and_garbage() {
        assert_eq!(
            AuthContext::from_authorization_header("  "),
            Err(TokenError::Missing)
        );
        assert!(matches!(
            AuthContext::from_authorization_header("Bearer nope"),
            Err(TokenError::Malformed { .. })
        ));
        assert!(matches!(
            AuthContext::from_authorization_header("Basic dXNlcjpwdw=="),
            Err(TokenError::Malformed { .. })
        ));
        assert!(matches!(
            AuthContext::from_authorization_header("Bearer a.!!!.c"),
            Err(TokenError::Malformed { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_subject() {
        let header = token(serde_json::json!({"sub": ""}));
        assert!(matches!(
            AuthContext::from_authorization_header(&header),
            Err(TokenError::Subject(_))
        ));
    }
}

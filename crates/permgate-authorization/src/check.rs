//! Remote admin-right check
//!
//! Whether a caller administers a resource is decided by an external
//! authorization service. [`AdminCheck`] is the seam; [`HttpAdminCheck`]
//! asks the service over HTTP and [`AllowAll`] is the operator opt-out.

use crate::context::AuthContext;
use async_trait::async_trait;
use permgate_core::ResourceRef;
use reqwest::header::AUTHORIZATION;
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// The remote check said no, or could not be asked
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    /// Service answered with something other than 200
    #[error("access denied (authorization service returned {status})")]
    Rejected {
        /// HTTP status returned
        status: u16,
    },

    /// Service could not be reached; treated as a denial, never as allow
    #[error("access denied (authorization service unreachable: {message})")]
    Unreachable {
        /// Transport failure description
        message: String,
    },
}

/// Failure to consult the admin check
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    /// Caller does not administer the resource
    #[error(transparent)]
    Denied(#[from] AccessDenied),

    /// The check request could not be built from local input
    #[error("cannot build authorization check request: {message}")]
    InvalidRequest {
        /// What could not be built
        message: String,
    },
}

impl CheckError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Decides whether the caller administers a resource
#[async_trait]
pub trait AdminCheck: Send + Sync {
    /// `Ok(())` if `ctx` holds the admin flag on `resource`
    async fn check_admin(&self, ctx: &AuthContext, resource: &ResourceRef)
        -> Result<(), CheckError>;
}

/// Asks the authorization service with
/// `HEAD {base}/{kind}/{id}?rights=a`, forwarding the caller's credential
#[derive(Debug, Clone)]
pub struct HttpAdminCheck {
    client: reqwest::Client,
    base: Url,
}

impl HttpAdminCheck {
    /// Default per-request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a check against `base` with the default timeout
    pub fn new(base: &str) -> Result<Self, CheckError> {
        Self::with_timeout(base, Self::DEFAULT_TIMEOUT)
    }

    /// Create a check against `base`, giving up on each request after
    /// `timeout`
    pub fn with_timeout(base: &str, timeout: Duration) -> Result<Self, CheckError> {
        let base = Url::parse(base)
            .map_err(|e| CheckError::invalid_request(format!("invalid base url {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CheckError::invalid_request(format!(
                "base url {base} cannot carry a path"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckError::invalid_request(format!("http client: {e}")))?;
        Ok(Self { client, base })
    }

    /// URL asked for `resource`; segments are percent-encoded
    pub fn check_url(&self, resource: &ResourceRef) -> Result<Url, CheckError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                CheckError::invalid_request(format!("base url {} cannot carry a path", self.base))
            })?;
            segments
                .pop_if_empty()
                .push(resource.kind.as_str())
                .push(resource.id.as_str());
        }
        url.query_pairs_mut().append_pair("rights", "a");
        Ok(url)
    }
}

#[async_trait]
impl AdminCheck for HttpAdminCheck {
    async fn check_admin(
        &self,
        ctx: &AuthContext,
        resource: &ResourceRef,
    ) -> Result<(), CheckError> {
        let url = self.check_url(resource)?;

        let response = self
            .client
            .head(url)
            .header(AUTHORIZATION, ctx.credential())
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    CheckError::invalid_request(e.to_string())
                } else {
                    tracing::warn!(%resource, error = %e, "authorization service unreachable");
                    AccessDenied::Unreachable {
                        message: e.to_string(),
                    }
                    .into()
                }
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            Ok(())
        } else {
            tracing::debug!(%resource, user = %ctx.user_id(), %status, "admin check rejected");
            Err(AccessDenied::Rejected {
                status: status.as_u16(),
            }
            .into())
        }
    }
}

/// Grants every admin check.
///
/// Only for deployments that explicitly configure `mode = "allow-all"`;
/// self-protection rules still apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AdminCheck for AllowAll {
    async fn check_admin(
        &self,
        _ctx: &AuthContext,
        _resource: &ResourceRef,
    ) -> Result<(), CheckError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_url_encodes_segments() {
        let check = HttpAdminCheck::new("http://permsearch:8080/v3/resources").unwrap();
        let resource = ResourceRef::parse("device", "urn:dev/1 2").unwrap();
        let url = check.check_url(&resource).unwrap();
        assert_eq!(
            url.as_str(),
            "http://permsearch:8080/v3/resources/device/urn:dev%2F1%202?rights=a"
        );
    }

    #[test]
    fn test_check_url_tolerates_trailing_slash() {
        let check = HttpAdminCheck::new("http://permsearch/v3/resources/").unwrap();
        let resource = ResourceRef::parse("device", "dev-1").unwrap();
        assert_eq!(
            check.check_url(&resource).unwrap().as_str(),
            "http://permsearch/v3/resources/device/dev-1?rights=a"
        );
    }

    #[test]
    fn test_rejects_unusable_base() {
        assert!(matches!(
            HttpAdminCheck::new("not a url"),
            Err(CheckError::InvalidRequest { .. })
        ));
        assert!(matches!(
            HttpAdminCheck::new("mailto:ops@example.com"),
            Err(CheckError::InvalidRequest { .. })
        ));
    }
}

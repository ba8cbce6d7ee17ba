//! Credential attachment.
//!
//! Acquiring tokens is somebody else's job; these authorizers only stamp an
//! already-issued credential onto each request.

use async_trait::async_trait;

use super::{Authorizer, HttpRequest};

/// Passes requests through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthorization;

#[async_trait]
impl Authorizer for NoAuthorization {
    async fn authorize(&self, request: HttpRequest) -> HttpRequest {
        request
    }
}

/// Sets `Authorization: Bearer <token>` on every request.
#[derive(Clone)]
pub struct BearerTokenAuthorizer {
    token: String,
}

impl BearerTokenAuthorizer {
    /// Creates an authorizer for a fixed access token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for BearerTokenAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuthorizer")
            .field("token", &"***")
            .finish()
    }
}

#[async_trait]
impl Authorizer for BearerTokenAuthorizer {
    async fn authorize(&self, mut request: HttpRequest) -> HttpRequest {
        request.set_header("authorization", &format!("Bearer {}", self.token));
        request
    }
}

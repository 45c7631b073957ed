//! Administrator identity lookups.
//!
//! The platform front end strips `X-AppEngine-*` headers from external
//! traffic and injects its own, so their presence can be trusted.

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;

pub const USER_IS_ADMIN_HEADER: &str = "x-appengine-user-is-admin";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Malformed identity header: {0}")]
    MalformedHeader(&'static str),
    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

/// Answers "is the currently authenticated user an administrator of this
/// application" for the request being served.
#[async_trait]
pub trait AdminIdentity: Send + Sync {
    async fn is_current_user_admin(&self, headers: &HeaderMap) -> Result<bool, IdentityError>;
}

/// Reads the admin flag the platform attaches to every signed-in request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformIdentity;

#[async_trait]
impl AdminIdentity for PlatformIdentity {
    async fn is_current_user_admin(&self, headers: &HeaderMap) -> Result<bool, IdentityError> {
        match headers.get(USER_IS_ADMIN_HEADER) {
            None => Ok(false),
            Some(value) => value
                .to_str()
                .map(|v| v.trim() == "1")
                .map_err(|_| IdentityError::MalformedHeader(USER_IS_ADMIN_HEADER)),
        }
    }
}

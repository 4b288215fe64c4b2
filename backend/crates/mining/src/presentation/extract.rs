//! Request extractors
//!
//! The upstream gateway authenticates the caller and forwards the user id in
//! [`USER_ID_HEADER`]. This service trusts that header and does no
//! authentication of its own.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::value_objects::UserId;
use crate::error::MiningError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity supplied by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = MiningError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<UserId>().ok())
            .map(AuthenticatedUser)
            .ok_or(MiningError::Unauthenticated)
    }
}

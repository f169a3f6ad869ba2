//! Caller identity.
//!
//! Authentication happens upstream; the authenticated user id arrives in the
//! `X-User-Id` header.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::WebError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller. Every ledger operation is scoped to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(UserId)
            .ok_or_else(|| WebError::unauthorized("Authentication required"))
    }
}

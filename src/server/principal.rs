// Principal extraction.
//
// Authentication happens upstream. The auth layer either inserts a
// `Principal` request extension or forwards the verified identity in the
// x-user-* headers. Missing identity is not rejected here; the guard decides.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

use crate::household::Principal;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The request's principal, if the auth layer supplied one.
#[derive(Debug, Clone)]
pub struct OptionalPrincipal(pub Option<Principal>);

impl OptionalPrincipal {
    pub fn as_ref(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalPrincipal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(OptionalPrincipal(Some(principal.clone())));
        }

        let principal = header_value(parts, USER_ID_HEADER)
            .filter(|id| !id.is_empty())
            .map(|id| Principal {
                id,
                name: header_value(parts, USER_NAME_HEADER).unwrap_or_default(),
                email: header_value(parts, USER_EMAIL_HEADER).unwrap_or_default(),
            });

        Ok(OptionalPrincipal(principal))
    }
}

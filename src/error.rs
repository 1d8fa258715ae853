// ⚠️ Error Taxonomy - Typed outcomes for access control and realtime fan-out
//
// Guard errors never cross into the transport as panics; the server adapter
// turns them into status responses. Channel errors are either fatal startup
// bugs (NotInitialized) or rejected events.

use thiserror::Error;

/// Denial produced by the role and ownership guards.
#[derive(Debug, Error)]
pub enum AccessError {
    /// No principal, or resource existence deliberately obscured.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Principal known but lacks privilege.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Resource outside any household (e.g. an alert) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Membership store failed to answer.
    #[error("membership store failure: {0}")]
    Store(#[source] anyhow::Error),
}

impl AccessError {
    pub fn missing_principal() -> Self {
        AccessError::Unauthenticated("user not authenticated".to_string())
    }

    pub fn missing_household_id() -> Self {
        AccessError::BadRequest("missing household id".to_string())
    }

    pub fn household_not_found() -> Self {
        AccessError::Unauthenticated("household not found".to_string())
    }

    pub fn not_a_member() -> Self {
        AccessError::Forbidden("not a member of this household".to_string())
    }

    pub fn insufficient_role(required: crate::RequiredRole) -> Self {
        AccessError::Forbidden(format!("requires {} role or higher", required))
    }

    pub fn not_resource_owner() -> Self {
        AccessError::Forbidden("not resource owner".to_string())
    }

    /// HTTP status code for this denial.
    pub fn status_code(&self) -> u16 {
        match self {
            AccessError::Unauthenticated(_) => 401,
            AccessError::Forbidden(_) => 403,
            AccessError::BadRequest(_) => 400,
            AccessError::NotFound(_) => 404,
            AccessError::Store(_) => 500,
        }
    }

    /// Message safe to show a client. Store failures are not echoed.
    pub fn public_message(&self) -> String {
        match self {
            AccessError::Store(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Realtime channel failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel manager was never constructed. Startup-ordering bug;
    /// the process must not serve household traffic.
    #[error("channel manager not initialized")]
    NotInitialized,

    /// Event rejected at the broadcast boundary.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

/// Rejected server configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid listen address '{0}'")]
    InvalidListenAddr(String),

    #[error("allowed origin list must name explicit origins: {0}")]
    InvalidOrigins(String),

    #[error("channel buffer must be greater than zero")]
    ZeroChannelBuffer,
}

// Error taxonomy shared by every client operation.

use serde::Deserialize;
use thiserror::Error;

/// Server-side classification of a response, parsed from the `status`
/// field of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    /// Bad or expired credentials or session token.
    Unauthorized,
    /// Bad request parameters (duplicate username, unknown field, ...).
    Invalid,
    /// Unexpected server failure. Also synthesized client-side for
    /// transport failures and non-JSON response bodies.
    #[serde(rename = "error")]
    ServerError,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Unauthorized => write!(f, "unauthorized"),
            Status::Invalid => write!(f, "invalid"),
            Status::ServerError => write!(f, "error"),
        }
    }
}

/// Error delivered by client operations. Every outcome of a dispatched
/// request reaches the caller through a `Result` carrying one of these;
/// nothing is thrown across the async boundary.
#[derive(Debug, Clone, Error)]
pub enum KnechtError {
    /// The server rejected the credentials or session token. The only
    /// category that triggers the single automatic relogin retry.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The server rejected the request parameters.
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Server fault, non-JSON response body, or transport failure.
    #[error("server error: {0}")]
    Server(String),
    /// The client configuration could not be built.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// An authenticated operation was invoked with no cached session.
    #[error("not logged in")]
    NotLoggedIn,
}

impl KnechtError {
    /// Build the error matching a non-`Ok` response classification.
    pub(crate) fn from_status(status: Status, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| "no message from server".to_string());
        match status {
            Status::Unauthorized => KnechtError::Unauthorized(message),
            Status::Invalid => KnechtError::Invalid(message),
            Status::Ok | Status::ServerError => KnechtError::Server(message),
        }
    }

    /// Whether this error is eligible for the automatic relogin retry.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, KnechtError::Unauthorized(_))
    }
}

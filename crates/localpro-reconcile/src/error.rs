use thiserror::Error;

use crate::status::Gateway;

/// Failure while asking a payment gateway for the status of one payment.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited by {0}")]
    RateLimited(Gateway),

    #[error("Payment not found: {0}")]
    NotFound(String),

    #[error("Gateway API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid gateway response: {0}")]
    Decode(String),

    #[error("Invalid gateway request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Unauthorized(_)
            | Self::NotFound(_)
            | Self::Decode(_)
            | Self::InvalidRequest(_) => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Failure reported by a target store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Malformed document {id}: {message}")]
    Malformed { id: String, message: String },
}

impl RepositoryError {
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Invalid schedule definition.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("No upcoming fire time for '{0}'")]
    Exhausted(String),
}

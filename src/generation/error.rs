//! Text-generation errors.
//!
//! The variant decides which degraded message the chat layer shows once every
//! model in the ring has failed.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// HTTP 503
    #[error("Model overloaded (HTTP 503): {0}")]
    Overloaded(String),

    /// HTTP 429
    #[error("Rate limited (HTTP 429): {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// HTTP 400
    #[error("Request rejected (HTTP 400): {0}")]
    BadRequest(String),

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Well-formed answer without text, e.g. blocked by a safety filter.
    #[error("Empty response: {0}")]
    Empty(String),

    #[error("No generation model available: {0}")]
    Unavailable(String),
}

impl LlmError {
    /// Build an error from a non-success HTTP response.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = body.to_string();
        match status {
            503 => Self::Overloaded(message),
            429 => Self::RateLimited {
                message,
                retry_after,
            },
            400 => Self::BadRequest(message),
            status => Self::Http { status, message },
        }
    }

    /// HTTP status behind this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Overloaded(_) => Some(503),
            Self::RateLimited { .. } => Some(429),
            Self::BadRequest(_) => Some(400),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

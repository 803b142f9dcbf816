//! Error types for configuration loading and individual target requests.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while assembling a [`crate::config::RunConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No target URL was supplied by any configuration source
    #[error("Missing target URL: pass --target-url or set LOAD_RUNNER_TARGET_URL")]
    MissingTargetUrl,

    /// Target URL could not be parsed or uses an unsupported scheme
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidTargetUrl { url: String, reason: String },

    /// A numeric setting is out of range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Configuration file or environment layering failed
    #[error("Failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Why a single GET against the target did not count as a success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("got status {0}")]
    Status(StatusCode),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// Aborted by a hard stop before a response arrived
    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    /// Short label used to bucket failures in the final report.
    pub fn reason(&self) -> String {
        match self {
            RequestError::Status(status) => format!("HTTP {}", status.as_u16()),
            RequestError::Timeout(_) => "timeout".to_string(),
            RequestError::Connect(_) => "connection failed".to_string(),
            RequestError::Transport(_) => "transport error".to_string(),
            RequestError::Cancelled => "cancelled".to_string(),
        }
    }
}

impl From<(reqwest::Error, Duration)> for RequestError {
    fn from((err, timeout): (reqwest::Error, Duration)) -> Self {
        if err.is_timeout() {
            RequestError::Timeout(timeout)
        } else if err.is_connect() {
            RequestError::Connect(error_chain(&err))
        } else {
            RequestError::Transport(error_chain(&err))
        }
    }
}

/// reqwest hides the useful part (e.g. "Connection refused") in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

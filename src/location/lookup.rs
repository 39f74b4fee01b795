//! Failure type shared by the external location lookups.

use serde::Serialize;
use thiserror::Error;

/// Why a best-effort lookup produced nothing. Never escalated past the
/// verifier; recorded on the verification instead.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LookupFailure {
    #[error("request timed out")]
    Timeout,

    #[error("service returned HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("no result: {0}")]
    NoResult(String),
}

impl From<reqwest::Error> for LookupFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LookupFailure::Timeout
        } else if let Some(status) = err.status() {
            LookupFailure::Status(status.as_u16())
        } else if err.is_decode() {
            LookupFailure::Decode(err.to_string())
        } else {
            LookupFailure::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LookupFailure {
    fn from(err: serde_json::Error) -> Self {
        LookupFailure::Decode(err.to_string())
    }
}

pub type LookupResult<T> = std::result::Result<T, LookupFailure>;

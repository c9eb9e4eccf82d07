// ===============================
// src/error.rs
// ===============================
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ErrorInfo;

/// Text shown for every failed fetch, whatever the cause.
pub const FETCH_ERROR_MESSAGE: &str = "No data available or API error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Http,
    Parse,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Http => "http",
            ErrorKind::Parse => "parse",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("malformed payload: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Network(_) => ErrorKind::Network,
            FetchError::Http { .. } => ErrorKind::Http,
            FetchError::Parse(_) => ErrorKind::Parse,
        }
    }

    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo {
            kind: self.kind(),
            message: FETCH_ERROR_MESSAGE.to_string(),
            detail: self.to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Network("request timed out".to_string())
        } else if e.is_decode() {
            FetchError::Parse(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self { FetchError::Parse(e.to_string()) }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid API_URL {value:?}: {source}")]
    ApiUrl { value: String, source: url::ParseError },
    #[error("API_URL must be http or https, got {0:?}")]
    ApiScheme(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("controller disposed")]
    Disposed,
}

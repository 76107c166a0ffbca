//! Piazza client error types

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// HTTP request failed
    Http(reqwest::Error),
    /// Response body could not be decoded
    Json(serde_json::Error),
    /// Non-success HTTP status
    Api { message: String, status: u16 },
    /// RPC call answered with an error string
    Rpc(String),
    /// Login rejected or session expired
    Auth(String),
    /// "Foo fast" throttling persisted past every retry
    RateLimit(String),
    /// Post or network does not exist, or is not visible to this account
    NotFound(String),
    Other(String),
}

impl Error {
    /// Whether retrying on a later poll may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimit(_) | Error::Auth(_) => true,
            Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Json(e) => write!(f, "JSON parse error: {}", e),
            Error::Api { message, status } => write!(f, "API error ({}): {}", status, message),
            Error::Rpc(msg) => write!(f, "RPC error: {}", msg),
            Error::Auth(msg) => write!(f, "Auth error: {}", msg),
            Error::RateLimit(msg) => write!(f, "Rate limit: {}", msg),
            Error::NotFound(what) => write!(f, "Not found: {}", what),
            Error::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Canvas client error types

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// HTTP transport error
    Http(reqwest::Error),
    /// JSON decoding error
    Json(serde_json::Error),
    /// Invalid base URL or pagination link
    Url(url::ParseError),
    /// Non-success status returned by the API
    Api { message: String, status: u16 },
    /// The requested resource does not exist (or is hidden from this token)
    NotFound(String),
    /// Access token rejected
    Unauthorized(String),
    /// Throttled by the Canvas rate limiter
    RateLimit(String),
    Other(String),
}

impl Error {
    /// Whether retrying the same request later can succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimit(_) => true,
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
            Error::Url(e) => write!(f, "URL error: {}", e),
            Error::Api { message, status } => {
                write!(f, "API error ({}): {}", status, message)
            }
            Error::NotFound(what) => write!(f, "Not found: {}", what),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::RateLimit(msg) => write!(f, "Rate limit: {}", msg),
            Error::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Url(e) => Some(e),
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

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Url(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

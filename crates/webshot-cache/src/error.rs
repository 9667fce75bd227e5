//! Error types for the screenshot cache
//!
//! These never escape the public `CacheStore` operations except `open`;
//! everything else is logged and downgraded to a miss or a degraded outcome.

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Io(Box<std::io::Error>),
    Metadata(String),
    /// Some files could not be removed; the rest were
    Incomplete { failed: usize },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Metadata(msg) => write!(f, "Metadata error: {}", msg),
            CacheError::Incomplete { failed } => {
                write!(f, "{} cache file(s) could not be removed", failed)
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Metadata(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

//! Error types for render orchestration

use std::fmt;
use std::time::Duration;

/// Raw failure reported by a render engine
#[derive(Debug, Clone)]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EngineError {}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Classified render failure.
///
/// `Clone` so a single outcome can be handed to every caller waiting on a
/// shared render.
#[derive(Debug, Clone)]
pub enum RenderError {
    /// Missing or malformed locator; no engine was touched
    Validation(String),
    /// The engine could not be launched or no session could be obtained
    EngineAcquisition(String),
    /// Navigation exceeded its budget
    NavigationTimeout(Duration),
    /// The target host does not resolve
    NameResolution(String),
    /// The target host refused the connection
    ConnectionRefused(String),
    /// Any other navigation failure
    Navigation(String),
    /// The page loaded but the image could not be captured
    Capture(String),
    Internal(String),
}

const NAME_NOT_RESOLVED: &str = "ERR_NAME_NOT_RESOLVED";
const CONNECTION_REFUSED: &str = "ERR_CONNECTION_REFUSED";

impl RenderError {
    /// Classify an engine failure raised while navigating
    pub fn from_navigation(err: EngineError, budget: Duration) -> Self {
        let message = err.message();
        if message.contains(NAME_NOT_RESOLVED) {
            RenderError::NameResolution(message.to_string())
        } else if message.contains(CONNECTION_REFUSED) {
            RenderError::ConnectionRefused(message.to_string())
        } else if is_timeout_message(message) {
            RenderError::NavigationTimeout(budget)
        } else {
            RenderError::Navigation(message.to_string())
        }
    }

    /// Whether the failure lies with the requested target rather than with
    /// this service
    pub fn is_target_failure(&self) -> bool {
        matches!(
            self,
            RenderError::Validation(_)
                | RenderError::NavigationTimeout(_)
                | RenderError::NameResolution(_)
                | RenderError::ConnectionRefused(_)
                | RenderError::Navigation(_)
        )
    }
}

fn is_timeout_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("timed out") || lower.contains("timeout") || lower.contains("never came")
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Validation(msg) => write!(f, "Validation error: {}", msg),
            RenderError::EngineAcquisition(msg) => {
                write!(f, "Failed to acquire render engine: {}", msg)
            }
            RenderError::NavigationTimeout(budget) => {
                write!(f, "Navigation timed out after {}ms", budget.as_millis())
            }
            RenderError::NameResolution(msg) => write!(f, "Host could not be resolved: {}", msg),
            RenderError::ConnectionRefused(msg) => write!(f, "Connection refused: {}", msg),
            RenderError::Navigation(msg) => write!(f, "Navigation failed: {}", msg),
            RenderError::Capture(msg) => write!(f, "Capture failed: {}", msg),
            RenderError::Internal(msg) => write!(f, "Internal render error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

pub type Result<T> = std::result::Result<T, RenderError>;

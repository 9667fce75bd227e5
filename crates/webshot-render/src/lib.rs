//! Web page render orchestration
//!
//! Turns a locator into image bytes through a pluggable headless browser
//! engine. The orchestrator validates the locator before touching the
//! engine, bounds navigation with a timeout, and releases the engine
//! session on every exit path. Engine failures are classified into
//! [`RenderError`] variants callers can map to client or server errors.

pub mod engine;
pub mod error;
pub mod locator;
pub mod orchestrator;
pub mod types;

#[cfg(feature = "chrome")]
pub mod chrome;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{RenderEngine, RenderSession};
pub use error::{EngineError, EngineResult, RenderError, Result};
pub use locator::{normalize_locator, validate_locator};
pub use orchestrator::Renderer;
pub use types::{ImageFormat, RenderOptions, RenderTarget, Viewport, WaitPolicy};

#[cfg(feature = "chrome")]
pub use chrome::{ChromeEngine, ChromeOptions};

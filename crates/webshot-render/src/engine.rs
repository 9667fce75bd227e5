//! Render engine contract

use crate::error::EngineResult;
use crate::types::{ImageFormat, RenderOptions, RenderTarget, Viewport};
use async_trait::async_trait;

/// A headless browser that can hand out render sessions
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Obtain a fresh session sized for `viewport`
    async fn launch(&self, viewport: &Viewport) -> EngineResult<Box<dyn RenderSession>>;
}

/// One browser page, used for exactly one render.
///
/// Callers always finish with [`RenderSession::close`]. Implementations must
/// also release their resources on drop, which covers panics between
/// acquisition and close.
#[async_trait]
pub trait RenderSession: Send {
    /// Apply viewport, wait policy and timeouts before navigating
    async fn configure(&mut self, options: &RenderOptions) -> EngineResult<()>;

    async fn navigate(&mut self, target: &RenderTarget) -> EngineResult<()>;

    async fn capture(&mut self, format: ImageFormat) -> EngineResult<Vec<u8>>;

    async fn close(self: Box<Self>);
}

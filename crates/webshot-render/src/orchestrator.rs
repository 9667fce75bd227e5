//! Render orchestration: one bounded, always-released engine session per render

use crate::engine::{RenderEngine, RenderSession};
use crate::error::{RenderError, Result};
use crate::locator::validate_locator;
use crate::types::{RenderOptions, RenderTarget};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Drives a [`RenderEngine`] through acquire, configure, navigate, settle,
/// capture and release.
///
/// At most `max_concurrent` sessions are open at any time. The session is
/// closed on every path, including navigation timeouts and panics inside
/// the engine.
pub struct Renderer {
    engine: Arc<dyn RenderEngine>,
    permits: Semaphore,
}

impl Renderer {
    pub fn new(engine: Arc<dyn RenderEngine>, max_concurrent: usize) -> Self {
        Self {
            engine,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Render a remote page. The locator must already carry an http(s) scheme.
    pub async fn render(&self, locator: &str, options: &RenderOptions) -> Result<Vec<u8>> {
        let url = validate_locator(locator)?;
        self.render_target(RenderTarget::Url(url), options).await
    }

    /// Render caller-supplied markup
    pub async fn render_html(&self, html: &str, options: &RenderOptions) -> Result<Vec<u8>> {
        if html.trim().is_empty() {
            return Err(RenderError::Validation("Missing required field: html".to_string()));
        }
        self.render_target(RenderTarget::Html(html.to_string()), options).await
    }

    async fn render_target(
        &self,
        target: RenderTarget,
        options: &RenderOptions,
    ) -> Result<Vec<u8>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RenderError::EngineAcquisition("render pool is closed".to_string()))?;

        let started = Instant::now();
        let mut session = self
            .engine
            .launch(&options.viewport)
            .await
            .map_err(|e| RenderError::EngineAcquisition(e.to_string()))?;

        let outcome = AssertUnwindSafe(drive(session.as_mut(), &target, options))
            .catch_unwind()
            .await;
        session.close().await;

        let result =
            outcome.unwrap_or_else(|panic| Err(RenderError::Internal(panic_message(panic))));
        match &result {
            Ok(image) => info!(
                target = %target,
                bytes = image.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Rendered screenshot"
            ),
            Err(e) => warn!(target = %target, error = %e, "Render failed"),
        }
        result
    }
}

async fn drive(
    session: &mut dyn RenderSession,
    target: &RenderTarget,
    options: &RenderOptions,
) -> Result<Vec<u8>> {
    session
        .configure(options)
        .await
        .map_err(|e| RenderError::Internal(format!("configure session: {}", e)))?;

    match tokio::time::timeout(options.timeout, session.navigate(target)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(RenderError::from_navigation(e, options.timeout)),
        Err(_) => return Err(RenderError::NavigationTimeout(options.timeout)),
    }

    if !options.settle_delay.is_zero() {
        debug!(delay_ms = options.settle_delay.as_millis() as u64, "Settling page");
        tokio::time::sleep(options.settle_delay).await;
    }

    session
        .capture(options.format)
        .await
        .map_err(|e| RenderError::Capture(e.to_string()))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "render task panicked".to_string()
    }
}

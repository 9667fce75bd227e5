//! Scripted in-process engine for tests

use crate::engine::{RenderEngine, RenderSession};
use crate::error::{EngineError, EngineResult};
use crate::types::{ImageFormat, RenderOptions, RenderTarget, Viewport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    releases: AtomicUsize,
    targets: Mutex<Vec<String>>,
}

/// Fake engine that records every session it hands out.
///
/// Sessions count as released when closed or dropped, so `releases()`
/// equals `launches()` whenever no session leaked.
#[derive(Clone)]
pub struct FakeEngine {
    counters: Arc<Counters>,
    image: Vec<u8>,
    fail_launch: Option<String>,
    fail_navigation: Option<String>,
    fail_capture: Option<String>,
    panic_on_capture: bool,
    navigation_delay: Duration,
}

impl FakeEngine {
    pub fn new() -> Self {
        let mut image = b"\x89PNG\r\n\x1a\n".to_vec();
        image.resize(100, 0);
        Self {
            counters: Arc::new(Counters::default()),
            image,
            fail_launch: None,
            fail_navigation: None,
            fail_capture: None,
            panic_on_capture: false,
            navigation_delay: Duration::ZERO,
        }
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = image;
        self
    }

    pub fn failing_launch(mut self, message: &str) -> Self {
        self.fail_launch = Some(message.to_string());
        self
    }

    pub fn failing_navigation(mut self, message: &str) -> Self {
        self.fail_navigation = Some(message.to_string());
        self
    }

    pub fn failing_capture(mut self, message: &str) -> Self {
        self.fail_capture = Some(message.to_string());
        self
    }

    pub fn panicking_capture(mut self) -> Self {
        self.panic_on_capture = true;
        self
    }

    pub fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    /// Targets navigated to, in order
    pub fn targets(&self) -> Vec<String> {
        self.counters
            .targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn launch(&self, _viewport: &Viewport) -> EngineResult<Box<dyn RenderSession>> {
        if let Some(message) = &self.fail_launch {
            return Err(EngineError::new(message.clone()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            engine: self.clone(),
        }))
    }
}

struct FakeSession {
    engine: FakeEngine,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn configure(&mut self, _options: &RenderOptions) -> EngineResult<()> {
        Ok(())
    }

    async fn navigate(&mut self, target: &RenderTarget) -> EngineResult<()> {
        self.engine
            .counters
            .targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.to_string());

        if !self.engine.navigation_delay.is_zero() {
            tokio::time::sleep(self.engine.navigation_delay).await;
        }
        match &self.engine.fail_navigation {
            Some(message) => Err(EngineError::new(message.clone())),
            None => Ok(()),
        }
    }

    async fn capture(&mut self, _format: ImageFormat) -> EngineResult<Vec<u8>> {
        if self.engine.panic_on_capture {
            panic!("capture exploded");
        }
        match &self.engine.fail_capture {
            Some(message) => Err(EngineError::new(message.clone())),
            None => Ok(self.engine.image.clone()),
        }
    }

    async fn close(self: Box<Self>) {}
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.engine.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

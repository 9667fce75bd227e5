//! Headless Chrome engine over the DevTools protocol.
//!
//! Every session launches its own browser process so a crashed or hung page
//! cannot poison later renders. The `headless_chrome` API is blocking, so
//! each call runs on the blocking pool.

use crate::engine::{RenderEngine, RenderSession};
use crate::error::{EngineError, EngineResult};
use crate::types::{ImageFormat, RenderOptions, RenderTarget, Viewport, WaitPolicy};
use async_trait::async_trait;
use base64::Engine as _;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const JPEG_QUALITY: u32 = 90;

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// Browser binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub sandbox: bool,
    /// How long an idle browser lives before the process is reaped
    pub idle_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            executable: None,
            user_agent: None,
            sandbox: true,
            idle_timeout: Duration::from_secs(120),
        }
    }
}

pub struct ChromeEngine {
    options: ChromeOptions,
}

impl ChromeEngine {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn launch(&self, viewport: &Viewport) -> EngineResult<Box<dyn RenderSession>> {
        let options = self.options.clone();
        let viewport = *viewport;

        let (browser, tab) = blocking(move || {
            let launch_options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(options.sandbox)
                .window_size(Some((viewport.width, viewport.height)))
                .path(options.executable)
                .idle_browser_timeout(options.idle_timeout)
                .build()
                .map_err(|e| EngineError::new(format!("invalid launch options: {}", e)))?;

            let browser = Browser::new(launch_options)
                .map_err(|e| EngineError::new(format!("failed to launch browser: {:#}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| EngineError::new(format!("failed to open tab: {:#}", e)))?;

            if let Some(user_agent) = &options.user_agent {
                tab.set_user_agent(user_agent, None, None)
                    .map_err(|e| EngineError::new(format!("failed to set user agent: {:#}", e)))?;
            }
            Ok((browser, tab))
        })
        .await?;

        debug!(width = viewport.width, height = viewport.height, "Launched browser");
        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab,
            viewport,
            wait_until: WaitPolicy::Load,
        }))
    }
}

struct ChromeSession {
    // Dropping the browser kills its process
    browser: Option<Browser>,
    tab: Arc<Tab>,
    viewport: Viewport,
    wait_until: WaitPolicy,
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn configure(&mut self, options: &RenderOptions) -> EngineResult<()> {
        self.viewport = options.viewport;
        self.wait_until = options.wait_until;
        self.tab.set_default_timeout(options.timeout);
        Ok(())
    }

    async fn navigate(&mut self, target: &RenderTarget) -> EngineResult<()> {
        let tab = self.tab.clone();
        let address = match target {
            RenderTarget::Url(url) => url.to_string(),
            RenderTarget::Html(html) => html_data_url(html),
        };
        let wait_until = self.wait_until;

        blocking(move || {
            tab.navigate_to(&address).map_err(navigation_error)?;
            match wait_until {
                WaitPolicy::Load => {
                    tab.wait_until_navigated().map_err(navigation_error)?;
                }
                WaitPolicy::DomContentLoaded => {
                    tab.wait_for_element("body").map_err(navigation_error)?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn capture(&mut self, format: ImageFormat) -> EngineResult<Vec<u8>> {
        let tab = self.tab.clone();
        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: f64::from(self.viewport.width),
            height: f64::from(self.viewport.height),
            scale: self.viewport.device_scale_factor,
        };
        let (format, quality) = match format {
            ImageFormat::Png => (Page::CaptureScreenshotFormatOption::Png, None),
            ImageFormat::Jpeg => (Page::CaptureScreenshotFormatOption::Jpeg, Some(JPEG_QUALITY)),
            ImageFormat::Webp => (Page::CaptureScreenshotFormatOption::Webp, None),
        };

        blocking(move || {
            tab.capture_screenshot(format, quality, Some(clip), true)
                .map_err(|e| EngineError::new(format!("{:#}", e)))
        })
        .await
    }

    async fn close(mut self: Box<Self>) {
        let tab = self.tab.clone();
        let browser = self.browser.take();
        let closed = tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(true) {
                debug!(error = %format!("{:#}", e), "Tab close failed");
            }
            drop(browser);
        })
        .await;
        if let Err(e) = closed {
            warn!(error = %e, "Browser shutdown task failed");
        }
    }
}

fn navigation_error(e: impl fmt::Display) -> EngineError {
    EngineError::new(format!("{:#}", e))
}

fn html_data_url(html: &str) -> String {
    format!(
        "data:text/html;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(html)
    )
}

async fn blocking<T, F>(f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EngineError::new(format!("engine task failed: {}", e)))?
}

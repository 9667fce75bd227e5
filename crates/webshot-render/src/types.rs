//! Render configuration types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            other => Err(format!("unsupported image format: {}", other)),
        }
    }
}

/// When navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// The `load` event fired
    #[default]
    Load,
    /// The document body exists
    DomContentLoaded,
}

impl FromStr for WaitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(WaitPolicy::Load),
            "domcontentloaded" => Ok(WaitPolicy::DomContentLoaded),
            other => Err(format!("unsupported wait policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
        }
    }
}

/// Everything a single render needs besides the target
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub viewport: Viewport,
    pub format: ImageFormat,
    pub wait_until: WaitPolicy,
    /// Navigation budget
    pub timeout: Duration,
    /// Pause after navigation so late scripts can paint
    pub settle_delay: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            format: ImageFormat::Png,
            wait_until: WaitPolicy::Load,
            timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

/// What the engine should load
#[derive(Debug, Clone, PartialEq)]
pub enum RenderTarget {
    Url(Url),
    Html(String),
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderTarget::Url(url) => f.write_str(url.as_str()),
            RenderTarget::Html(html) => write!(f, "inline html ({} bytes)", html.len()),
        }
    }
}

//! Service configuration loaded from the environment

use crate::error::{Result, ServerError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use webshot_cache::CacheConfig;
use webshot_render::{ChromeOptions, ImageFormat, RenderOptions, Viewport, WaitPolicy};

/// Largest accepted viewport edge, in CSS pixels
pub const MAX_DIMENSION: u32 = 8192;
pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Zero disables the bound
    pub memory_cache_max_bytes: u64,
    pub render_timeout_secs: u64,
    pub settle_delay_ms: u64,
    pub max_concurrent_renders: usize,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub image_format: ImageFormat,
    pub wait_until: WaitPolicy,
    pub chrome_path: Option<PathBuf>,
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            cache_dir: PathBuf::from("./.cache/screenshots"),
            cache_ttl_secs: 7 * 24 * 60 * 60, // 7 days
            cleanup_interval_secs: 60 * 60,   // 1 hour
            memory_cache_max_bytes: 256 * 1024 * 1024,
            render_timeout_secs: 30,
            settle_delay_ms: 1000,
            max_concurrent_renders: 4,
            viewport_width: 1920,
            viewport_height: 1080,
            device_scale_factor: 1.0,
            image_format: ImageFormat::Png,
            wait_until: WaitPolicy::Load,
            chrome_path: None,
            user_agent: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unparsable values fall back to the
    /// default; parsable but out-of-range values are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            port: parse_or(lookup("PORT"), defaults.port),
            cache_dir: text("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_ttl_secs: parse_or(lookup("CACHE_TTL_SECS"), defaults.cache_ttl_secs),
            cleanup_interval_secs: parse_or(
                lookup("CLEANUP_INTERVAL_SECS"),
                defaults.cleanup_interval_secs,
            ),
            memory_cache_max_bytes: parse_or(
                lookup("MEMORY_CACHE_MAX_BYTES"),
                defaults.memory_cache_max_bytes,
            ),
            render_timeout_secs: parse_or(
                lookup("RENDER_TIMEOUT_SECS"),
                defaults.render_timeout_secs,
            ),
            settle_delay_ms: parse_or(lookup("SETTLE_DELAY_MS"), defaults.settle_delay_ms),
            max_concurrent_renders: parse_or(
                lookup("MAX_CONCURRENT_RENDERS"),
                defaults.max_concurrent_renders,
            ),
            viewport_width: parse_or(lookup("VIEWPORT_WIDTH"), defaults.viewport_width),
            viewport_height: parse_or(lookup("VIEWPORT_HEIGHT"), defaults.viewport_height),
            device_scale_factor: parse_or(
                lookup("DEVICE_SCALE_FACTOR"),
                defaults.device_scale_factor,
            ),
            image_format: parse_or(text("IMAGE_FORMAT"), defaults.image_format),
            wait_until: parse_or(text("WAIT_UNTIL"), defaults.wait_until),
            chrome_path: text("CHROME_PATH").map(PathBuf::from),
            user_agent: text("USER_AGENT"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("VIEWPORT_WIDTH", self.viewport_width),
            ("VIEWPORT_HEIGHT", self.viewport_height),
        ] {
            if !(1..=MAX_DIMENSION).contains(&value) {
                return Err(ServerError::Config(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_DIMENSION, value
                )));
            }
        }
        if !(MIN_SCALE..=MAX_SCALE).contains(&self.device_scale_factor) {
            return Err(ServerError::Config(format!(
                "DEVICE_SCALE_FACTOR must be between {} and {}, got {}",
                MIN_SCALE, MAX_SCALE, self.device_scale_factor
            )));
        }
        if self.max_concurrent_renders == 0 {
            return Err(ServerError::Config(
                "MAX_CONCURRENT_RENDERS must be at least 1".to_string(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ServerError::Config(
                "CLEANUP_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            cache_dir: self.cache_dir.clone(),
            ttl: Duration::from_secs(self.cache_ttl_secs),
            memory_max_bytes: self.memory_cache_max_bytes,
        }
    }

    /// Options applied to requests that don't override anything
    pub fn render_defaults(&self) -> RenderOptions {
        RenderOptions {
            viewport: Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
                device_scale_factor: self.device_scale_factor,
            },
            format: self.image_format,
            wait_until: self.wait_until,
            timeout: Duration::from_secs(self.render_timeout_secs),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    pub fn chrome_options(&self) -> ChromeOptions {
        ChromeOptions {
            executable: self.chrome_path.clone(),
            user_agent: self.user_agent.clone(),
            ..ChromeOptions::default()
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

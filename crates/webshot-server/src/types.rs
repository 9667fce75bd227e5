//! Request and response bodies for the HTTP surface

use crate::config::{MAX_DIMENSION, MAX_SCALE, MIN_SCALE};
use crate::warmer::WarmStatus;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use webshot_cache::CacheStats;
use webshot_render::{ImageFormat, RenderError, RenderOptions};

/// Error body shared by every failing route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

/// Per-request overrides of the configured render defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub scale: Option<f64>,
    pub format: Option<ImageFormat>,
}

impl RenderOverrides {
    /// Apply on top of `defaults`, rejecting out-of-range values
    pub fn apply(&self, defaults: &RenderOptions) -> Result<RenderOptions, RenderError> {
        let mut options = defaults.clone();

        if let Some(width) = self.width {
            options.viewport.width = check_dimension("width", width)?;
        }
        if let Some(height) = self.height {
            options.viewport.height = check_dimension("height", height)?;
        }
        if let Some(scale) = self.scale {
            if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
                return Err(RenderError::Validation(format!(
                    "scale must be between {} and {}",
                    MIN_SCALE, MAX_SCALE
                )));
            }
            options.viewport.device_scale_factor = scale;
        }
        if let Some(format) = self.format {
            options.format = format;
        }
        Ok(options)
    }
}

fn check_dimension(name: &str, value: u32) -> Result<u32, RenderError> {
    if (1..=MAX_DIMENSION).contains(&value) {
        Ok(value)
    } else {
        Err(RenderError::Validation(format!(
            "{} must be between 1 and {}",
            name, MAX_DIMENSION
        )))
    }
}

/// Query string of `GET /screenshot` and `DELETE /cache`.
///
/// Fields stay textual so malformed numbers produce our own validation
/// message instead of a generic extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ScreenshotQuery {
    pub url: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub scale: Option<String>,
    pub format: Option<String>,
}

impl ScreenshotQuery {
    pub fn overrides(&self) -> Result<RenderOverrides, RenderError> {
        Ok(RenderOverrides {
            width: parse_field("width", self.width.as_deref())?,
            height: parse_field("height", self.height.as_deref())?,
            scale: parse_field("scale", self.scale.as_deref())?,
            format: parse_field("format", self.format.as_deref())?,
        })
    }
}

fn parse_field<T: FromStr>(name: &str, raw: Option<&str>) -> Result<Option<T>, RenderError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| RenderError::Validation(format!("Invalid {}: {}", name, value))),
    }
}

/// Body of `POST /render`
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub html: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub scale: Option<f64>,
    pub format: Option<String>,
}

impl RenderRequest {
    pub fn overrides(&self) -> Result<RenderOverrides, RenderError> {
        Ok(RenderOverrides {
            width: self.width,
            height: self.height,
            scale: self.scale,
            format: parse_field("format", self.format.as_deref())?,
        })
    }
}

/// One line of the warm-cache report. `url` echoes the submitted item
/// verbatim, even when it was not a string.
#[derive(Debug, Serialize)]
pub struct WarmResultBody {
    pub url: serde_json::Value,
    pub status: WarmStatus,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct WarmResponse {
    pub success: bool,
    pub processed: usize,
    pub results: Vec<WarmResultBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmStatsBody {
    pub memory_entries: usize,
    pub memory_bytes: u64,
    pub cache_directory: String,
    pub hits: u64,
    pub misses: u64,
}

impl From<CacheStats> for WarmStatsBody {
    fn from(stats: CacheStats) -> Self {
        Self {
            memory_entries: stats.memory_entries,
            memory_bytes: stats.memory_bytes,
            cache_directory: stats.cache_directory.display().to_string(),
            hits: stats.hits,
            misses: stats.misses,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WarmStatsResponse {
    pub cache: WarmStatsBody,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

//! Batch cache warming

use crate::service::ScreenshotService;
use crate::types::RenderOverrides;
use serde::Serialize;
use tracing::info;
use webshot_render::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmStatus {
    Cached,
    Generated,
    Failed,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmOutcome {
    pub status: WarmStatus,
    pub reason: String,
}

impl WarmOutcome {
    fn new(status: WarmStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// Warm the cache for each locator, in order, with default render options.
///
/// `None` stands for an item that was not a string. Repeated locators are
/// processed independently; a repeat normally finds the first one cached.
pub async fn warm(service: &ScreenshotService, locators: &[Option<String>]) -> Vec<WarmOutcome> {
    let mut outcomes = Vec::with_capacity(locators.len());
    for locator in locators {
        outcomes.push(warm_one(service, locator.as_deref()).await);
    }

    let generated = outcomes
        .iter()
        .filter(|o| o.status == WarmStatus::Generated)
        .count();
    info!(processed = outcomes.len(), generated, "Cache warming finished");
    outcomes
}

async fn warm_one(service: &ScreenshotService, locator: Option<&str>) -> WarmOutcome {
    let raw = match locator.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return WarmOutcome::new(WarmStatus::Skipped, "Invalid URL"),
    };

    let request = match service.resolve(raw, &RenderOverrides::default()) {
        Ok(request) => request,
        Err(RenderError::Validation(msg)) => return WarmOutcome::new(WarmStatus::Skipped, msg),
        Err(e) => return WarmOutcome::new(WarmStatus::Error, e.to_string()),
    };

    if service.lookup(&request).await.is_some() {
        return WarmOutcome::new(WarmStatus::Cached, "Already in cache");
    }

    match service.render_and_store(&request).await {
        Ok(_) => WarmOutcome::new(WarmStatus::Generated, "Screenshot created and cached"),
        Err(e) if e.is_target_failure() => WarmOutcome::new(WarmStatus::Failed, e.to_string()),
        Err(e) => WarmOutcome::new(WarmStatus::Error, e.to_string()),
    }
}

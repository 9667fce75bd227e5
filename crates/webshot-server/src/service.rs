//! Screenshot service: cache lookup, coalesced render, write-back

use crate::types::RenderOverrides;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use url::Url;
use webshot_cache::{derive_key, CacheEntry, CacheOutcome, CacheStats, CacheStore, CacheTier};
use webshot_render::{normalize_locator, RenderError, RenderOptions, Renderer};

type RenderResult = Result<Arc<CacheEntry>, RenderError>;
type InFlight = Shared<BoxFuture<'static, RenderResult>>;
type InFlightMap = Arc<Mutex<HashMap<String, InFlight>>>;

/// Where a served screenshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit(CacheTier),
    Miss,
}

impl CacheStatus {
    pub fn header_value(self) -> &'static str {
        match self {
            CacheStatus::Hit(_) => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Hit(CacheTier::Memory) => f.write_str("memory hit"),
            CacheStatus::Hit(CacheTier::Durable) => f.write_str("durable hit"),
            CacheStatus::Miss => f.write_str("miss"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Screenshot {
    pub entry: Arc<CacheEntry>,
    pub status: CacheStatus,
}

/// A normalized request: target, effective options and the cache locator
/// they map to
#[derive(Debug, Clone)]
pub struct ScreenshotRequest {
    pub url: Url,
    pub options: RenderOptions,
    pub cache_locator: String,
}

pub struct ScreenshotService {
    cache: Arc<CacheStore>,
    renderer: Arc<Renderer>,
    defaults: RenderOptions,
    inflight: InFlightMap,
}

impl ScreenshotService {
    pub fn new(cache: Arc<CacheStore>, renderer: Arc<Renderer>, defaults: RenderOptions) -> Self {
        Self {
            cache,
            renderer,
            defaults,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn defaults(&self) -> &RenderOptions {
        &self.defaults
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Normalize a raw locator and apply overrides.
    ///
    /// Requests using the default options are cached under the normalized
    /// URL itself; any other variant gets a suffix naming its dimensions,
    /// scale and format.
    pub fn resolve(
        &self,
        raw_locator: &str,
        overrides: &RenderOverrides,
    ) -> Result<ScreenshotRequest, RenderError> {
        let url = normalize_locator(raw_locator)?;
        let options = overrides.apply(&self.defaults)?;
        let cache_locator = variant_locator(&url, &options, &self.defaults);
        Ok(ScreenshotRequest {
            url,
            options,
            cache_locator,
        })
    }

    pub async fn lookup(&self, request: &ScreenshotRequest) -> Option<Screenshot> {
        self.cache
            .get(&request.cache_locator)
            .await
            .map(|hit| Screenshot {
                entry: hit.entry,
                status: CacheStatus::Hit(hit.tier),
            })
    }

    /// Serve from cache, rendering on a miss
    pub async fn screenshot(&self, request: &ScreenshotRequest) -> Result<Screenshot, RenderError> {
        if let Some(hit) = self.lookup(request).await {
            return Ok(hit);
        }
        let entry = self.render_and_store(request).await?;
        Ok(Screenshot {
            entry,
            status: CacheStatus::Miss,
        })
    }

    /// Render and write back, sharing one render among concurrent callers
    /// for the same cache key.
    ///
    /// The render runs as its own task, so it still completes and lands in
    /// the cache when every caller has gone away.
    pub async fn render_and_store(&self, request: &ScreenshotRequest) -> RenderResult {
        let key = derive_key(&request.cache_locator);
        let flight = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match inflight.get(&key) {
                Some(flight) => {
                    debug!(key = %key, "Joining in-flight render");
                    flight.clone()
                }
                None => {
                    let flight = self.spawn_render(key.clone(), request.clone());
                    inflight.insert(key, flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    // Called with the registry locked; the task's guard cannot deregister
    // before the caller has inserted the flight.
    fn spawn_render(&self, key: String, request: ScreenshotRequest) -> InFlight {
        let cache = self.cache.clone();
        let renderer = self.renderer.clone();
        let guard = FlightGuard {
            inflight: self.inflight.clone(),
            key,
        };

        let handle = tokio::spawn(async move {
            let _guard = guard;

            // An earlier flight may have finished after the caller's lookup
            if let Some(hit) = cache.peek(&request.cache_locator).await {
                debug!(url = %request.url, "Rendered by an earlier flight");
                return Ok::<_, RenderError>(hit.entry);
            }

            let image = renderer
                .render(request.url.as_str(), &request.options)
                .await?;
            let stored = cache
                .set(
                    &request.cache_locator,
                    image,
                    request.options.format.content_type(),
                )
                .await;
            if !stored.outcome.is_complete() {
                warn!(url = %request.url, "Screenshot cached in memory only");
            }
            Ok::<_, RenderError>(stored.entry)
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(RenderError::Internal(format!("render task failed: {}", e)))
            })
        }
        .boxed()
        .shared()
    }

    /// Render raw markup. Never cached.
    pub async fn render_html(
        &self,
        html: &str,
        overrides: &RenderOverrides,
    ) -> Result<Vec<u8>, RenderError> {
        let options = overrides.apply(&self.defaults)?;
        self.renderer.render_html(html, &options).await
    }

    pub async fn invalidate(&self, request: &ScreenshotRequest) -> CacheOutcome {
        self.cache.delete(&request.cache_locator).await
    }

    pub async fn clear(&self) -> CacheOutcome {
        self.cache.clear().await
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Deregisters an in-flight render when its task ends, however it ends
struct FlightGuard {
    inflight: InFlightMap,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

fn variant_locator(url: &Url, options: &RenderOptions, defaults: &RenderOptions) -> String {
    if options.viewport == defaults.viewport && options.format == defaults.format {
        return url.to_string();
    }
    format!(
        "{}|{}x{}@{}.{}",
        url,
        options.viewport.width,
        options.viewport.height,
        options.viewport.device_scale_factor,
        options.format.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use webshot_cache::CacheConfig;
    use webshot_render::testing::FakeEngine;
    use webshot_render::ImageFormat;

    fn test_defaults() -> RenderOptions {
        RenderOptions {
            settle_delay: Duration::ZERO,
            ..RenderOptions::default()
        }
    }

    async fn service_with(engine: &FakeEngine) -> (ScreenshotService, TempDir) {
        let dir = tempdir().unwrap();
        let cache = CacheStore::open(CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            ..CacheConfig::default()
        })
        .await
        .unwrap();
        let renderer = Arc::new(Renderer::new(Arc::new(engine.clone()), 4));
        (ScreenshotService::new(cache, renderer, test_defaults()), dir)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let engine = FakeEngine::new();
        let (service, _dir) = service_with(&engine).await;
        let request = service
            .resolve("example.com", &RenderOverrides::default())
            .unwrap();
        assert_eq!(request.cache_locator, "http://example.com/");

        let first = service.screenshot(&request).await.unwrap();
        assert_eq!(first.status, CacheStatus::Miss);
        assert_eq!(&first.entry.data[..], engine.image());
        assert_eq!(first.entry.content_type, "image/png");

        let second = service.screenshot(&request).await.unwrap();
        assert_eq!(second.status, CacheStatus::Hit(CacheTier::Memory));
        assert_eq!(second.status.to_string(), "memory hit");
        assert_eq!(engine.launches(), 1);
    }

    #[tokio::test]
    async fn test_validation_never_reaches_engine() {
        let engine = FakeEngine::new();
        let (service, _dir) = service_with(&engine).await;

        assert!(matches!(
            service.resolve("ftp://example.com/", &RenderOverrides::default()),
            Err(RenderError::Validation(_))
        ));
        assert!(matches!(
            service.resolve("   ", &RenderOverrides::default()),
            Err(RenderError::Validation(_))
        ));
        assert_eq!(engine.launches(), 0);
    }

    #[tokio::test]
    async fn test_variants_are_cached_separately() {
        let engine = FakeEngine::new();
        let (service, _dir) = service_with(&engine).await;

        let plain = service
            .resolve("https://example.com", &RenderOverrides::default())
            .unwrap();
        let jpeg = service
            .resolve(
                "https://example.com",
                &RenderOverrides {
                    width: Some(800),
                    height: Some(600),
                    format: Some(ImageFormat::Jpeg),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(jpeg.cache_locator, "https://example.com/|800x600@1.jpeg");

        service.screenshot(&plain).await.unwrap();
        let shot = service.screenshot(&jpeg).await.unwrap();
        assert_eq!(shot.status, CacheStatus::Miss);
        assert_eq!(shot.entry.content_type, "image/jpeg");
        assert_eq!(engine.launches(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_render() {
        let engine = FakeEngine::new().with_navigation_delay(Duration::from_millis(100));
        let (service, _dir) = service_with(&engine).await;
        let service = Arc::new(service);
        let request = service
            .resolve("https://example.com", &RenderOverrides::default())
            .unwrap();

        let callers: Vec<_> = (0..5)
            .map(|_| {
                let service = service.clone();
                let request = request.clone();
                tokio::spawn(async move { service.render_and_store(&request).await })
            })
            .collect();

        for caller in callers {
            let entry = caller.await.unwrap().unwrap();
            assert_eq!(&entry.data[..], engine.image());
        }
        assert_eq!(engine.launches(), 1);
        assert_eq!(service.inflight_len(), 0);
    }

    #[tokio::test]
    async fn test_miss_after_finished_flight_reuses_its_result() {
        let engine = FakeEngine::new();
        let (service, _dir) = service_with(&engine).await;
        let request = service
            .resolve("https://example.com", &RenderOverrides::default())
            .unwrap();

        // Caller B misses, then caller A's flight completes before B renders
        assert!(service.lookup(&request).await.is_none());
        let first = service.render_and_store(&request).await.unwrap();
        let second = service.render_and_store(&request).await.unwrap();

        assert_eq!(engine.launches(), 1);
        assert_eq!(first.data, second.data);
        assert_eq!(service.inflight_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_render_is_shared_and_cleared() {
        let engine = FakeEngine::new().failing_navigation("net::ERR_CONNECTION_REFUSED");
        let (service, _dir) = service_with(&engine).await;
        let request = service
            .resolve("http://localhost:1", &RenderOverrides::default())
            .unwrap();

        let err = service.screenshot(&request).await.unwrap_err();
        assert!(matches!(err, RenderError::ConnectionRefused(_)));
        assert_eq!(service.inflight_len(), 0);
        assert!(service.lookup(&request).await.is_none());

        // The failure is not remembered; the next call renders again
        let _ = service.screenshot(&request).await;
        assert_eq!(engine.launches(), 2);
    }

    #[tokio::test]
    async fn test_render_survives_caller_drop() {
        let engine = FakeEngine::new().with_navigation_delay(Duration::from_millis(50));
        let (service, _dir) = service_with(&engine).await;
        let request = service
            .resolve("https://example.com", &RenderOverrides::default())
            .unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            service.render_and_store(&request),
        )
        .await;
        assert!(abandoned.is_err());

        for _ in 0..50 {
            if service.lookup(&request).await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(service.lookup(&request).await.is_some());
        assert_eq!(engine.launches(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let engine = FakeEngine::new();
        let (service, _dir) = service_with(&engine).await;
        let request = service
            .resolve("https://example.com", &RenderOverrides::default())
            .unwrap();

        service.screenshot(&request).await.unwrap();
        assert!(service.invalidate(&request).await.is_complete());
        assert!(service.lookup(&request).await.is_none());

        service.screenshot(&request).await.unwrap();
        assert!(service.clear().await.is_complete());
        assert_eq!(service.stats().await.memory_entries, 0);
    }

    #[tokio::test]
    async fn test_render_html_is_not_cached() {
        let engine = FakeEngine::new();
        let (service, _dir) = service_with(&engine).await;

        let image = service
            .render_html("<h1>hi</h1>", &RenderOverrides::default())
            .await
            .unwrap();
        assert_eq!(image, engine.image());
        assert_eq!(service.stats().await.memory_entries, 0);
    }
}

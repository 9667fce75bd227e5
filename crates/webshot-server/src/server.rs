//! HTTP server for the screenshot endpoints
//!
//! Provides /, /health, /screenshot, /render, /warm-cache and /cache.

use crate::error::ApiError;
use crate::service::ScreenshotService;
use crate::types::{
    HealthResponse, RenderRequest, ScreenshotQuery, SuccessResponse, WarmResponse,
    WarmResultBody, WarmStatsResponse,
};
use crate::warmer::warm;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Shared state for the HTTP server
pub struct ServerState {
    pub service: ScreenshotService,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(service: ScreenshotService) -> Self {
        Self {
            service,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/screenshot", get(screenshot))
        .route("/render", post(render_html))
        .route("/warm-cache", get(warm_stats).post(warm_cache))
        .route("/cache", delete(delete_cache))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until SIGINT or SIGTERM
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received, draining connections");
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Webshot API is running",
        "endpoints": {
            "screenshot": "GET /screenshot?url=<URL>[&width=&height=&scale=&format=]",
            "render": "POST /render",
            "warmCache": "POST /warm-cache",
            "cacheStats": "GET /warm-cache",
            "invalidate": "DELETE /cache[?url=<URL>]",
            "health": "GET /health"
        }
    }))
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: state.service.stats().await,
    })
}

/// Screenshot a page, serving from cache when possible
async fn screenshot(
    State(state): State<SharedState>,
    Query(query): Query<ScreenshotQuery>,
) -> Result<Response, ApiError> {
    let raw = query
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(ApiError::missing_url)?;

    let overrides = query.overrides()?;
    let request = state.service.resolve(raw, &overrides)?;
    let shot = state.service.screenshot(&request).await?;

    info!(
        url = %request.url,
        cache = %shot.status,
        bytes = shot.entry.size,
        "Served screenshot"
    );

    let max_age = state.service.cache().ttl().num_seconds().max(0);
    Ok(image_response(
        shot.entry.data.clone(),
        &shot.entry.content_type,
        Some(max_age),
        Some(shot.status.header_value()),
    ))
}

/// Render caller-supplied HTML without caching
async fn render_html(
    State(state): State<SharedState>,
    body: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let overrides = request.overrides()?;
    let html = request.html.as_deref().unwrap_or_default();

    let image = state.service.render_html(html, &overrides).await?;
    let format = overrides.format.unwrap_or(state.service.defaults().format);
    Ok(image_response(
        Bytes::from(image),
        format.content_type(),
        None,
        None,
    ))
}

/// Warm the cache for a batch of URLs
async fn warm_cache(
    State(state): State<SharedState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<WarmResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let items = body
        .get("urls")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request("URLs must be an array"))?;

    let locators: Vec<Option<String>> = items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect();
    let outcomes = warm(&state.service, &locators).await;

    let results = items
        .iter()
        .zip(outcomes)
        .map(|(url, outcome)| WarmResultBody {
            url: url.clone(),
            status: outcome.status,
            reason: outcome.reason,
        })
        .collect();

    Ok(Json(WarmResponse {
        success: true,
        processed: items.len(),
        results,
    }))
}

async fn warm_stats(State(state): State<SharedState>) -> Json<WarmStatsResponse> {
    Json(WarmStatsResponse {
        cache: state.service.stats().await.into(),
    })
}

/// Delete one entry (`?url=`) or clear the whole cache
async fn delete_cache(
    State(state): State<SharedState>,
    Query(query): Query<ScreenshotQuery>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let outcome = match query.url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(raw) => {
            let request = state.service.resolve(raw, &query.overrides()?)?;
            info!(url = %request.url, "Invalidating cached screenshot");
            state.service.invalidate(&request).await
        }
        None => {
            info!("Clearing screenshot cache");
            state.service.clear().await
        }
    };

    if !outcome.is_complete() {
        warn!("Cache invalidation left durable files behind");
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}

fn image_response(
    data: Bytes,
    content_type: &str,
    max_age: Option<i64>,
    cache_status: Option<&'static str>,
) -> Response {
    let extension = match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpeg",
        "image/webp" => "webp",
        _ => "bin",
    };

    let cache_control = match max_age {
        Some(secs) => format!("public, max-age={}", secs),
        None => "no-store".to_string(),
    };

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, data.len().to_string()),
            (header::CACHE_CONTROL, cache_control),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"screenshot.{}\"", extension),
            ),
        ],
        Body::from(data),
    )
        .into_response();

    if let Some(status) = cache_status {
        response
            .headers_mut()
            .insert(X_CACHE, header::HeaderValue::from_static(status));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;
    use webshot_cache::{CacheConfig, CacheStore};
    use webshot_render::testing::FakeEngine;
    use webshot_render::{RenderOptions, Renderer};

    async fn create_test_state(engine: &FakeEngine) -> (SharedState, TempDir) {
        let dir = tempdir().unwrap();
        let cache = CacheStore::open(CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            ttl: Duration::from_secs(3600),
            ..CacheConfig::default()
        })
        .await
        .unwrap();
        let renderer = Arc::new(Renderer::new(Arc::new(engine.clone()), 2));
        let defaults = RenderOptions {
            settle_delay: Duration::ZERO,
            ..RenderOptions::default()
        };
        let service = ScreenshotService::new(cache, renderer, defaults);
        (Arc::new(ServerState::new(service)), dir)
    }

    async fn send(router: &Router, request: Request<Body>) -> Response {
        router.clone().oneshot(request).await.unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let response = send(&router, get_request("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["uptimeSecs"].as_u64().is_some());
        assert_eq!(json["cache"]["memoryEntries"], 0);
    }

    #[tokio::test]
    async fn test_index_lists_endpoints() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let json = body_json(send(&router, get_request("/")).await).await;
        assert_eq!(json["message"], "Webshot API is running");
        assert!(json["endpoints"]["screenshot"].is_string());
    }

    #[tokio::test]
    async fn test_screenshot_miss_then_hit() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let response = send(&router, get_request("/screenshot?url=example.com")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
        assert_eq!(headers[header::CONTENT_LENGTH], "100");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "inline; filename=\"screenshot.png\""
        );
        assert_eq!(headers["x-cache"], "MISS");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], engine.image());

        let response = send(&router, get_request("/screenshot?url=example.com")).await;
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(engine.launches(), 1);
    }

    #[tokio::test]
    async fn test_screenshot_format_variant() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let response = send(
            &router,
            get_request("/screenshot?url=https://example.com&format=jpeg&width=800&height=600"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "inline; filename=\"screenshot.jpeg\""
        );
    }

    #[tokio::test]
    async fn test_screenshot_validation_errors() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        for uri in [
            "/screenshot",
            "/screenshot?url=",
            "/screenshot?url=ftp://example.com",
            "/screenshot?url=example.com&width=0",
            "/screenshot?url=example.com&scale=lots",
        ] {
            let response = send(&router, get_request(uri)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let json = body_json(response).await;
            assert!(json["error"].is_string());
            assert!(json["message"].is_string());
        }
        assert_eq!(engine.launches(), 0);
    }

    #[tokio::test]
    async fn test_screenshot_timeout_maps_to_408() {
        let engine = FakeEngine::new().failing_navigation("Navigation timed out");
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let response = send(&router, get_request("/screenshot?url=slow.example.com")).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Request timeout");
    }

    #[tokio::test]
    async fn test_screenshot_unresolvable_host_is_client_error() {
        let engine = FakeEngine::new().failing_navigation("net::ERR_NAME_NOT_RESOLVED");
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let response = send(&router, get_request("/screenshot?url=nonexistent.invalid")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_screenshot_engine_failure_is_500() {
        let engine = FakeEngine::new().failing_launch("chrome not found at /opt/chrome");
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let response = send(&router, get_request("/screenshot?url=example.com")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Failed to capture screenshot");
        assert!(!json.to_string().contains("/opt/chrome"));
    }

    #[tokio::test]
    async fn test_render_html_endpoint() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state.clone());

        let response = send(
            &router,
            json_request("POST", "/render", json!({"html": "<h1>hi</h1>", "format": "webp"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/webp");
        assert!(response.headers().get("x-cache").is_none());
        assert_eq!(state.service.stats().await.memory_entries, 0);

        let response = send(&router, json_request("POST", "/render", json!({}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_warm_cache_endpoint() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let response = send(
            &router,
            json_request(
                "POST",
                "/warm-cache",
                json!({"urls": ["https://example.com", 42, "https://example.com"]}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["processed"], 3);
        assert_eq!(json["results"][0]["status"], "generated");
        assert_eq!(json["results"][1]["url"], 42);
        assert_eq!(json["results"][1]["status"], "skipped");
        assert_eq!(json["results"][2]["status"], "cached");

        let json = body_json(send(&router, get_request("/warm-cache")).await).await;
        assert_eq!(json["cache"]["memoryEntries"], 1);
        assert!(json["cache"]["cacheDirectory"].is_string());
    }

    #[tokio::test]
    async fn test_warm_cache_requires_array() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let response = send(
            &router,
            json_request("POST", "/warm-cache", json!({"urls": "https://example.com"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_cache() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state.clone());

        send(&router, get_request("/screenshot?url=a.example.com")).await;
        send(&router, get_request("/screenshot?url=b.example.com")).await;
        assert_eq!(state.service.stats().await.memory_entries, 2);

        let response = send(
            &router,
            Request::builder()
                .method("DELETE")
                .uri("/cache?url=a.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);
        assert_eq!(state.service.stats().await.memory_entries, 1);

        let response = send(
            &router,
            Request::builder()
                .method("DELETE")
                .uri("/cache")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.service.stats().await.memory_entries, 0);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;
        let router = create_router(state);

        let response = send(&router, get_request("/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Not found");
    }

    #[tokio::test]
    async fn test_server_state_new() {
        let engine = FakeEngine::new();
        let (state, _dir) = create_test_state(&engine).await;

        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}

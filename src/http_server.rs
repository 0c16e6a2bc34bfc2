//! HTTP server implementation using Axum.

use crate::demo::Scenario;
use crate::executor::CommandSpec;
use crate::limiter::RateDecision;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::interval;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest {
    command: String,
    timeout_ms: Option<u64>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/execute", post(execute))
        .route("/demo/:scenario", get(demo))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server on the given port with the provided state.
pub async fn run_server(port: u16, state: AppState) {
    // Reclaim expired rate-limit counters in the background.
    let store = state.store.clone();
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            store.prune().await;
        }
    });

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

async fn health() -> &'static str {
    "OK"
}

async fn execute(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ExecuteRequest>,
) -> Response {
    let identity = client_identity(&headers, addr);
    let decision = state.limiter.check(&identity).await;
    if !decision.allowed {
        return rate_limited(&state, &decision);
    }

    if req.command.trim().is_empty() {
        let resp = (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Missing command" })),
        )
            .into_response();
        return with_rate_headers(resp, &state, &decision);
    }

    info!(command = %req.command, identity = %identity, "POST /execute");
    let spec = CommandSpec {
        text: req.command,
        timeout_ms: req.timeout_ms.unwrap_or(state.config.default_timeout_ms),
        use_wrapper: true,
    };
    let outcome = state.executor.execute(&spec).await;
    with_rate_headers(Json(outcome).into_response(), &state, &decision)
}

async fn demo(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(scenario): Path<String>,
) -> Response {
    let identity = client_identity(&headers, addr);
    let decision = state.limiter.check(&identity).await;
    if !decision.allowed {
        return rate_limited(&state, &decision);
    }

    let Some(scenario) = Scenario::from_name(&scenario) else {
        let resp = (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Unknown demo" })),
        )
            .into_response();
        return with_rate_headers(resp, &state, &decision);
    };

    let report = state.demos.run(scenario).await;
    with_rate_headers(Json(report).into_response(), &state, &decision)
}

/// Rate-limit key for the caller: first `x-forwarded-for` hop when present
/// (the demo usually sits behind a proxy), else the socket peer address.
fn client_identity(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

fn with_rate_headers(mut resp: Response, state: &AppState, decision: &RateDecision) -> Response {
    let headers = resp.headers_mut();
    headers.insert("remaining-requests", HeaderValue::from(decision.remaining));
    headers.insert("limit", HeaderValue::from(state.limiter.max_requests()));
    resp
}

fn rate_limited(state: &AppState, decision: &RateDecision) -> Response {
    let resp = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "Rate limit exceeded",
            "retryAfter": decision.retry_after_secs,
        })),
    )
        .into_response();
    let mut resp = with_rate_headers(resp, state, decision);
    resp.headers_mut()
        .insert("retry-after", HeaderValue::from(decision.retry_after_secs));
    resp
}

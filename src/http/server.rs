//! HTTP server and request handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::error::Result;
use crate::ratelimit::{RateLimitCoordinator, RateLimitPolicy};

/// Shared state for the request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Quota coordinator over the configured store
    pub coordinator: Arc<RateLimitCoordinator>,
    /// The deployment's fixed quota policy
    pub policy: Arc<RateLimitPolicy>,
    /// Admin key for the debug surface; `None` disables it
    pub admin_key: Option<Arc<str>>,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rate-limit", get(check_rate_limit).post(increment_rate_limit))
        .route("/debug/visitor", get(debug_visitor))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// HTTP server for the rate limit endpoint.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Handler state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server stops accepting connections when the provided signal
    /// resolves and drains in-flight requests before returning.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state);
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitorQuery {
    visitor_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitorBody {
    visitor_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugQuery {
    visitor_id: Option<String>,
    admin_key: Option<String>,
}

/// `GET /rate-limit`: read-only quota inspection.
async fn check_rate_limit(
    State(state): State<AppState>,
    Query(query): Query<VisitorQuery>,
) -> Response {
    let Some(visitor_id) = present(query.visitor_id) else {
        return missing_visitor_id();
    };

    let decision = state.coordinator.check_only(&visitor_id, &state.policy).await;
    Json(decision).into_response()
}

/// `POST /rate-limit`: consume one unit of quota.
async fn increment_rate_limit(
    State(state): State<AppState>,
    Json(body): Json<VisitorBody>,
) -> Response {
    let Some(visitor_id) = present(body.visitor_id) else {
        return missing_visitor_id();
    };

    let decision = state
        .coordinator
        .check_and_increment(&visitor_id, &state.policy)
        .await;
    Json(decision).into_response()
}

/// `GET /debug/visitor`: admin-keyed view of a visitor stored record.
async fn debug_visitor(State(state): State<AppState>, Query(query): Query<DebugQuery>) -> Response {
    let authorized = match &state.admin_key {
        Some(expected) => query.admin_key.as_deref() == Some(expected.as_ref()),
        None => false,
    };
    if !authorized {
        warn!("Rejected debug request with missing or wrong admin key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized"})),
        )
            .into_response();
    }

    let Some(visitor_id) = present(query.visitor_id) else {
        return missing_visitor_id();
    };

    let record = state.coordinator.peek_record(&visitor_id, &state.policy).await;
    let decision = state.coordinator.check_only(&visitor_id, &state.policy).await;

    Json(json!({
        "visitorId": visitor_id,
        "record": record,
        "decision": decision,
    }))
    .into_response()
}

async fn health() -> &'static str {
    "ok"
}

fn present(id: Option<String>) -> Option<String> {
    id.filter(|id| !id.trim().is_empty())
}

fn missing_visitor_id() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "Visitor ID is required"})),
    )
        .into_response()
}

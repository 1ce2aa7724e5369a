//! HTTP front end: one catch-all relay endpoint and a health check.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::relay::Relay;

#[derive(Clone)]
struct AppState {
    relay: Arc<Relay>,
}

/// Build the router. Every path except `/health` relays the posted email.
pub fn router(relay: Arc<Relay>, max_body_bytes: usize) -> Router {
    let state = AppState { relay };

    Router::new()
        .route("/health", get(health_check))
        .fallback(relay_email)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Run the HTTP server until `shutdown` fires.
pub async fn run_http_server(
    listener: TcpListener,
    relay: Arc<Relay>,
    max_body_bytes: usize,
    mut shutdown: broadcast::Receiver<()>,
) {
    let app = router(relay, max_body_bytes);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
    {
        tracing::error!("HTTP server error: {e}");
    }
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "allow_override": state.relay.server_config().allow_override,
    }))
}

/// Failures are reported in the body; the status is always 200.
async fn relay_email(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match state.relay.relay_json(&body).await {
        Ok(receipt) => Json(json!({
            "success": true,
            "to": receipt.to_text(),
            "subject": receipt.subject,
        })),
        Err(e) => {
            tracing::warn!(kind = e.kind(), "{e}");
            Json(json!({ "error": e.to_string() }))
        }
    }
}

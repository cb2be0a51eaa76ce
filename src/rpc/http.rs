//! JSON-RPC over HTTP: a single POST endpoint plus a health route.

use crate::exec::Remote;
use crate::rpc::{JsonRpcRequest, RpcService};
use crate::ssh::pool::Connect;
use crate::utils::error::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    transport: &'static str,
    hosts: usize,
    pool_size: usize,
    active_hosts: Vec<String>,
    timestamp: DateTime<Utc>,
}

/// Bind and serve until the task is cancelled or the listener fails.
pub async fn serve<C: Connect>(service: RpcService<C>, host: &str, port: u16) -> Result<()>
where
    C::Session: Remote,
{
    let app = router(service);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP transport listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn router<C: Connect>(service: RpcService<C>) -> Router
where
    C::Session: Remote,
{
    Router::new()
        .route("/", post(handle_rpc::<C>))
        .route("/health", get(health::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn handle_rpc<C: Connect>(
    State(service): State<RpcService<C>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse
where
    C::Session: Remote,
{
    match service.handle(request).await {
        Some(response) => Json(response).into_response(),
        // Notification: acknowledged, nothing to say.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health<C: Connect>(State(service): State<RpcService<C>>) -> impl IntoResponse
where
    C::Session: Remote,
{
    let dispatcher = service.dispatcher();
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        transport: "http",
        hosts: dispatcher.hosts().len(),
        pool_size: dispatcher.pool().size().await,
        active_hosts: dispatcher.pool().active_hosts().await,
        timestamp: Utc::now(),
    };
    (StatusCode::OK, Json(response))
}

//! HTTP transport for the gateway.
//!
//! The wire contract is deliberately flat:
//!
//! - `POST /` and `POST /mcp` take one JSON-RPC envelope or a batch
//! - the status is always `200 OK`, except `204 No Content` for a lone
//!   notification; errors live inside the JSON-RPC body
//! - every response carries `MCP-Protocol-Version`
//!
//! `GET /.well-known/mcp.json`, `GET /health` and `GET /` are read-only.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::dispatcher::RpcDispatcher;
use super::protocol::PROTOCOL_VERSION_HEADER;

/// Builds the gateway router.
pub fn router(dispatcher: Arc<RpcDispatcher>) -> Router {
    Router::new()
        .route("/", get(root).post(rpc))
        .route("/mcp", post(rpc))
        .route("/.well-known/mcp.json", get(discovery))
        .route("/health", get(health))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(dispatcher)
}

async fn rpc(
    State(dispatcher): State<Arc<RpcDispatcher>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let outcome = dispatcher
        .handle(&headers, &body)
        .instrument(info_span!("rpc", %request_id))
        .await;

    let response = match outcome.body {
        Some(body) => (StatusCode::OK, Json(body)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    with_version(response, &outcome.session.negotiated_version)
}

async fn discovery(State(dispatcher): State<Arc<RpcDispatcher>>, headers: HeaderMap) -> Response {
    let version = dispatcher.header_session(&headers).negotiated_version;
    with_version(
        Json(dispatcher.discovery_document(&headers)).into_response(),
        &version,
    )
}

async fn health(State(dispatcher): State<Arc<RpcDispatcher>>, headers: HeaderMap) -> Response {
    let version = dispatcher.header_session(&headers).negotiated_version;
    let body = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    with_version(Json(body).into_response(), &version)
}

async fn root(State(dispatcher): State<Arc<RpcDispatcher>>, headers: HeaderMap) -> Response {
    let version = dispatcher.header_session(&headers).negotiated_version;
    with_version("ok".into_response(), &version)
}

fn with_version(mut response: Response, version: &str) -> Response {
    match HeaderValue::from_str(version) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(HeaderName::from_static(PROTOCOL_VERSION_HEADER), value);
        }
        Err(e) => warn!(version, error = %e, "Protocol version is not a valid header value"),
    }
    response
}

/// Resolves when the process is asked to stop.
///
/// Listens for SIGINT and SIGTERM on Unix and Ctrl+C elsewhere. If the
/// handlers cannot be installed the future never resolves and the server
/// runs until killed.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
                    _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Failed to install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

//! The three read-only routes a bitforest server exposes to clients, bound
//! to a real socket: `/blockchain_headers`, `/txchain.json`, and
//! `/oplogs/<name>.json`. Mirrors the original's `http.ServeMux` routing —
//! one handler per artifact, wired to the same generators used in tests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use bitforest_anchor::Pipeline;
use bitforest_forest::Store as ForestStore;
use bitforest_rpc::BitcoinRpc;

use crate::artifacts::{oplog_body, tx_chain_body};
use crate::error::{Error, Result};
use crate::header_cache::HeaderCache;

/// Everything a route handler needs to build a response body.
pub struct AppState<R> {
    pub header_cache: Arc<HeaderCache>,
    pub pipeline: Arc<Pipeline<R>>,
    pub rpc: Arc<R>,
    pub forest: Arc<ForestStore>,
}

/// Builds the router; does not bind a socket.
pub fn router<R>(state: Arc<AppState<R>>) -> Router
where
    R: BitcoinRpc + Send + Sync + 'static,
{
    Router::new()
        .route("/blockchain_headers", get(blockchain_headers::<R>))
        .route("/txchain.json", get(tx_chain::<R>))
        .route("/oplogs/:name", get(oplog::<R>))
        .with_state(state)
}

/// Binds `addr` and serves the three routes until `token` is cancelled.
pub async fn serve<R>(addr: SocketAddr, state: Arc<AppState<R>>, token: CancellationToken) -> Result<()>
where
    R: BitcoinRpc + Send + Sync + 'static,
{
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("serving artifacts on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    Ok(())
}

async fn blockchain_headers<R>(State(state): State<Arc<AppState<R>>>) -> impl IntoResponse
where
    R: BitcoinRpc + Send + Sync + 'static,
{
    let body = state.header_cache.serialize().await;
    ([(header::CONTENT_TYPE, "application/octet-stream")], body)
}

async fn tx_chain<R>(State(state): State<Arc<AppState<R>>>) -> Result<Response>
where
    R: BitcoinRpc + Send + Sync + 'static,
{
    let pipeline = state.pipeline.clone();
    let rpc = state.rpc.clone();
    let body = tokio::task::spawn_blocking(move || tx_chain_body(&pipeline, &rpc)).await??;
    Ok(json_response(body))
}

async fn oplog<R>(State(state): State<Arc<AppState<R>>>, Path(name): Path<String>) -> Result<Response>
where
    R: BitcoinRpc + Send + Sync + 'static,
{
    let name = name.strip_suffix(".json").unwrap_or(&name).to_string();
    let forest = state.forest.clone();
    let body = tokio::task::spawn_blocking(move || oplog_body(&forest, &name)).await??;
    Ok(json_response(body))
}

fn json_response(body: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

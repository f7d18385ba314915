//! Error types for the **bitforest** server crate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Server crate error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A codec error from `bitforest-core`.
    #[error(transparent)]
    Core(#[from] bitforest_core::Error),

    /// A diff-forest error.
    #[error(transparent)]
    Forest(#[from] bitforest_forest::Error),

    /// An anchor-pipeline error.
    #[error(transparent)]
    Anchor(#[from] bitforest_anchor::Error),

    /// A Bitcoin RPC collaborator error.
    #[error(transparent)]
    Rpc(#[from] bitforest_rpc::Error),

    /// A header arrived with the wrong length for a block header.
    #[error("bad header length at height {0}")]
    BadHeaderLength(u64),

    /// A blocking task panicked instead of returning.
    #[error("background task panicked: {0}")]
    TaskJoin(String),

    /// Failed to serialize a served artifact body.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Binding or accepting on the artifact-serving socket failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::TaskJoin(e.to_string())
    }
}

/// Artifact generation failures surface to HTTP clients as a 500; the
/// underlying cause is logged, not leaked into the response body.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        log::error!("serving artifact failed: {self}");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    }
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

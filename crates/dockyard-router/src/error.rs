//! Router errors and their client-facing responses.
//!
//! Every failure, an unreachable upstream included, reaches the client as a
//! plain 404; details go to the log.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use dockyard_artifacts::ArtifactError;
use dockyard_state::StoreError;
use http::StatusCode;
use thiserror::Error;

pub type RouterResult<T> = Result<T, RouterError>;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("request has no usable host")]
    NoHost,

    #[error("coordination store: {0}")]
    Store(#[from] StoreError),

    #[error("artifact fetch: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("upstream 127.0.0.1:{port}: {message}")]
    Upstream { port: u16, message: String },
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from("File not found"))
            .unwrap_or_else(|_| StatusCode::NOT_FOUND.into_response())
    }
}

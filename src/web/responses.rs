//! HTTP response helpers
//!
//! Previews are returned as raw JPEG. Failures are plain text: `400` for a
//! malformed request, `502` for anything that went wrong in the pipeline.

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;

use crate::errors::{PipelineError, WebError};

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// A rendered preview
pub fn jpeg(preview: Bytes) -> Response {
    let length = preview.len();
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, JPEG_CONTENT_TYPE.to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
        ],
        Body::from(preview),
    )
        .into_response()
}

/// Plain text error body terminated by a newline
pub fn text_error(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("{message}\n"),
    )
        .into_response()
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        text_error(StatusCode::BAD_REQUEST, self)
    }
}

/// A pipeline failure as seen by the client
#[derive(Debug)]
pub struct PipelineFailure(pub Arc<PipelineError>);

impl IntoResponse for PipelineFailure {
    fn into_response(self) -> Response {
        text_error(StatusCode::BAD_GATEWAY, self.0)
    }
}

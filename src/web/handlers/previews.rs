//! Preview endpoint

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::web::{
    AppState,
    extractors::PreviewParams,
    responses::{PipelineFailure, jpeg},
};

/// `GET /{mode}/{width}/{height}/{*url}`
///
/// Malformed parameters are rejected by the extractor with `400` before any
/// pipeline work happens.
pub async fn get_preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    PreviewParams(request): PreviewParams,
) -> Response {
    info!(
        url = %request.url,
        width = request.width,
        height = request.height,
        mode = %request.mode,
        "Preview requested"
    );

    let url = request.url.clone();
    match state.previews.process_request(request, &headers).await {
        Ok(preview) => jpeg(preview),
        Err(error) => {
            warn!(url = %url, stage = error.stage(), error = %error, "Preview failed");
            PipelineFailure(error).into_response()
        }
    }
}

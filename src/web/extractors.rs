//! Request extractors and validation

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use std::str::FromStr;

use crate::errors::{WebError, WebResult};
use crate::models::{CropMode, PreviewRequest};

/// Scheme re-attached to the target taken from the request path
pub const TARGET_SCHEME: &str = "http://";

/// `/{mode}/{width}/{height}/{*url}` parsed into a preview request
#[derive(Debug, Clone)]
pub struct PreviewParams(pub PreviewRequest);

impl<S> FromRequestParts<S> for PreviewParams
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((mode, width, height, target)) =
            Path::<(String, String, String, String)>::from_request_parts(parts, state)
                .await
                .map_err(|rejection| WebError::InvalidPath {
                    message: rejection.body_text(),
                })?;

        parse_preview_request(&mode, &width, &height, &target, parts.uri.query()).map(PreviewParams)
    }
}

/// Validate raw path segments. The target keeps its query string, if any.
pub fn parse_preview_request(
    mode: &str,
    width: &str,
    height: &str,
    target: &str,
    query: Option<&str>,
) -> WebResult<PreviewRequest> {
    let mode = CropMode::from_str(mode).map_err(|_| WebError::InvalidCropMode {
        mode: mode.to_string(),
    })?;
    let width = parse_dimension("width", width)?;
    let height = parse_dimension("height", height)?;

    let target = target.trim_start_matches('/');
    if target.is_empty() {
        return Err(WebError::MissingUrl);
    }
    let url = match query {
        Some(query) => format!("{TARGET_SCHEME}{target}?{query}"),
        None => format!("{TARGET_SCHEME}{target}"),
    };

    Ok(PreviewRequest {
        url,
        width,
        height,
        mode,
    })
}

/// Positive decimal integer, digits only
fn parse_dimension(field: &'static str, value: &str) -> WebResult<u32> {
    let invalid = || WebError::InvalidDimension {
        field,
        value: value.to_string(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match value.parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(invalid()),
    }
}

//! HTTP middleware

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, Method, Uri, header},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{info, warn};

/// Request logging middleware
///
/// Logs every request with its outcome, timing and client identification
pub async fn request_logging_middleware(
    method: Method,
    uri: Uri,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    let version = format!("{:?}", request.version());
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    let headers = request.headers();
    let real_ip = header_value(headers, "x-real-ip");
    let forwarded_for = header_value(headers, "x-forwarded-for");
    let referer = header_value(headers, header::REFERER.as_str());
    let user_agent = header_value(headers, header::USER_AGENT.as_str());

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let duration = start.elapsed();

    if status >= 400 {
        warn!(
            method = %method,
            uri = %uri,
            version = %version,
            status = status,
            request_id = %request_id,
            duration_ms = duration.as_millis(),
            real_ip = %real_ip,
            forwarded_for = %forwarded_for,
            remote_addr = %remote_addr,
            referer = %referer,
            user_agent = %user_agent,
            "HTTP request completed with error"
        );
    } else {
        info!(
            method = %method,
            uri = %uri,
            version = %version,
            status = status,
            request_id = %request_id,
            duration_ms = duration.as_millis(),
            real_ip = %real_ip,
            forwarded_for = %forwarded_for,
            remote_addr = %remote_addr,
            referer = %referer,
            user_agent = %user_agent,
            "HTTP request completed"
        );
    }

    response
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

//! Upstream image fetching
//!
//! Only plain `http` URLs are fetched, only over HTTP/1.1, and only
//! `image/jpeg` responses are accepted.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderName};
use reqwest::{Client, StatusCode, Version, redirect};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::FetchConfig;
use crate::errors::FetchError;

pub const SUPPORTED_SCHEME: &str = "http";
pub const SUPPORTED_CONTENT_TYPE: &str = "image/jpeg";
const MAX_REDIRECTS: usize = 10;

/// Retrieves source images
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, forwarding the caller's request headers
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<Bytes, FetchError>;
}

/// reqwest-backed fetcher with separate connect and whole-request deadlines
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::with_timeouts(
            config.connect_timeout,
            config.request_timeout,
            config.max_body_bytes,
        )
    }

    pub fn with_timeouts(
        connect_timeout: Duration,
        request_timeout: Duration,
        max_body_bytes: u64,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .http1_only()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .redirect(redirect::Policy::custom(|attempt| {
                if attempt.url().scheme() != SUPPORTED_SCHEME {
                    let scheme = attempt.url().scheme().to_string();
                    attempt.error(format!("redirect to unsupported scheme: {scheme}"))
                } else if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .map_err(FetchError::Request)?;

        Ok(Self {
            client,
            max_body_bytes,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<Bytes, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if parsed.scheme() != SUPPORTED_SCHEME {
            return Err(FetchError::UnsupportedScheme {
                scheme: parsed.scheme().to_string(),
            });
        }

        let response = self
            .client
            .get(parsed)
            .headers(forwardable_headers(headers))
            .send()
            .await
            .map_err(FetchError::Request)?;

        validate_response(response.status(), response.headers(), response.version())?;

        if response
            .content_length()
            .is_some_and(|length| length > self.max_body_bytes)
        {
            return Err(FetchError::BodyTooLarge {
                limit: self.max_body_bytes,
            });
        }

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(FetchError::ReadBody)?;
            if (body.len() + chunk.len()) as u64 > self.max_body_bytes {
                return Err(FetchError::BodyTooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = body.len(), "Fetched source image");
        Ok(body.freeze())
    }
}

/// Check status, content type and protocol of an upstream response
pub fn validate_response(
    status: StatusCode,
    headers: &HeaderMap,
    version: Version,
) -> Result<(), FetchError> {
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
        });
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();
    if !content_type.eq_ignore_ascii_case(SUPPORTED_CONTENT_TYPE) {
        return Err(FetchError::UnsupportedContentType { content_type });
    }

    if version != Version::HTTP_11 {
        return Err(FetchError::UnsupportedProtocol {
            protocol: format!("{version:?}"),
        });
    }

    Ok(())
}

/// Inbound headers that may be replayed upstream.
///
/// Hop-by-hop headers describe the client's connection to us, not ours to the
/// upstream. `accept-encoding` is dropped so the body arrives as raw JPEG.
pub fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if !is_hop_by_hop(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
            | "accept-encoding"
    ) || name.as_str().starts_with("proxy-")
}

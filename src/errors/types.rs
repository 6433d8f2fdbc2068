//! Error type definitions for the image previewer

use std::path::PathBuf;
use thiserror::Error;

/// Startup failures
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Cache directory errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Outbound fetch failures
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to parse image url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported url scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("failed to perform request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("upstream responded with status {status}")]
    Status { status: u16 },

    #[error("got not supported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    #[error("got not supported protocol: {protocol}")]
    UnsupportedProtocol { protocol: String },

    #[error("failed to read response body: {0}")]
    ReadBody(#[source] reqwest::Error),

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },
}

/// Image transform failures
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("jpeg: image is too large to encode")]
    TooLarge { width: u32, height: u32 },

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Cache directory I/O failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// True when the underlying I/O error is a missing file
    pub fn is_not_found(&self) -> bool {
        let source = match self {
            Self::CreateDirectory { source, .. }
            | Self::Write { source, .. }
            | Self::Read { source, .. }
            | Self::Remove { source, .. } => source,
        };
        source.kind() == std::io::ErrorKind::NotFound
    }
}

/// A failed preview request, tagged with the stage that failed
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read cached image: {0}")]
    CacheRead(#[source] StorageError),

    #[error("failed to fetch image: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to crop image: {0}")]
    Transform(#[from] TransformError),

    #[error("failed to save image: {0}")]
    Persist(#[source] StorageError),

    #[error("preview task failed: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Short stage label used in structured logs
    pub fn stage(&self) -> &'static str {
        match self {
            Self::CacheRead(_) => "cache_read",
            Self::Fetch(_) => "fetch",
            Self::Transform(_) => "transform",
            Self::Persist(_) => "persist",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Malformed inbound preview requests
#[derive(Error, Debug)]
pub enum WebError {
    #[error("unsupported crop mode: {mode}")]
    InvalidCropMode { mode: String },

    #[error("invalid {field}: {value}")]
    InvalidDimension { field: &'static str, value: String },

    #[error("missing image url")]
    MissingUrl,

    #[error("invalid preview path: {message}")]
    InvalidPath { message: String },
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl PipelineError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

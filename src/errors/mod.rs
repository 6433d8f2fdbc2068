//! Centralized error handling for the image previewer
//!
//! Each layer owns a `thiserror` enum so failures keep their context on the
//! way up. Only the binary edge collapses them into `anyhow`.
//!
//! # Error Categories
//!
//! - **Fetch Errors**: upstream connectivity and response validation
//! - **Transform Errors**: decode, resample and encode failures
//! - **Storage Errors**: cache directory I/O
//! - **Pipeline Errors**: the above, wrapped with the pipeline stage that failed
//! - **Web Errors**: malformed inbound preview requests

use std::sync::Arc;

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Pipeline results are shared between coalesced requests, so the error is reference counted
pub type PipelineResult<T> = Result<T, Arc<PipelineError>>;

/// Convenience type alias for Web Results
pub type WebResult<T> = Result<T, WebError>;

//! Configuration default values
//!
//! Central place for every default so CLI help, config files and tests agree.

use std::time::Duration;

// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

// Upstream fetch defaults
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(25);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);
pub const DEFAULT_MAX_BODY_BYTES: u64 = 32 * 1024 * 1024; // 32MB

// Preview cache defaults
pub const DEFAULT_CACHE_CAPACITY: usize = 5;
pub const DEFAULT_TEMP_DIR_PREFIX: &str = "image-previewer-";

// Transform defaults
pub const DEFAULT_JPEG_QUALITY: u8 = 75;
/// Largest width * height rendered, including the scaled image a fill crops from
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 40_000_000;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "IMAGE_PREVIEWER_";

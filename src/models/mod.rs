//! Domain types shared by the pipeline and the web layer

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

/// How the source image is fitted into the requested box
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CropMode {
    /// Scale and center-crop to exactly fill the box, keeping the aspect ratio
    Fill,
    /// Scale to exactly the box, ignoring the aspect ratio
    Resize,
}

impl CropMode {
    /// Stable numeric code mixed into cache keys. Changing it orphans every cached file.
    pub fn code(self) -> u8 {
        match self {
            CropMode::Fill => 1,
            CropMode::Resize => 3,
        }
    }
}

/// Deterministic identifier of a (url, width, height, mode) preview
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub const FILE_EXTENSION: &'static str = "jpeg";

    pub(crate) fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// On-disk file name, `<hex-key>.jpeg`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, Self::FILE_EXTENSION)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated inbound preview request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub mode: CropMode,
}

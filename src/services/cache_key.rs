//! Cache key derivation
//!
//! Keys are XXH64 (seed 0) over `url|width|height|mode_code`, rendered as
//! 16 lowercase hex characters. The seed is fixed so a key computed by one
//! deployment names the same file in the next.

use xxhash_rust::xxh64::xxh64;

use crate::models::{CacheKey, CropMode};

const KEY_SEED: u64 = 0;

/// Hash arbitrary bytes into the key's hex form
pub fn hash_hex(input: &[u8]) -> String {
    hex::encode(xxh64(input, KEY_SEED).to_be_bytes())
}

/// Derive the cache key for a preview request.
///
/// The url is the only free-form field and it leads the pre-image; every field
/// after it is a delimiter-free integer, so distinct tuples never share a
/// pre-image even when the url itself contains `|`.
pub fn cache_key(url: &str, width: u32, height: u32, mode: CropMode) -> CacheKey {
    let preimage = format!("{url}|{width}|{height}|{}", mode.code());
    CacheKey::from_hex(hash_hex(preimage.as_bytes()))
}

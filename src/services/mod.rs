//! Preview services
//!
//! The pipeline (`preview`) composes the cache key, the disk-backed cache and
//! the two gateways. Gateways are traits so tests can swap in doubles.

pub mod cache_key;
pub mod fetcher;
pub mod preview;
pub mod preview_cache;
pub mod transformer;

pub use cache_key::cache_key;
pub use fetcher::{Fetcher, HttpFetcher};
pub use preview::PreviewService;
pub use preview_cache::{CacheStats, EvictionOutcome, PreviewCache};
pub use transformer::{ImageTransformer, Transformer};

//! HTTP image preview proxy
//!
//! Fetches a remote JPEG, fills or resizes it to the requested box and keeps
//! the result in a bounded, disk-backed LRU cache.

pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod services;
pub mod storage;
pub mod web;

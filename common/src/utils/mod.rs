//! Utility functions and helpers.

pub mod cache_key;

// Re-export commonly used types
pub use cache_key::{canonicalize, CacheKey};

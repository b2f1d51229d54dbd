//! Shared building blocks for the Data API bridge.
//!
//! - [`errors`]: the `AppError` taxonomy and its HTTP rendering
//! - [`config`]: process configuration loaded from the environment
//! - [`models`]: target profiles and tool-call models
//! - [`response`]: the unified API response envelope
//! - [`middleware`]: request-id propagation
//! - [`utils`]: cache-key construction

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;

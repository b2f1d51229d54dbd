//! Shared data models.

pub mod target;
pub mod tool;

// Re-export commonly used types
pub use target::{Credentials, Protocol, TargetProfile, TargetSummary};
pub use tool::{CacheScope, OperationKind};

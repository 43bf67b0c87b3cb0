//! Shared data models for the vproc engine.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their status machine, and the per-attempt operation log
//! - Operation-specific processing parameters
//! - Read-models returned to the API layer

pub mod job;
pub mod params;
pub mod view;

// Re-export common types
pub use job::{Job, JobId, JobStatus, OperationRecord, OperationType};
pub use params::ProcessingParams;
pub use view::{JobStatusView, OperationView};

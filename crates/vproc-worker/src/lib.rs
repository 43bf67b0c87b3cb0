//! vproc job dispatch and execution engine.
//!
//! Ties the other crates together: the [`dispatcher`] polls the job store
//! and fans claimed jobs into the [`pipeline`] under a bounded concurrency
//! ceiling, the [`sweeper`] reclaims aged jobs and blobs, and [`service`]
//! is the operation surface the API layer consumes.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod pipeline;
pub mod preflight;
pub mod service;
pub mod sweeper;

pub use config::EngineConfig;
pub use dispatcher::Dispatcher;
pub use error::{EngineError, EngineResult};
pub use pipeline::ProcessContext;
pub use preflight::{run_preflight, PreflightReport};
pub use service::JobService;
pub use sweeper::RetentionSweeper;

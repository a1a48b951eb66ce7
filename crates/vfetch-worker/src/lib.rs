//! Media acquisition worker.
//!
//! This crate provides:
//! - Key pools with ordered failover for the search API
//! - Search, download and scene detection orchestrators
//! - The job runner: state transitions, retries with backoff, time limits
//! - Job executor with crash recovery and graceful shutdown

pub mod config;
pub mod download;
pub mod error;
pub mod executor;
pub mod key_rotation;
pub mod logging;
pub mod metrics;
pub mod observer;
pub mod processor;
pub mod retry;
pub mod runner;
pub mod scene_detection;
pub mod search;

pub use config::{KeyResetPolicy, WorkerConfig};
pub use download::DownloadOrchestrator;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use key_rotation::{KeyPool, RotationPolicy, SharedKeyPool};
pub use logging::JobLogger;
pub use observer::{JobContext, JobObserver, LoggingObserver};
pub use processor::{JobHandler, JobProcessor};
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{JobRunner, RunOutcome};
pub use scene_detection::SceneDetectionOrchestrator;
pub use search::SearchOrchestrator;

//! Job transport and status storage.
//!
//! This crate provides:
//! - Job payloads for every job kind
//! - A Redis Streams broker with delayed retries and a DLQ
//! - A Redis status store holding the latest snapshot per job
//! - In-memory implementations of both for tests
//! - The submit/poll client and the progress writer

pub mod broker;
pub mod client;
pub mod error;
pub mod job;
pub mod memory;
pub mod progress;
pub mod status;

pub use broker::{Delivery, JobBroker, QueueConfig, RedisBroker};
pub use client::JobClient;
pub use error::{QueueError, QueueResult};
pub use job::{BatchDownloadJob, DownloadJob, LookupJob, QueueJob, SceneDetectionJob, SearchJob};
pub use memory::{InMemoryBroker, InMemoryStatusStore};
pub use progress::{progress_channel, ProgressWriter, StoreProgressSink};
pub use status::{RedisStatusStore, StatusStore};

//! Persistent lifecycle tracking for background job queues.
//!
//! A [`hooks::DatabaseNotificationHook`] plugged into a job queue records every
//! job's dispatch, dequeue and completion in a [`job_store::JobRecordStore`];
//! [`stats::JobStats`] answers backlog, success-rate and timing questions over
//! the recorded jobs.

pub mod config;
pub mod dialect;
pub mod error;
pub mod hooks;
pub mod job_store;
pub mod recorder;
pub mod sqlite_persistence;
pub mod stats;

// Re-export commonly used types for convenience
pub use error::{LedgerError, LedgerResult};
pub use hooks::{DatabaseNotificationHook, JobEventData, JobEventDelegate};
pub use job_store::{JobRecordStore, MemoryJobStore, SqliteJobStore};
pub use recorder::{LifecycleRecorder, RecordOutcome};
pub use stats::JobStats;

//! Callbacks invoked by a job queue as jobs move through their lifecycle.

mod database_hook;
mod policy;

pub use database_hook::DatabaseNotificationHook;
pub use policy::{DefaultHookPolicy, HookPolicy, TruncatingPolicy};

use crate::error::LedgerResult;
use crate::job_store::JobDispatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Error type a queue reports for a failed job.
pub type JobError = dyn std::error::Error + Send + Sync;

/// What the queue knows about a job when it is dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEventData {
    pub id: String,
    pub job_name: String,
    pub queue_name: String,
    pub payload: Vec<u8>,
    pub max_retry_count: i64,
    pub delay_until: Option<DateTime<Utc>>,
    pub queued_at: DateTime<Utc>,
}

impl From<JobEventData> for JobDispatch {
    fn from(data: JobEventData) -> Self {
        JobDispatch {
            job_id: data.id,
            job_name: data.job_name,
            queue_name: data.queue_name,
            payload: data.payload,
            max_retry_count: data.max_retry_count,
            delay_until: data.delay_until,
            queued_at: data.queued_at,
        }
    }
}

/// Lifecycle notifications emitted by a job queue.
///
/// Every callback defaults to doing nothing, so delegates only implement the
/// events they care about. An `Err` tells the queue the notification failed.
#[async_trait]
pub trait JobEventDelegate: Send + Sync {
    /// The job was pushed onto a queue.
    async fn dispatched(&self, _job: JobEventData) -> LedgerResult<()> {
        Ok(())
    }

    /// A worker picked the job up.
    async fn did_dequeue(&self, _job_id: &str) -> LedgerResult<()> {
        Ok(())
    }

    async fn success(&self, _job_id: &str) -> LedgerResult<()> {
        Ok(())
    }

    async fn error(&self, _job_id: &str, _error: &JobError) -> LedgerResult<()> {
        Ok(())
    }
}

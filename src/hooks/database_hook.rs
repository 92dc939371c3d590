use super::policy::{DefaultHookPolicy, HookPolicy};
use super::{JobError, JobEventData, JobEventDelegate};
use crate::error::{LedgerError, LedgerResult};
use crate::job_store::{JobDispatch, JobRecordStore};
use crate::recorder::LifecycleRecorder;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

/// Records every lifecycle event of every job in a [`JobRecordStore`].
///
/// Store calls are blocking and run on tokio's blocking pool. Store failures
/// are returned to the queue as-is.
#[derive(Clone)]
pub struct DatabaseNotificationHook {
    recorder: LifecycleRecorder,
    policy: Arc<dyn HookPolicy>,
}

impl DatabaseNotificationHook {
    pub fn new(store: Arc<dyn JobRecordStore>) -> Self {
        Self::with_policy(store, DefaultHookPolicy)
    }

    pub fn with_policy(store: Arc<dyn JobRecordStore>, policy: impl HookPolicy + 'static) -> Self {
        Self {
            recorder: LifecycleRecorder::new(store),
            policy: Arc::new(policy),
        }
    }

    pub fn recorder(&self) -> &LifecycleRecorder {
        &self.recorder
    }

    async fn run<T, F>(&self, job_id: &str, operation: &str, f: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(LifecycleRecorder) -> LedgerResult<T> + Send + 'static,
    {
        let recorder = self.recorder.clone();
        let result = match tokio::task::spawn_blocking(move || f(recorder)).await {
            Ok(result) => result,
            Err(e) => Err(LedgerError::StoreUnavailable(format!(
                "{} task failed: {}",
                operation, e
            ))),
        };
        if let Err(e) = &result {
            error!("{} - Failed to {}: {}", job_id, operation, e);
        }
        result
    }
}

#[async_trait]
impl JobEventDelegate for DatabaseNotificationHook {
    async fn dispatched(&self, job: JobEventData) -> LedgerResult<()> {
        let job_id = job.id.clone();
        let dispatch: JobDispatch = self.policy.transform_payload(job).into();
        info!("{} - Adding job to database", job_id);
        self.run(&job_id, "record dispatch", move |recorder| {
            recorder.record_dispatch(&dispatch)
        })
        .await?;
        info!("{} - Added job to database", job_id);
        Ok(())
    }

    async fn did_dequeue(&self, job_id: &str) -> LedgerResult<()> {
        info!("{} - Updating to status of running", job_id);
        let id = job_id.to_string();
        let at = Utc::now();
        self.run(job_id, "record dequeue", move |recorder| {
            recorder.record_dequeue(&id, at)
        })
        .await?;
        info!("{} - Done updating to status of running", job_id);
        Ok(())
    }

    async fn success(&self, job_id: &str) -> LedgerResult<()> {
        info!("{} - Updating to status of success", job_id);
        let id = job_id.to_string();
        let at = Utc::now();
        self.run(job_id, "record success", move |recorder| {
            recorder.record_completion(&id, at, None)
        })
        .await?;
        info!("{} - Done updating to status of success", job_id);
        Ok(())
    }

    async fn error(&self, job_id: &str, error: &JobError) -> LedgerResult<()> {
        info!("{} - Updating to status of error", job_id);
        let id = job_id.to_string();
        let at = Utc::now();
        let message = self.policy.stringify_error(error);
        self.run(job_id, "record error", move |recorder| {
            recorder.record_completion(&id, at, Some(message))
        })
        .await?;
        info!("{} - Done updating to status of error", job_id);
        Ok(())
    }
}

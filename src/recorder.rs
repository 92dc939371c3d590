//! Idempotent lifecycle transitions on job records.
//!
//! Dispatch, dequeue and completion events may arrive from different workers,
//! out of order or more than once. Every field is written by its first writer
//! only, so any interleaving of the same events converges to the same row.

use crate::error::{LedgerError, LedgerResult};
use crate::job_store::{
    ConditionalUpdate, FieldValue, JobColumn, JobDispatch, JobRecord, JobRecordStore, JobStatus,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of a dequeue or completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The job has a record; guarded fields were written if still unset.
    Applied,
    /// No record exists for the job, nothing was written.
    UnknownJob,
}

#[derive(Clone)]
pub struct LifecycleRecorder {
    store: Arc<dyn JobRecordStore>,
}

impl LifecycleRecorder {
    pub fn new(store: Arc<dyn JobRecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn JobRecordStore> {
        &self.store
    }

    /// Creates the `queued` record of a dispatched job.
    ///
    /// A second dispatch of the same job id fails with
    /// [`LedgerError::DuplicateJobId`] and leaves the first record untouched.
    pub fn record_dispatch(&self, dispatch: &JobDispatch) -> LedgerResult<()> {
        match self.store.insert(dispatch) {
            Ok(id) => {
                debug!("{} - Created record {}", dispatch.job_id, id);
                Ok(())
            }
            Err(e @ LedgerError::DuplicateJobId(_)) => {
                error!("{} - Job was dispatched twice", dispatch.job_id);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Marks the job as picked up at `at`.
    ///
    /// `dequeuedAt` is only set if still unset, `status` only moves from
    /// `queued` to `running`.
    pub fn record_dequeue(&self, job_id: &str, at: DateTime<Utc>) -> LedgerResult<RecordOutcome> {
        let update = ConditionalUpdate::new()
            .set_if_null(JobColumn::DequeuedAt, FieldValue::Timestamp(at))
            .set_if_status_in(
                JobColumn::Status,
                FieldValue::Status(JobStatus::Running),
                &[JobStatus::Queued],
            );
        self.apply(job_id, &update, "dequeue")
    }

    /// Marks the job as finished at `at`, failed if `error` is given.
    ///
    /// A job completing without a recorded dequeue gets `dequeuedAt = at`.
    /// Only the first completion decides the terminal status and error string.
    pub fn record_completion(
        &self,
        job_id: &str,
        at: DateTime<Utc>,
        error: Option<String>,
    ) -> LedgerResult<RecordOutcome> {
        let status = if error.is_some() {
            JobStatus::Error
        } else {
            JobStatus::Success
        };

        let mut update = ConditionalUpdate::new()
            .set_if_null(JobColumn::DequeuedAt, FieldValue::Timestamp(at))
            .set_if_null(JobColumn::CompletedAt, FieldValue::Timestamp(at));
        if let Some(error) = error {
            // An active job never has an error string, and a finished one
            // must keep whatever its first completion left.
            update = update.set_if_status_in(
                JobColumn::ErrorString,
                FieldValue::Text(error),
                JobStatus::ACTIVE,
            );
        }
        let update = update.set_if_status_in(
            JobColumn::Status,
            FieldValue::Status(status),
            JobStatus::ACTIVE,
        );
        self.apply(job_id, &update, "completion")
    }

    /// Looks up the record of `job_id`.
    pub fn get_record(&self, job_id: &str) -> LedgerResult<JobRecord> {
        self.store
            .find(job_id)?
            .ok_or_else(|| LedgerError::UnknownJobId(job_id.to_string()))
    }

    fn apply(
        &self,
        job_id: &str,
        update: &ConditionalUpdate,
        event: &str,
    ) -> LedgerResult<RecordOutcome> {
        if self.store.update_where(job_id, update)? {
            Ok(RecordOutcome::Applied)
        } else {
            warn!("{} - No record found, ignoring {} event", job_id, event);
            Ok(RecordOutcome::UnknownJob)
        }
    }
}

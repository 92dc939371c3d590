use super::models::{
    ConditionalUpdate, FieldValue, Guard, JobColumn, JobDispatch, JobRecord, JobStatus,
    RecordFilter,
};
use super::JobRecordStore;
use crate::error::{LedgerError, LedgerResult};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Job record store kept in process memory.
///
/// It has no statement execution capability, so stats over it are computed
/// in process. Conditional updates run under a single lock.
#[derive(Default)]
pub struct MemoryJobStore {
    records: Mutex<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, HashMap<String, JobRecord>>> {
        self.records
            .lock()
            .map_err(|_| LedgerError::StoreUnavailable("job records lock poisoned".to_string()))
    }

    fn guard_holds(guard: &Guard, column: JobColumn, before: &JobRecord) -> bool {
        match guard {
            Guard::IfNull => match column {
                JobColumn::DequeuedAt => before.dequeued_at.is_none(),
                JobColumn::CompletedAt => before.completed_at.is_none(),
                JobColumn::ErrorString => before.error_string.is_none(),
                // status is never null
                JobColumn::Status => false,
            },
            Guard::IfStatusIn(states) => states.contains(&before.status),
        }
    }

    fn assign(record: &mut JobRecord, column: JobColumn, value: &FieldValue) -> LedgerResult<()> {
        match (column, value) {
            (JobColumn::DequeuedAt, FieldValue::Timestamp(ts)) => record.dequeued_at = Some(*ts),
            (JobColumn::CompletedAt, FieldValue::Timestamp(ts)) => record.completed_at = Some(*ts),
            (JobColumn::ErrorString, FieldValue::Text(s)) => record.error_string = Some(s.clone()),
            (JobColumn::Status, FieldValue::Status(status)) => record.status = *status,
            (column, value) => {
                return Err(LedgerError::InvalidArgument(format!(
                    "cannot assign {:?} to column {}",
                    value,
                    column.name()
                )))
            }
        }
        Ok(())
    }
}

impl JobRecordStore for MemoryJobStore {
    fn insert(&self, dispatch: &JobDispatch) -> LedgerResult<String> {
        let mut records = self.lock()?;
        if records.contains_key(&dispatch.job_id) {
            return Err(LedgerError::DuplicateJobId(dispatch.job_id.clone()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        records.insert(
            dispatch.job_id.clone(),
            JobRecord {
                id: id.clone(),
                job_id: dispatch.job_id.clone(),
                job_name: dispatch.job_name.clone(),
                queue_name: dispatch.queue_name.clone(),
                payload: dispatch.payload.clone(),
                max_retry_count: dispatch.max_retry_count,
                delay_until: dispatch.delay_until,
                queued_at: dispatch.queued_at,
                dequeued_at: None,
                completed_at: None,
                error_string: None,
                status: JobStatus::Queued,
                created_at: Some(now),
                updated_at: Some(now),
            },
        );
        Ok(id)
    }

    fn update_where(&self, job_id: &str, update: &ConditionalUpdate) -> LedgerResult<bool> {
        let mut records = self.lock()?;
        let Some(record) = records.get_mut(job_id) else {
            return Ok(false);
        };

        let before = record.clone();
        let mut updated = before.clone();
        for assignment in update.assignments() {
            if Self::guard_holds(&assignment.guard, assignment.column, &before) {
                Self::assign(&mut updated, assignment.column, &assignment.value)?;
            }
        }
        updated.updated_at = Some(Utc::now());
        *record = updated;
        Ok(true)
    }

    fn select(&self, filter: &RecordFilter) -> LedgerResult<Vec<JobRecord>> {
        let records = self.lock()?;
        let mut matching: Vec<JobRecord> = records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        matching.sort_by_key(|record| record.queued_at);
        Ok(matching)
    }

    fn find(&self, job_id: &str) -> LedgerResult<Option<JobRecord>> {
        Ok(self.lock()?.get(job_id).cloned())
    }
}

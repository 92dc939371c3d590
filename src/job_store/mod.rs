//! Durable storage of job lifecycle records.

mod memory_job_store;
mod models;
mod schema;
mod sqlite_job_store;

pub use memory_job_store::MemoryJobStore;
pub use models::*;
pub use schema::JOB_STORE_VERSIONED_SCHEMAS;
pub use sqlite_job_store::SqliteJobStore;

use crate::dialect::{DatabaseEngine, SqlValue, Statement};
use crate::error::LedgerResult;

/// Raw statement execution against a relational engine.
///
/// Stores that expose this let the stats queries push aggregation down to the
/// database instead of fetching rows.
pub trait SqlExecutor: Send + Sync {
    /// Engine the statements will run on.
    fn engine(&self) -> &DatabaseEngine;

    /// Runs a statement that yields exactly one row and returns its columns.
    fn fetch_row(&self, statement: &Statement) -> LedgerResult<Vec<SqlValue>>;

    /// Runs a statement and returns the number of affected rows.
    fn execute(&self, statement: &Statement) -> LedgerResult<usize>;
}

pub trait JobRecordStore: Send + Sync {
    /// Inserts a `queued` record for a dispatched job and returns its id.
    ///
    /// Fails with `LedgerError::DuplicateJobId` when the job id is already known.
    fn insert(&self, dispatch: &JobDispatch) -> LedgerResult<String>;

    /// Applies `update` atomically to the record of `job_id`.
    ///
    /// Assignments whose guard does not hold are skipped silently. Returns
    /// whether a record for `job_id` exists.
    fn update_where(&self, job_id: &str, update: &ConditionalUpdate) -> LedgerResult<bool>;

    fn select(&self, filter: &RecordFilter) -> LedgerResult<Vec<JobRecord>>;

    fn find(&self, job_id: &str) -> LedgerResult<Option<JobRecord>> {
        Ok(self.select(&RecordFilter::by_job_id(job_id))?.pop())
    }

    /// Statement execution capability, if the backing engine has one.
    fn sql_executor(&self) -> Option<&dyn SqlExecutor> {
        None
    }
}

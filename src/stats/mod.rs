//! Read-side aggregates over job records.
//!
//! Stores that can execute statements get a single aggregate query per call.
//! Everything else falls back to fetching the matching records and folding
//! them here. Both paths compute timings from epoch milliseconds so they agree
//! on the same data.

mod in_process;
mod models;
mod sql_aggregation;

pub use in_process::InProcessAggregation;
pub use models::*;
pub use sql_aggregation::SqlAggregation;

use crate::dialect::QueryBuilder;
use crate::error::LedgerResult;
use crate::job_store::JobRecordStore;
use std::sync::Arc;
use tracing::debug;

/// One way of computing the three aggregates.
pub trait JobAggregation {
    fn current_jobs_status(&self) -> LedgerResult<CurrentJobsStatusResponse>;

    fn completed_jobs(&self, window: TrailingWindow) -> LedgerResult<CompletedJobStatusResponse>;

    fn jobs_timing(
        &self,
        window: TrailingWindow,
        job_name: Option<&str>,
    ) -> LedgerResult<JobsTimingResponse>;
}

/// Entry point of the stats queries.
#[derive(Clone)]
pub struct JobStats {
    store: Arc<dyn JobRecordStore>,
    queries: Option<QueryBuilder>,
}

impl JobStats {
    /// Picks the aggregate-query strategy when `store` can execute statements.
    ///
    /// Fails with `UnsupportedDialect` when the store's engine has no query
    /// builder.
    pub fn new(store: Arc<dyn JobRecordStore>) -> LedgerResult<Self> {
        let queries = match store.sql_executor() {
            Some(executor) => Some(QueryBuilder::for_engine(executor.engine())?),
            None => None,
        };
        Ok(Self { store, queries })
    }

    /// Always aggregates in process, even over a store that executes statements.
    pub fn in_process(store: Arc<dyn JobRecordStore>) -> Self {
        Self {
            store,
            queries: None,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        if self.sql().is_some() {
            "sql"
        } else {
            "in-process"
        }
    }

    fn sql(&self) -> Option<SqlAggregation<'_>> {
        let queries = self.queries?;
        let executor = self.store.sql_executor()?;
        Some(SqlAggregation::new(executor, queries))
    }

    fn with_strategy<T>(
        &self,
        f: impl FnOnce(&dyn JobAggregation) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        match self.sql() {
            Some(sql) => f(&sql),
            None => f(&InProcessAggregation::new(self.store.as_ref())),
        }
    }

    pub fn get_status_of_current_jobs(&self) -> LedgerResult<CurrentJobsStatusResponse> {
        debug!("Current jobs status via {}", self.strategy_name());
        self.with_strategy(|s| s.current_jobs_status())
    }

    /// Jobs completed within the last `hours` hours. `hours` must be positive.
    pub fn get_completed_jobs_for_time_period(
        &self,
        hours: i64,
    ) -> LedgerResult<CompletedJobStatusResponse> {
        let window = TrailingWindow::hours(hours)?;
        debug!(
            "Completed jobs over {}h via {}",
            window.as_hours(),
            self.strategy_name()
        );
        self.with_strategy(|s| s.completed_jobs(window))
    }

    /// Average run and wait time of jobs completed within the last `hours`
    /// hours, optionally restricted to one job name.
    pub fn get_timing_data_for_jobs(
        &self,
        hours: i64,
        job_name: Option<&str>,
    ) -> LedgerResult<JobsTimingResponse> {
        let window = TrailingWindow::hours(hours)?;
        debug!(
            "Timing over {}h via {}",
            window.as_hours(),
            self.strategy_name()
        );
        self.with_strategy(|s| s.jobs_timing(window, job_name))
    }
}

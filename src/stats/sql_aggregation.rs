use super::{
    CompletedJobStatusResponse, CurrentJobsStatusResponse, JobAggregation, JobsTimingResponse,
    TrailingWindow,
};
use crate::dialect::{QueryBuilder, SqlValue, Statement};
use crate::error::{LedgerError, LedgerResult};
use crate::job_store::SqlExecutor;

/// Aggregates with one statement per query, computed by the database.
pub struct SqlAggregation<'a> {
    executor: &'a dyn SqlExecutor,
    queries: QueryBuilder,
}

impl<'a> SqlAggregation<'a> {
    pub fn new(executor: &'a dyn SqlExecutor, queries: QueryBuilder) -> Self {
        Self { executor, queries }
    }

    fn fetch(&self, statement: &Statement, columns: usize) -> LedgerResult<Vec<SqlValue>> {
        let row = self.executor.fetch_row(statement)?;
        if row.len() != columns {
            return Err(LedgerError::StoreUnavailable(format!(
                "expected {} columns, got {}",
                columns,
                row.len()
            )));
        }
        Ok(row)
    }

    fn integer(row: &[SqlValue], idx: usize) -> LedgerResult<i64> {
        row[idx].as_i64().ok_or_else(|| {
            LedgerError::StoreUnavailable(format!("column {} is not numeric: {:?}", idx, row[idx]))
        })
    }

    fn real(row: &[SqlValue], idx: usize) -> LedgerResult<f64> {
        Self::optional_real(row, idx)?.ok_or_else(|| {
            LedgerError::StoreUnavailable(format!("column {} is null", idx))
        })
    }

    fn optional_real(row: &[SqlValue], idx: usize) -> LedgerResult<Option<f64>> {
        match &row[idx] {
            SqlValue::Null => Ok(None),
            value => value.as_f64().map(Some).ok_or_else(|| {
                LedgerError::StoreUnavailable(format!("column {} is not numeric: {:?}", idx, value))
            }),
        }
    }
}

impl JobAggregation for SqlAggregation<'_> {
    fn current_jobs_status(&self) -> LedgerResult<CurrentJobsStatusResponse> {
        let row = self.fetch(&self.queries.current_jobs_status(), 2)?;
        Ok(CurrentJobsStatusResponse {
            queued_count: Self::integer(&row, 0)?,
            running_count: Self::integer(&row, 1)?,
        })
    }

    fn completed_jobs(&self, window: TrailingWindow) -> LedgerResult<CompletedJobStatusResponse> {
        let row = self.fetch(&self.queries.completed_jobs(window), 2)?;
        Ok(CompletedJobStatusResponse {
            completed_jobs: Self::integer(&row, 0)?,
            percent_success: Self::real(&row, 1)?,
        })
    }

    fn jobs_timing(
        &self,
        window: TrailingWindow,
        job_name: Option<&str>,
    ) -> LedgerResult<JobsTimingResponse> {
        let row = self.fetch(&self.queries.jobs_timing(window, job_name), 2)?;
        Ok(JobsTimingResponse {
            avg_run_time: Self::optional_real(&row, 0)?,
            avg_wait_time: Self::optional_real(&row, 1)?,
        })
    }
}

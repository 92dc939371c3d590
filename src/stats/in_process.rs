use super::{
    CompletedJobStatusResponse, CurrentJobsStatusResponse, JobAggregation, JobsTimingResponse,
    TrailingWindow,
};
use crate::error::LedgerResult;
use crate::job_store::{JobRecordStore, JobStatus, RecordFilter};
use chrono::{DateTime, Utc};

/// Aggregates by fetching matching records and folding them in memory.
pub struct InProcessAggregation<'a> {
    store: &'a dyn JobRecordStore,
}

impl<'a> InProcessAggregation<'a> {
    pub fn new(store: &'a dyn JobRecordStore) -> Self {
        Self { store }
    }
}

/// Seconds from `from` to `to`, at millisecond precision like the stored values.
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to.timestamp_millis() - from.timestamp_millis()) as f64 / 1000.0
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl JobAggregation for InProcessAggregation<'_> {
    fn current_jobs_status(&self) -> LedgerResult<CurrentJobsStatusResponse> {
        let records = self.store.select(&RecordFilter {
            statuses: Some(JobStatus::ACTIVE.to_vec()),
            ..Default::default()
        })?;
        let count = |status: JobStatus| {
            records.iter().filter(|r| r.status == status).count() as i64
        };
        Ok(CurrentJobsStatusResponse {
            queued_count: count(JobStatus::Queued),
            running_count: count(JobStatus::Running),
        })
    }

    fn completed_jobs(&self, window: TrailingWindow) -> LedgerResult<CompletedJobStatusResponse> {
        let records = self.store.select(&RecordFilter {
            completed_since: Some(window.start(Utc::now())),
            ..Default::default()
        })?;
        let completed = records.len() as i64;
        let succeeded = records
            .iter()
            .filter(|r| r.status == JobStatus::Success)
            .count() as i64;
        let percent_success = if completed == 0 {
            1.0
        } else {
            succeeded as f64 / completed as f64
        };
        Ok(CompletedJobStatusResponse {
            completed_jobs: completed,
            percent_success,
        })
    }

    fn jobs_timing(
        &self,
        window: TrailingWindow,
        job_name: Option<&str>,
    ) -> LedgerResult<JobsTimingResponse> {
        let records = self.store.select(&RecordFilter {
            job_name: job_name.map(str::to_string),
            completed_since: Some(window.start(Utc::now())),
            dequeued_only: true,
            ..Default::default()
        })?;

        let mut run_times = Vec::with_capacity(records.len());
        let mut wait_times = Vec::with_capacity(records.len());
        for record in &records {
            if let (Some(dequeued_at), Some(completed_at)) =
                (record.dequeued_at, record.completed_at)
            {
                run_times.push(seconds_between(dequeued_at, completed_at));
                wait_times.push(seconds_between(record.queued_at, dequeued_at));
            }
        }
        Ok(JobsTimingResponse {
            avg_run_time: average(&run_times),
            avg_wait_time: average(&wait_times),
        })
    }
}

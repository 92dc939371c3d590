use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Jobs currently queued or running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentJobsStatusResponse {
    /// Jobs dispatched but not yet picked up.
    pub queued_count: i64,
    /// Jobs picked up and not yet finished.
    pub running_count: i64,
}

/// Jobs that finished within a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedJobStatusResponse {
    pub completed_jobs: i64,
    /// Fraction (0.0 to 1.0) of `completed_jobs` that succeeded. 1.0 when
    /// nothing completed.
    pub percent_success: f64,
}

/// Average timings, in seconds, of jobs that finished within a trailing window.
/// Both are `None` when no job qualifies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsTimingResponse {
    /// Average time between dequeue and completion.
    pub avg_run_time: Option<f64>,
    /// Average time between dispatch and dequeue.
    pub avg_wait_time: Option<f64>,
}

/// The range `[now - hours, now]`. Only positive hour counts can be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingWindow {
    hours: u32,
}

impl TrailingWindow {
    pub fn hours(hours: i64) -> LedgerResult<Self> {
        if hours <= 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "hours must be positive, got {}",
                hours
            )));
        }
        let hours = u32::try_from(hours).map_err(|_| {
            LedgerError::InvalidArgument(format!("hours out of range: {}", hours))
        })?;
        Ok(Self { hours })
    }

    pub fn as_hours(&self) -> u32 {
        self.hours
    }

    /// Earliest completion time included in the window ending at `now`.
    ///
    /// Windows reaching past the earliest representable time start there.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_hours(self.hours as i64)
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

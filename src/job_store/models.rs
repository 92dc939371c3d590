use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Name of the table holding one row per dispatched job.
pub const JOB_COMPLETIONS_TABLE: &str = "_queue_job_completions";

/// Lifecycle state of a recorded job.
///
/// States only move forward: `Queued -> Running -> {Success | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Dispatched, not yet picked up by a worker.
    Queued,
    /// Picked up by a worker.
    Running,
    /// Finished without error.
    Success,
    /// Finished with an error.
    Error,
}

impl JobStatus {
    /// States from which a completion may still move the job.
    pub const ACTIVE: &'static [JobStatus] = &[JobStatus::Queued, JobStatus::Running];

    pub fn as_i64(&self) -> i64 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Success => 2,
            JobStatus::Error => 3,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(JobStatus::Queued),
            1 => Some(JobStatus::Running),
            2 => Some(JobStatus::Success),
            3 => Some(JobStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }
}

/// Everything known about a job at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDispatch {
    pub job_id: String,
    pub job_name: String,
    pub queue_name: String,
    pub payload: Vec<u8>,
    pub max_retry_count: i64,
    pub delay_until: Option<DateTime<Utc>>,
    pub queued_at: DateTime<Utc>,
}

/// A stored job record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub job_id: String,
    pub job_name: String,
    pub queue_name: String,
    #[serde(serialize_with = "serialize_payload")]
    pub payload: Vec<u8>,
    pub max_retry_count: i64,
    pub delay_until: Option<DateTime<Utc>>,
    pub queued_at: DateTime<Utc>,
    pub dequeued_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_string: Option<String>,
    pub status: JobStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn serialize_payload<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(payload))
}

/// Columns a lifecycle event is allowed to change after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobColumn {
    DequeuedAt,
    CompletedAt,
    ErrorString,
    Status,
}

impl JobColumn {
    pub fn name(&self) -> &'static str {
        match self {
            JobColumn::DequeuedAt => "dequeuedAt",
            JobColumn::CompletedAt => "completedAt",
            JobColumn::ErrorString => "errorString",
            JobColumn::Status => "status",
        }
    }
}

/// Value written by an [`Assignment`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Timestamp(DateTime<Utc>),
    Text(String),
    Status(JobStatus),
}

/// Condition under which an [`Assignment`] takes effect. It only ever looks at
/// the pre-update row.
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    /// The assigned column is currently null.
    IfNull,
    /// The row's status is currently one of these.
    IfStatusIn(&'static [JobStatus]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: JobColumn,
    pub value: FieldValue,
    pub guard: Guard,
}

/// A set of guarded assignments applied to one row as a single atomic step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionalUpdate {
    assignments: Vec<Assignment>,
}

impl ConditionalUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_if_null(mut self, column: JobColumn, value: FieldValue) -> Self {
        self.assignments.push(Assignment {
            column,
            value,
            guard: Guard::IfNull,
        });
        self
    }

    pub fn set_if_status_in(
        mut self,
        column: JobColumn,
        value: FieldValue,
        states: &'static [JobStatus],
    ) -> Self {
        self.assignments.push(Assignment {
            column,
            value,
            guard: Guard::IfStatusIn(states),
        });
        self
    }

    /// Assignments in application order: status-guarded ones come last so that
    /// every guard observes the row as it was before the update.
    pub fn assignments(&self) -> Vec<&Assignment> {
        let mut ordered: Vec<&Assignment> = self.assignments.iter().collect();
        ordered.sort_by_key(|a| a.column == JobColumn::Status);
        ordered
    }
}

/// Row filter for reads that fetch whole records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub job_id: Option<String>,
    pub job_name: Option<String>,
    pub statuses: Option<Vec<JobStatus>>,
    pub completed_since: Option<DateTime<Utc>>,
    pub dequeued_only: bool,
}

impl RecordFilter {
    pub fn by_job_id(job_id: &str) -> Self {
        Self {
            job_id: Some(job_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &JobRecord) -> bool {
        if let Some(job_id) = &self.job_id {
            if &record.job_id != job_id {
                return false;
            }
        }
        if let Some(job_name) = &self.job_name {
            if &record.job_name != job_name {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&record.status) {
                return false;
            }
        }
        if let Some(since) = &self.completed_since {
            match &record.completed_at {
                Some(completed_at) if completed_at >= since => {}
                _ => return false,
            }
        }
        if self.dequeued_only && record.dequeued_at.is_none() {
            return false;
        }
        true
    }
}

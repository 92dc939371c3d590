//! SQL text for each supported database engine.
//!
//! Engines disagree on identifier quoting, placeholder syntax and, most of all,
//! on how to subtract two timestamps. Every variable value ends up in
//! [`Statement::params`]; the only things spliced into the text are column
//! names, status codes and the window length, all produced here.

use crate::error::{LedgerError, LedgerResult};
use crate::job_store::{
    ConditionalUpdate, FieldValue, Guard, JobDispatch, JobStatus, RecordFilter,
    JOB_COMPLETIONS_TABLE,
};
use crate::stats::TrailingWindow;
use chrono::{DateTime, Utc};
use std::fmt;

/// Identity of the engine behind a store, resolved when the store is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEngine {
    Sqlite,
    Postgres,
    MySql,
    Other(String),
}

impl DatabaseEngine {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => DatabaseEngine::Sqlite,
            "postgres" | "postgresql" | "pg" => DatabaseEngine::Postgres,
            "mysql" | "mariadb" => DatabaseEngine::MySql,
            _ => DatabaseEngine::Other(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DatabaseEngine::Sqlite => "sqlite",
            DatabaseEngine::Postgres => "postgres",
            DatabaseEngine::MySql => "mysql",
            DatabaseEngine::Other(name) => name,
        }
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Real(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Integer(v) => Some(*v as f64),
            SqlValue::Real(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<Option<DateTime<Utc>>> for SqlValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(SqlValue::Null, SqlValue::Timestamp)
    }
}

impl From<&FieldValue> for SqlValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Timestamp(ts) => SqlValue::Timestamp(*ts),
            FieldValue::Text(s) => SqlValue::Text(s.clone()),
            FieldValue::Status(status) => SqlValue::Integer(status.as_i64()),
        }
    }
}

/// Statement text plus the values for its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    fn new(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

/// Column list shared by the record-fetching statements.
const RECORD_COLUMNS: &[&str] = &[
    "id",
    "jobId",
    "jobName",
    "queueName",
    "payload",
    "maxRetryCount",
    "delayUntil",
    "queuedAt",
    "dequeuedAt",
    "completedAt",
    "errorString",
    "status",
    "createdAt",
    "updatedAt",
];

/// Builds statements for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryBuilder {
    dialect: Dialect,
}

impl QueryBuilder {
    pub fn for_engine(engine: &DatabaseEngine) -> LedgerResult<Self> {
        let dialect = match engine {
            DatabaseEngine::Sqlite => Dialect::Sqlite,
            DatabaseEngine::Postgres => Dialect::Postgres,
            DatabaseEngine::MySql => Dialect::MySql,
            DatabaseEngine::Other(name) => {
                return Err(LedgerError::UnsupportedDialect(name.clone()))
            }
        };
        Ok(Self { dialect })
    }

    fn ident(&self, name: &str) -> String {
        match self.dialect {
            Dialect::MySql => format!("`{}`", name),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", name),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self.dialect {
            Dialect::Sqlite => format!("?{}", index),
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql => "?".to_string(),
        }
    }

    /// Pushes a parameter and returns the placeholder referring to it.
    fn bind(&self, stmt: &mut Statement, value: SqlValue) -> String {
        stmt.params.push(value);
        self.placeholder(stmt.params.len())
    }

    fn now(&self) -> &'static str {
        match self.dialect {
            Dialect::Sqlite => crate::sqlite_persistence::NOW_MILLIS,
            Dialect::Postgres => "NOW()",
            Dialect::MySql => "NOW(3)",
        }
    }

    /// Seconds elapsed between two timestamp columns, as a floating point value.
    fn seconds_between(&self, from: &str, to: &str) -> String {
        let (from, to) = (self.ident(from), self.ident(to));
        match self.dialect {
            Dialect::Sqlite => format!("(({} - {}) / 1000.0)", to, from),
            Dialect::Postgres => format!("EXTRACT(EPOCH FROM ({} - {}))", to, from),
            Dialect::MySql => format!("(TIMESTAMPDIFF(MICROSECOND, {}, {}) / 1000000.0)", from, to),
        }
    }

    /// Condition selecting rows whose `column` falls inside the window.
    fn within(&self, column: &str, window: TrailingWindow) -> String {
        let column = self.ident(column);
        let hours = window.as_hours();
        match self.dialect {
            Dialect::Sqlite => format!("{} >= {} - {} * 3600000", column, self.now(), hours),
            Dialect::Postgres => format!("{} >= NOW() - INTERVAL '{} hours'", column, hours),
            Dialect::MySql => format!("{} >= DATE_SUB(NOW(3), INTERVAL {} HOUR)", column, hours),
        }
    }

    fn as_float(&self, expr: &str) -> String {
        match self.dialect {
            Dialect::Sqlite => format!("CAST({} AS REAL)", expr),
            Dialect::Postgres => format!("CAST({} AS DOUBLE PRECISION)", expr),
            Dialect::MySql => format!("CAST({} AS DOUBLE)", expr),
        }
    }

    fn count_status(&self, status: JobStatus) -> String {
        format!(
            "COALESCE(SUM(CASE WHEN {} = {} THEN 1 ELSE 0 END), 0)",
            self.ident("status"),
            status.as_i64()
        )
    }

    fn status_list(states: &[JobStatus]) -> String {
        states
            .iter()
            .map(|s| s.as_i64().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `INSERT` of a freshly dispatched job with status `queued`.
    pub fn insert_record(&self, id: &str, dispatch: &JobDispatch) -> Statement {
        let mut stmt = Statement::new(String::new());
        let values = [
            ("id", SqlValue::Text(id.to_string())),
            ("jobId", SqlValue::Text(dispatch.job_id.clone())),
            ("jobName", SqlValue::Text(dispatch.job_name.clone())),
            ("queueName", SqlValue::Text(dispatch.queue_name.clone())),
            ("payload", SqlValue::Blob(dispatch.payload.clone())),
            ("maxRetryCount", SqlValue::Integer(dispatch.max_retry_count)),
            ("delayUntil", dispatch.delay_until.into()),
            ("queuedAt", SqlValue::Timestamp(dispatch.queued_at)),
            ("status", SqlValue::Integer(JobStatus::Queued.as_i64())),
        ];
        let mut columns = Vec::with_capacity(values.len() + 1);
        let mut placeholders = Vec::with_capacity(values.len() + 1);
        for (column, value) in values {
            columns.push(self.ident(column));
            placeholders.push(self.bind(&mut stmt, value));
        }
        columns.push(self.ident("updatedAt"));
        placeholders.push(self.now().to_string());

        stmt.sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            JOB_COMPLETIONS_TABLE,
            columns.join(", "),
            placeholders.join(", ")
        );
        stmt
    }

    /// Single `UPDATE` applying every guarded assignment of `update` to the row
    /// of `job_id`. A guard that does not hold leaves its column unchanged.
    pub fn conditional_update(&self, job_id: &str, update: &ConditionalUpdate) -> Statement {
        let mut stmt = Statement::new(String::new());
        let mut sets = Vec::new();
        for assignment in update.assignments() {
            let column = self.ident(assignment.column.name());
            let condition = match &assignment.guard {
                Guard::IfNull => format!("{} IS NULL", column),
                Guard::IfStatusIn(states) => format!(
                    "{} IN ({})",
                    self.ident("status"),
                    Self::status_list(states)
                ),
            };
            let value = self.bind(&mut stmt, (&assignment.value).into());
            sets.push(format!(
                "{col} = CASE WHEN {cond} THEN {value} ELSE {col} END",
                col = column,
                cond = condition,
                value = value
            ));
        }
        sets.push(format!("{} = {}", self.ident("updatedAt"), self.now()));
        let job_id = self.bind(&mut stmt, SqlValue::Text(job_id.to_string()));

        stmt.sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            JOB_COMPLETIONS_TABLE,
            sets.join(", "),
            self.ident("jobId"),
            job_id
        );
        stmt
    }

    /// `SELECT` of whole records matching `filter`, oldest dispatch first.
    pub fn select_records(&self, filter: &RecordFilter) -> Statement {
        let mut stmt = Statement::new(String::new());
        let mut conditions = Vec::new();
        if let Some(job_id) = &filter.job_id {
            let p = self.bind(&mut stmt, SqlValue::Text(job_id.clone()));
            conditions.push(format!("{} = {}", self.ident("jobId"), p));
        }
        if let Some(job_name) = &filter.job_name {
            let p = self.bind(&mut stmt, SqlValue::Text(job_name.clone()));
            conditions.push(format!("{} = {}", self.ident("jobName"), p));
        }
        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                conditions.push("1 = 0".to_string());
            } else {
                conditions.push(format!(
                    "{} IN ({})",
                    self.ident("status"),
                    Self::status_list(statuses)
                ));
            }
        }
        if let Some(since) = filter.completed_since {
            let p = self.bind(&mut stmt, SqlValue::Timestamp(since));
            conditions.push(format!("{} >= {}", self.ident("completedAt"), p));
        }
        if filter.dequeued_only {
            conditions.push(format!("{} IS NOT NULL", self.ident("dequeuedAt")));
        }

        let columns = RECORD_COLUMNS
            .iter()
            .map(|c| self.ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {} FROM {}", columns, JOB_COMPLETIONS_TABLE);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {} ASC", self.ident("queuedAt")));
        stmt.sql = sql;
        stmt
    }

    /// One row: `queuedCount`, `runningCount`.
    pub fn current_jobs_status(&self) -> Statement {
        Statement::new(format!(
            "SELECT {} AS {}, {} AS {} FROM {} WHERE {} IN ({})",
            self.count_status(JobStatus::Queued),
            self.ident("queuedCount"),
            self.count_status(JobStatus::Running),
            self.ident("runningCount"),
            JOB_COMPLETIONS_TABLE,
            self.ident("status"),
            Self::status_list(JobStatus::ACTIVE)
        ))
    }

    /// One row: `completedJobs`, `percentSuccess`.
    pub fn completed_jobs(&self, window: TrailingWindow) -> Statement {
        let ratio = self.as_float(&format!(
            "{} * 1.0 / NULLIF(COUNT(*), 0)",
            self.count_status(JobStatus::Success)
        ));
        Statement::new(format!(
            "SELECT COUNT(*) AS {}, COALESCE({}, 1.0) AS {} FROM {} WHERE {} IS NOT NULL AND {}",
            self.ident("completedJobs"),
            ratio,
            self.ident("percentSuccess"),
            JOB_COMPLETIONS_TABLE,
            self.ident("completedAt"),
            self.within("completedAt", window)
        ))
    }

    /// One row: `avgRunTime`, `avgWaitTime`, both null over an empty set.
    pub fn jobs_timing(&self, window: TrailingWindow, job_name: Option<&str>) -> Statement {
        let mut stmt = Statement::new(String::new());
        let mut sql = format!(
            "SELECT AVG({}) AS {}, AVG({}) AS {} FROM {} WHERE {} IS NOT NULL AND {} IS NOT NULL AND {}",
            self.seconds_between("dequeuedAt", "completedAt"),
            self.ident("avgRunTime"),
            self.seconds_between("queuedAt", "dequeuedAt"),
            self.ident("avgWaitTime"),
            JOB_COMPLETIONS_TABLE,
            self.ident("completedAt"),
            self.ident("dequeuedAt"),
            self.within("completedAt", window)
        );
        if let Some(job_name) = job_name {
            let p = self.bind(&mut stmt, SqlValue::Text(job_name.to_string()));
            sql.push_str(&format!(" AND {} = {}", self.ident("jobName"), p));
        }
        stmt.sql = sql;
        stmt
    }
}

use super::models::{ConditionalUpdate, JobDispatch, JobRecord, JobStatus, RecordFilter};
use super::schema::JOB_STORE_VERSIONED_SCHEMAS;
use super::{JobRecordStore, SqlExecutor};
use crate::dialect::{DatabaseEngine, QueryBuilder, SqlValue, Statement};
use crate::error::{LedgerError, LedgerResult};
use crate::sqlite_persistence::{read_db_version, set_db_version, VersionedSchema};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSqlOutput, Type, Value};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(s.as_str().into()),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(b.as_slice().into()),
            SqlValue::Timestamp(ts) => ToSqlOutput::Owned(Value::Integer(ts.timestamp_millis())),
        })
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Integer(v) => SqlValue::Integer(v),
            Value::Real(v) => SqlValue::Real(v),
            Value::Text(s) => SqlValue::Text(s),
            Value::Blob(b) => SqlValue::Blob(b),
        }
    }
}

/// Job record store backed by a SQLite database.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
    engine: DatabaseEngine,
    queries: QueryBuilder,
}

impl SqliteJobStore {
    /// Opens the database at `db_path`, creating it with the latest schema or
    /// validating and migrating an existing one.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let mut conn = Connection::open(path).context("Failed to open job database")?;

        match read_db_version(&conn)? {
            None => {
                info!("Creating job completions table in {:?}", path);
                Self::latest_schema()?.create(&conn)?;
            }
            Some(db_version) => {
                let schema = JOB_STORE_VERSIONED_SCHEMAS
                    .iter()
                    .find(|s| s.version == db_version)
                    .with_context(|| format!("Unknown job database version {}", db_version))?;
                schema.validate(&conn).with_context(|| {
                    format!(
                        "Job database schema validation failed for version {}",
                        db_version
                    )
                })?;

                let current_version = Self::latest_schema()?.version;
                if db_version < current_version {
                    info!(
                        "Migrating job database from version {} to {}",
                        db_version, current_version
                    );
                    Self::migrate_if_needed(&mut conn, db_version)?;
                }
            }
        }

        Self::with_connection(conn)
    }

    /// Creates a store over a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::latest_schema()?.create(&conn)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let engine = DatabaseEngine::Sqlite;
        let queries = QueryBuilder::for_engine(&engine)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            engine,
            queries,
        })
    }

    fn latest_schema() -> Result<&'static VersionedSchema> {
        JOB_STORE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")
    }

    fn migrate_if_needed(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest_from = from_version;
        for schema in JOB_STORE_VERSIONED_SCHEMAS
            .iter()
            .filter(|s| s.version > from_version)
        {
            info!(
                "Running job database migration from version {} to {}",
                latest_from, schema.version
            );
            let Some(migration_fn) = schema.migration else {
                bail!("No migration defined to reach version {}", schema.version);
            };
            migration_fn(&tx).with_context(|| {
                format!("Failed to run migration to version {}", schema.version)
            })?;
            latest_from = schema.version;
        }
        set_db_version(&tx, latest_from)?;
        tx.commit()?;
        Ok(())
    }

    /// Drops the job completions table. The store is unusable afterwards
    /// until the database is reopened.
    pub fn revert(&self) -> Result<()> {
        let conn = self.lock().map_err(anyhow::Error::from)?;
        info!("Dropping job completions table");
        Self::latest_schema()?.revert(&conn)
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::StoreUnavailable("job database lock poisoned".to_string()))
    }

    fn timestamp(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Integer,
                format!("timestamp out of range: {}", millis).into(),
            )
        })
    }

    fn optional_timestamp(
        row: &rusqlite::Row,
        idx: usize,
    ) -> rusqlite::Result<Option<DateTime<Utc>>> {
        row.get::<_, Option<i64>>(idx)?
            .map(|millis| Self::timestamp(idx, millis))
            .transpose()
    }

    /// Column order follows the record column list of the query builder.
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let status_code: i64 = row.get(11)?;
        let status = JobStatus::from_i64(status_code).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                11,
                Type::Integer,
                format!("unknown job status {}", status_code).into(),
            )
        })?;

        Ok(JobRecord {
            id: row.get(0)?,
            job_id: row.get(1)?,
            job_name: row.get(2)?,
            queue_name: row.get(3)?,
            payload: row.get(4)?,
            max_retry_count: row.get(5)?,
            delay_until: Self::optional_timestamp(row, 6)?,
            queued_at: Self::timestamp(7, row.get(7)?)?,
            dequeued_at: Self::optional_timestamp(row, 8)?,
            completed_at: Self::optional_timestamp(row, 9)?,
            error_string: row.get(10)?,
            status,
            created_at: Self::optional_timestamp(row, 12)?,
            updated_at: Self::optional_timestamp(row, 13)?,
        })
    }

    fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}

impl SqlExecutor for SqliteJobStore {
    fn engine(&self) -> &DatabaseEngine {
        &self.engine
    }

    fn fetch_row(&self, statement: &Statement) -> LedgerResult<Vec<SqlValue>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&statement.sql)?;
        let column_count = stmt.column_count();
        let values = stmt.query_row(params_from_iter(statement.params.iter()), |row| {
            (0..column_count)
                .map(|idx| row.get::<_, Value>(idx).map(SqlValue::from))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(values)
    }

    fn execute(&self, statement: &Statement) -> LedgerResult<usize> {
        let conn = self.lock()?;
        let affected = conn.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
        Ok(affected)
    }
}

impl JobRecordStore for SqliteJobStore {
    fn insert(&self, dispatch: &JobDispatch) -> LedgerResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let statement = self.queries.insert_record(&id, dispatch);
        match self.execute(&statement) {
            Ok(_) => Ok(id),
            Err(LedgerError::Sqlite(e)) if Self::is_unique_violation(&e) => {
                Err(LedgerError::DuplicateJobId(dispatch.job_id.clone()))
            }
            Err(e) => Err(e),
        }
    }

    fn update_where(&self, job_id: &str, update: &ConditionalUpdate) -> LedgerResult<bool> {
        let statement = self.queries.conditional_update(job_id, update);
        Ok(self.execute(&statement)? > 0)
    }

    fn select(&self, filter: &RecordFilter) -> LedgerResult<Vec<JobRecord>> {
        let statement = self.queries.select_records(filter);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&statement.sql)?;
        let records = stmt
            .query_map(
                params_from_iter(statement.params.iter()),
                Self::row_to_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn sql_executor(&self) -> Option<&dyn SqlExecutor> {
        Some(self)
    }
}

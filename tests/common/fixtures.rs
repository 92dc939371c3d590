#![allow(dead_code)]

use super::DEFAULT_QUEUE;
use chrono::{DateTime, Duration, DurationRound, Utc};
use queues_db_hooks::job_store::JobDispatch;
use queues_db_hooks::{
    JobRecordStore, JobStats, LifecycleRecorder, MemoryJobStore, SqliteJobStore,
};
use std::sync::Arc;
use tempfile::TempDir;

/// A store plus the stats strategy under test.
pub struct TestBackend {
    pub name: &'static str,
    pub store: Arc<dyn JobRecordStore>,
    pub stats: JobStats,
    /// Millisecond-aligned reference time a few minutes in the past.
    pub base: DateTime<Utc>,
    _temp_dir: Option<TempDir>,
}

impl TestBackend {
    fn new(name: &'static str, store: Arc<dyn JobRecordStore>, stats: JobStats) -> Self {
        Self {
            name,
            store,
            stats,
            base: base_time(),
            _temp_dir: None,
        }
    }

    /// Wraps an existing store, aggregating in process.
    pub fn from_store(name: &'static str, store: Arc<dyn JobRecordStore>) -> Self {
        let stats = JobStats::in_process(store.clone());
        Self::new(name, store, stats)
    }

    pub fn recorder(&self) -> LifecycleRecorder {
        LifecycleRecorder::new(self.store.clone())
    }

    /// `base` shifted by `secs` seconds.
    pub fn at(&self, secs: i64) -> DateTime<Utc> {
        self.base + Duration::seconds(secs)
    }
}

fn base_time() -> DateTime<Utc> {
    let now = Utc::now() - Duration::minutes(5);
    now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now)
}

/// SQLite file store with SQL aggregation, the same store aggregated in
/// process, and the memory store.
pub fn backends() -> Vec<TestBackend> {
    let temp_dir = TempDir::new().unwrap();
    let sqlite: Arc<dyn JobRecordStore> =
        Arc::new(SqliteJobStore::new(temp_dir.path().join("jobs.db")).unwrap());
    let stats = JobStats::new(sqlite.clone()).unwrap();
    let mut sql = TestBackend::new("sqlite/sql", sqlite, stats);
    sql._temp_dir = Some(temp_dir);

    let sqlite_in_process: Arc<dyn JobRecordStore> = Arc::new(SqliteJobStore::in_memory().unwrap());
    let in_process = TestBackend::new(
        "sqlite/in-process",
        sqlite_in_process.clone(),
        JobStats::in_process(sqlite_in_process),
    );

    let memory: Arc<dyn JobRecordStore> = Arc::new(MemoryJobStore::new());
    let memory = TestBackend::new("memory", memory.clone(), JobStats::new(memory).unwrap());

    vec![sql, in_process, memory]
}

pub fn dispatch_at(job_id: &str, job_name: &str, queued_at: DateTime<Utc>) -> JobDispatch {
    JobDispatch {
        job_id: job_id.to_string(),
        job_name: job_name.to_string(),
        queue_name: DEFAULT_QUEUE.to_string(),
        payload: b"{}".to_vec(),
        max_retry_count: 0,
        delay_until: None,
        queued_at,
    }
}

//! End-to-end tests of the read path, run against every aggregation strategy.

mod common;

use chrono::Duration;
use common::{backends, dispatch_at, TestBackend, EPSILON, RESIZE_IMAGE, SEND_EMAIL};
use queues_db_hooks::dialect::{DatabaseEngine, SqlValue, Statement};
use queues_db_hooks::job_store::{
    ConditionalUpdate, JobDispatch, JobRecord, JobStatus, RecordFilter, SqlExecutor,
};
use queues_db_hooks::stats::{CompletedJobStatusResponse, JobsTimingResponse};
use queues_db_hooks::{JobRecordStore, JobStats, LedgerError, LedgerResult, SqliteJobStore};
use std::sync::Arc;

fn assert_close(actual: Option<f64>, expected: f64, context: &str) {
    match actual {
        Some(value) => assert!(
            (value - expected).abs() < EPSILON,
            "{}: expected {}, got {}",
            context,
            expected,
            value
        ),
        None => panic!("{}: expected {}, got None", context, expected),
    }
}

/// Records a job dispatched at the backend's reference time that waited `wait`
/// seconds and then ran `run` seconds.
fn finished_job(
    backend: &TestBackend,
    job_id: &str,
    job_name: &str,
    wait: i64,
    run: i64,
    error: Option<&str>,
) {
    let recorder = backend.recorder();
    recorder
        .record_dispatch(&dispatch_at(job_id, job_name, backend.at(0)))
        .unwrap();
    recorder.record_dequeue(job_id, backend.at(wait)).unwrap();
    recorder
        .record_completion(job_id, backend.at(wait + run), error.map(str::to_string))
        .unwrap();
}

#[test]
fn test_send_email_scenario() {
    for backend in backends() {
        let recorder = backend.recorder();
        let stats = &backend.stats;

        recorder
            .record_dispatch(&dispatch_at("J1", SEND_EMAIL, backend.at(0)))
            .unwrap();
        let current = stats.get_status_of_current_jobs().unwrap();
        assert_eq!((current.queued_count, current.running_count), (1, 0), "{}", backend.name);

        recorder.record_dequeue("J1", backend.at(5)).unwrap();
        assert_eq!(recorder.get_record("J1").unwrap().status, JobStatus::Running);
        let current = stats.get_status_of_current_jobs().unwrap();
        assert_eq!((current.queued_count, current.running_count), (0, 1), "{}", backend.name);

        recorder.record_completion("J1", backend.at(12), None).unwrap();
        let current = stats.get_status_of_current_jobs().unwrap();
        assert_eq!((current.queued_count, current.running_count), (0, 0), "{}", backend.name);

        let completed = stats.get_completed_jobs_for_time_period(1).unwrap();
        assert_eq!(
            completed,
            CompletedJobStatusResponse {
                completed_jobs: 1,
                percent_success: 1.0
            },
            "{}",
            backend.name
        );

        let timing = stats.get_timing_data_for_jobs(1, None).unwrap();
        assert_close(timing.avg_run_time, 7.0, backend.name);
        assert_close(timing.avg_wait_time, 5.0, backend.name);
    }
}

#[test]
fn test_empty_window_reports_full_success() {
    for backend in backends() {
        let recorder = backend.recorder();
        // Active jobs don't count as completed
        recorder
            .record_dispatch(&dispatch_at("queued", SEND_EMAIL, backend.at(0)))
            .unwrap();
        recorder
            .record_dispatch(&dispatch_at("running", SEND_EMAIL, backend.at(0)))
            .unwrap();
        recorder.record_dequeue("running", backend.at(1)).unwrap();

        let completed = backend.stats.get_completed_jobs_for_time_period(1).unwrap();
        assert_eq!(completed.completed_jobs, 0, "{}", backend.name);
        assert_eq!(completed.percent_success, 1.0, "{}", backend.name);
    }
}

#[test]
fn test_timing_is_null_without_finished_jobs() {
    for backend in backends() {
        let recorder = backend.recorder();
        recorder
            .record_dispatch(&dispatch_at("running", SEND_EMAIL, backend.at(0)))
            .unwrap();
        recorder.record_dequeue("running", backend.at(1)).unwrap();

        let timing = backend.stats.get_timing_data_for_jobs(1, None).unwrap();
        assert_eq!(
            timing,
            JobsTimingResponse {
                avg_run_time: None,
                avg_wait_time: None
            },
            "{}",
            backend.name
        );

        // Finished jobs exist, but none with this name
        finished_job(&backend, "other", RESIZE_IMAGE, 1, 2, None);
        let timing = backend
            .stats
            .get_timing_data_for_jobs(1, Some(SEND_EMAIL))
            .unwrap();
        assert_eq!(timing.avg_run_time, None, "{}", backend.name);
        assert_eq!(timing.avg_wait_time, None, "{}", backend.name);
    }
}

#[test]
fn test_success_rate_and_job_name_filter() {
    for backend in backends() {
        finished_job(&backend, "a", SEND_EMAIL, 2, 4, None);
        finished_job(&backend, "b", SEND_EMAIL, 4, 8, Some("bounced"));
        finished_job(&backend, "c", RESIZE_IMAGE, 1, 30, None);
        finished_job(&backend, "d", RESIZE_IMAGE, 3, 10, None);

        let completed = backend.stats.get_completed_jobs_for_time_period(1).unwrap();
        assert_eq!(completed.completed_jobs, 4, "{}", backend.name);
        assert_close(Some(completed.percent_success), 0.75, backend.name);

        let all = backend.stats.get_timing_data_for_jobs(1, None).unwrap();
        assert_close(all.avg_run_time, 13.0, backend.name);
        assert_close(all.avg_wait_time, 2.5, backend.name);

        let emails = backend
            .stats
            .get_timing_data_for_jobs(1, Some(SEND_EMAIL))
            .unwrap();
        assert_close(emails.avg_run_time, 6.0, backend.name);
        assert_close(emails.avg_wait_time, 3.0, backend.name);
    }
}

#[test]
fn test_millisecond_timings() {
    for backend in backends() {
        let recorder = backend.recorder();
        recorder
            .record_dispatch(&dispatch_at("J1", SEND_EMAIL, backend.at(0)))
            .unwrap();
        recorder
            .record_dequeue("J1", backend.at(0) + Duration::milliseconds(250))
            .unwrap();
        recorder
            .record_completion("J1", backend.at(1) + Duration::milliseconds(750), None)
            .unwrap();

        let timing = backend.stats.get_timing_data_for_jobs(1, None).unwrap();
        assert_close(timing.avg_run_time, 1.5, backend.name);
        assert_close(timing.avg_wait_time, 0.25, backend.name);
    }
}

#[test]
fn test_window_excludes_old_completions() {
    for backend in backends() {
        let recorder = backend.recorder();
        let long_ago = backend.base - Duration::hours(5);
        recorder
            .record_dispatch(&dispatch_at("old", SEND_EMAIL, long_ago))
            .unwrap();
        recorder
            .record_dequeue("old", long_ago + Duration::seconds(1))
            .unwrap();
        recorder
            .record_completion("old", long_ago + Duration::seconds(2), Some("x".to_string()))
            .unwrap();
        finished_job(&backend, "recent", SEND_EMAIL, 1, 1, None);

        let last_hour = backend.stats.get_completed_jobs_for_time_period(1).unwrap();
        assert_eq!(last_hour.completed_jobs, 1, "{}", backend.name);
        assert_eq!(last_hour.percent_success, 1.0, "{}", backend.name);

        let last_day = backend.stats.get_completed_jobs_for_time_period(24).unwrap();
        assert_eq!(last_day.completed_jobs, 2, "{}", backend.name);
        assert_close(Some(last_day.percent_success), 0.5, backend.name);

        let timing = backend.stats.get_timing_data_for_jobs(1, None).unwrap();
        assert_close(timing.avg_run_time, 1.0, backend.name);
    }
}

#[test]
fn test_widest_window_covers_everything_on_every_strategy() {
    let hours = u32::MAX as i64;
    for backend in backends() {
        let recorder = backend.recorder();
        let long_ago = backend.base - Duration::days(3650);
        recorder
            .record_dispatch(&dispatch_at("old", SEND_EMAIL, long_ago))
            .unwrap();
        recorder
            .record_completion("old", long_ago + Duration::seconds(4), Some("x".to_string()))
            .unwrap();
        finished_job(&backend, "recent", SEND_EMAIL, 1, 2, None);

        let completed = backend
            .stats
            .get_completed_jobs_for_time_period(hours)
            .unwrap();
        assert_eq!(completed.completed_jobs, 2, "{}", backend.name);
        assert_close(Some(completed.percent_success), 0.5, backend.name);

        let timing = backend.stats.get_timing_data_for_jobs(hours, None).unwrap();
        // The old job was never dequeued: no run time, 4s wait
        assert_close(timing.avg_run_time, 1.0, backend.name);
        assert_close(timing.avg_wait_time, 2.5, backend.name);
    }

    let store: Arc<dyn JobRecordStore> = Arc::new(SqliteJobStore::in_memory().unwrap());
    let sql = JobStats::new(store.clone()).unwrap();
    let in_process = JobStats::in_process(store);
    assert_eq!(
        sql.get_completed_jobs_for_time_period(hours).unwrap(),
        in_process.get_completed_jobs_for_time_period(hours).unwrap()
    );
    assert_eq!(
        sql.get_timing_data_for_jobs(hours, Some(SEND_EMAIL)).unwrap(),
        in_process.get_timing_data_for_jobs(hours, Some(SEND_EMAIL)).unwrap()
    );
}

#[test]
fn test_non_positive_hours_are_rejected() {
    for backend in backends() {
        for hours in [0, -1] {
            assert!(matches!(
                backend.stats.get_completed_jobs_for_time_period(hours),
                Err(LedgerError::InvalidArgument(_))
            ));
            assert!(matches!(
                backend.stats.get_timing_data_for_jobs(hours, Some(SEND_EMAIL)),
                Err(LedgerError::InvalidArgument(_))
            ));
        }
    }
}

#[test]
fn test_strategies_agree_on_same_data() {
    let store: Arc<dyn JobRecordStore> = Arc::new(SqliteJobStore::in_memory().unwrap());
    let backend = TestBackend::from_store("shared", store.clone());
    for (i, (wait, run)) in [(1, 3), (2, 7), (5, 11), (3, 2), (8, 1)].iter().enumerate() {
        let error = if i % 2 == 0 { None } else { Some("failed") };
        finished_job(&backend, &format!("job-{}", i), SEND_EMAIL, *wait, *run, error);
    }

    let sql = JobStats::new(store.clone()).unwrap();
    let in_process = JobStats::in_process(store);
    assert_eq!(sql.strategy_name(), "sql");
    assert_eq!(in_process.strategy_name(), "in-process");

    assert_eq!(
        sql.get_status_of_current_jobs().unwrap(),
        in_process.get_status_of_current_jobs().unwrap()
    );

    let (a, b) = (
        sql.get_completed_jobs_for_time_period(1).unwrap(),
        in_process.get_completed_jobs_for_time_period(1).unwrap(),
    );
    assert_eq!(a.completed_jobs, b.completed_jobs);
    assert_close(Some(a.percent_success), b.percent_success, "percent");

    let (a, b) = (
        sql.get_timing_data_for_jobs(1, None).unwrap(),
        in_process.get_timing_data_for_jobs(1, None).unwrap(),
    );
    assert_close(a.avg_run_time, 4.8, "sql run");
    assert_close(b.avg_run_time, 4.8, "in-process run");
    assert_close(a.avg_wait_time, 3.8, "sql wait");
    assert_close(b.avg_wait_time, 3.8, "in-process wait");
}

/// A store whose engine has no known dialect.
struct ForeignEngineStore {
    inner: SqliteJobStore,
    engine: DatabaseEngine,
}

impl SqlExecutor for ForeignEngineStore {
    fn engine(&self) -> &DatabaseEngine {
        &self.engine
    }

    fn fetch_row(&self, statement: &Statement) -> LedgerResult<Vec<SqlValue>> {
        self.inner.fetch_row(statement)
    }

    fn execute(&self, statement: &Statement) -> LedgerResult<usize> {
        self.inner.execute(statement)
    }
}

impl JobRecordStore for ForeignEngineStore {
    fn insert(&self, dispatch: &JobDispatch) -> LedgerResult<String> {
        self.inner.insert(dispatch)
    }

    fn update_where(&self, job_id: &str, update: &ConditionalUpdate) -> LedgerResult<bool> {
        self.inner.update_where(job_id, update)
    }

    fn select(&self, filter: &RecordFilter) -> LedgerResult<Vec<JobRecord>> {
        self.inner.select(filter)
    }

    fn sql_executor(&self) -> Option<&dyn SqlExecutor> {
        Some(self)
    }
}

#[test]
fn test_unknown_engine_is_unsupported_dialect() {
    let store = Arc::new(ForeignEngineStore {
        inner: SqliteJobStore::in_memory().unwrap(),
        engine: DatabaseEngine::Other("db2".to_string()),
    });
    match JobStats::new(store.clone()) {
        Err(err @ LedgerError::UnsupportedDialect(_)) => assert!(err.is_bad_request()),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("expected UnsupportedDialect"),
    }

    // The rows are still readable without the aggregate statements
    let stats = JobStats::in_process(store);
    assert_eq!(stats.get_status_of_current_jobs().unwrap().queued_count, 0);
}

//! SQLite schema definitions for the job completions table.
//!
//! Timestamps are stored as INTEGER unix epoch milliseconds, statuses as
//! INTEGER codes (see [`JobStatus::as_i64`](super::JobStatus::as_i64)).

use super::models::JOB_COMPLETIONS_TABLE;
use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, Index, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP_MILLIS,
};
use anyhow::Context;

// =============================================================================
// Version 1 - Historical layout
// =============================================================================

/// The first released layout: no queue name, no uniqueness on `jobId`, and
/// statuses encoded as 0 = queued, 1 = success, 2 = error.
const JOB_COMPLETIONS_TABLE_V1: Table = Table {
    name: JOB_COMPLETIONS_TABLE,
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true), // UUID
        sqlite_column!("jobId", &SqlType::Text, non_null = true),
        sqlite_column!("jobName", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Blob, non_null = true),
        sqlite_column!("maxRetryCount", &SqlType::Integer, non_null = true),
        sqlite_column!("delayUntil", &SqlType::Integer),
        sqlite_column!("queuedAt", &SqlType::Integer, non_null = true),
        sqlite_column!("dequeuedAt", &SqlType::Integer),
        sqlite_column!("completedAt", &SqlType::Integer),
        sqlite_column!("errorString", &SqlType::Text),
        sqlite_column!("status", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "createdAt",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP_MILLIS)
        ),
        sqlite_column!("updatedAt", &SqlType::Integer),
    ],
    indices: &[],
};

// =============================================================================
// Version 2 - Queue name, unique job ids, running status
// =============================================================================

const JOB_COMPLETIONS_TABLE_V2: Table = Table {
    name: JOB_COMPLETIONS_TABLE,
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true), // UUID
        sqlite_column!("jobId", &SqlType::Text, non_null = true),
        sqlite_column!("jobName", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Blob, non_null = true),
        sqlite_column!("maxRetryCount", &SqlType::Integer, non_null = true),
        sqlite_column!("delayUntil", &SqlType::Integer),
        sqlite_column!("queuedAt", &SqlType::Integer, non_null = true),
        sqlite_column!("dequeuedAt", &SqlType::Integer),
        sqlite_column!("completedAt", &SqlType::Integer),
        sqlite_column!("errorString", &SqlType::Text),
        sqlite_column!("status", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "createdAt",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP_MILLIS)
        ),
        sqlite_column!("updatedAt", &SqlType::Integer),
        // Appended by ALTER TABLE in the v1 -> v2 migration, hence last
        sqlite_column!(
            "queueName",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
    ],
    indices: &[
        Index {
            name: "idx_queue_job_completions_job_id",
            columns: "\"jobId\"",
            unique: true,
        },
        Index {
            name: "idx_queue_job_completions_status",
            columns: "\"status\"",
            unique: false,
        },
        Index {
            name: "idx_queue_job_completions_completed_at",
            columns: "\"completedAt\"",
            unique: false,
        },
    ],
};

/// Migration from version 1 to version 2: add `queueName`, shift the old
/// success/error codes past the new `running` code, enforce unique job ids.
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "ALTER TABLE _queue_job_completions ADD COLUMN \"queueName\" TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    conn.execute(
        "UPDATE _queue_job_completions SET \"status\" = \"status\" + 1 WHERE \"status\" >= 1",
        [],
    )?;
    for index in JOB_COMPLETIONS_TABLE_V2.indices {
        index
            .create(conn, JOB_COMPLETIONS_TABLE_V2.name)
            .with_context(|| {
                format!(
                    "Failed to create index {}; duplicate jobId rows must be removed before migrating",
                    index.name
                )
            })?;
    }
    Ok(())
}

// =============================================================================
// Versioned Schema Definition
// =============================================================================

/// All versioned schemas for the job completions database.
///
/// Version 1: Historical table
/// Version 2: queueName, unique jobId, running status, query indices
pub const JOB_STORE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[JOB_COMPLETIONS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[JOB_COMPLETIONS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_each_version_creates_and_validates() {
        for schema in JOB_STORE_VERSIONED_SCHEMAS {
            let conn = Connection::open_in_memory().unwrap();
            schema.create(&conn).unwrap();
            schema.validate(&conn).unwrap();
        }
    }

    #[test]
    fn test_v1_does_not_validate_as_v2() {
        let conn = Connection::open_in_memory().unwrap();
        JOB_STORE_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        assert!(JOB_STORE_VERSIONED_SCHEMAS[1].validate(&conn).is_err());
    }

    #[test]
    fn test_migration_v1_to_v2_remaps_statuses() {
        let conn = Connection::open_in_memory().unwrap();
        JOB_STORE_VERSIONED_SCHEMAS[0].create(&conn).unwrap();

        for (job_id, status) in [("queued", 0), ("succeeded", 1), ("failed", 2)] {
            conn.execute(
                "INSERT INTO _queue_job_completions (id, jobId, jobName, payload, maxRetryCount, queuedAt, status)
                 VALUES (?1, ?1, 'job', x'', 0, 0, ?2)",
                rusqlite::params![job_id, status],
            )
            .unwrap();
        }

        migrate_v1_to_v2(&conn).unwrap();
        JOB_STORE_VERSIONED_SCHEMAS[1].validate(&conn).unwrap();

        let status_of = |job_id: &str| -> i64 {
            conn.query_row(
                "SELECT status FROM _queue_job_completions WHERE jobId = ?1",
                [job_id],
                |r| r.get(0),
            )
            .unwrap()
        };
        assert_eq!(status_of("queued"), 0);
        assert_eq!(status_of("succeeded"), 2);
        assert_eq!(status_of("failed"), 3);

        let queue_name: String = conn
            .query_row(
                "SELECT queueName FROM _queue_job_completions WHERE jobId = 'queued'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(queue_name, "");
    }

    #[test]
    fn test_migration_v1_to_v2_fails_on_duplicate_job_ids() {
        let conn = Connection::open_in_memory().unwrap();
        JOB_STORE_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        for id in ["a", "b"] {
            conn.execute(
                "INSERT INTO _queue_job_completions (id, jobId, jobName, payload, maxRetryCount, queuedAt, status)
                 VALUES (?1, 'same', 'job', x'', 0, 0, 0)",
                [id],
            )
            .unwrap();
        }

        let err = migrate_v1_to_v2(&conn).unwrap_err();
        assert!(format!("{:#}", err).contains("duplicate jobId"));
    }

    #[test]
    fn test_unique_job_id_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        JOB_STORE_VERSIONED_SCHEMAS[1].create(&conn).unwrap();
        let insert = "INSERT INTO _queue_job_completions (id, jobId, jobName, payload, maxRetryCount, queuedAt, status)
                      VALUES (?1, 'same', 'job', x'', 0, 0, 0)";
        conn.execute(insert, ["a"]).unwrap();
        assert!(conn.execute(insert, ["b"]).is_err());
    }
}

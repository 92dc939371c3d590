//! Error type shared by the recorder, the stores and the stats queries.

use thiserror::Error;

/// Errors surfaced by job ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A dispatch was recorded for a job id that already has a record.
    #[error("Job {0} has already been dispatched")]
    DuplicateJobId(String),

    /// No record exists for the job id.
    #[error("No record for job {0}")]
    UnknownJobId(String),

    /// The store's database engine has no known SQL dialect.
    #[error("Unsupported database engine: {0}")]
    UnsupportedDialect(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The store could not be reached or returned something we could not use.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// Whether the error was caused by the caller rather than by the store,
    /// i.e. whether an HTTP layer should answer with a 4xx.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            LedgerError::UnsupportedDialect(_)
                | LedgerError::InvalidArgument(_)
                | LedgerError::UnknownJobId(_)
        )
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

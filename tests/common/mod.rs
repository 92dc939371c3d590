//! Common test infrastructure
//!
//! Every end-to-end test runs against each [`TestBackend`], so the SQL and the
//! in-process aggregation paths are held to the same expectations.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{backends, dispatch_at, SEND_EMAIL};
//!
//! #[test]
//! fn test_dispatch() {
//!     for backend in backends() {
//!         backend.recorder().record_dispatch(&dispatch_at("J1", SEND_EMAIL, backend.base)).unwrap();
//!     }
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
pub use fixtures::{backends, dispatch_at, TestBackend};

//! Shared test utilities for pcs-storage tests.
//!
//! This crate provides:
//! - [`TracingDocumentStore`]: In-memory document store with operation
//!   recording, failure injection and simulated lost races
//! - [`TestContext`]: A tenant wired to a container, ready to use
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use pcs_storage_test_utils::{TestContext, assert_conflict};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestContext::new();
//!     ctx.kv.create("rules", "r1", "v1").await.unwrap();
//!     assert_conflict(ctx.kv.create("rules", "r1", "v2").await);
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;
pub mod storage;

pub use assertions::*;
pub use fixtures::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pcs_storage_core=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

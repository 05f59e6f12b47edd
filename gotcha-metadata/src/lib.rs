//! Structured, serializable types that cross the process boundary for
//! `gotcha`: the JSON summary artifact, documented exit codes, and the
//! on-disk progress-cache schema.
//!
//! This crate has no logic beyond `serde` (de)serialization and is meant to
//! be cheap for external tooling to depend on without pulling in the runner
//! engine (`gotcha-runner`) or its concurrency stack.

mod cache_schema;
mod exit_codes;
mod summary;

pub use cache_schema::{CacheEntrySummary, CacheFileSummary, CachePackageEntry, CACHE_SCHEMA_VERSION};
pub use exit_codes::GotchaExitCode;
pub use summary::{
    PackageSummary, Status, SummaryDocument, TestResultSummary, SUMMARY_SCHEMA_VERSION,
};

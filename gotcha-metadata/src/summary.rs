use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::time::Duration;

/// The schema version for [`SummaryDocument`]'s JSON representation.
///
/// Bump this whenever a field is removed or its meaning changes in a way
/// that isn't additive.
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// The terminal status of a test or package, as it appears in a finished
/// [`SummaryDocument`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// Every leaf in the subtree passed or was skipped.
    Pass,
    /// At least one leaf in the subtree failed.
    Fail,
    /// The test or package was skipped and nothing under it failed.
    Skip,
    /// The run ended (stream closed, or cancellation) before a terminal
    /// event was observed; the status was inferred rather than reported.
    Unknown,
}

impl Status {
    /// Whether this status should count as a failure for exit-code purposes.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Fail)
    }
}

/// One test's row in the final summary.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct TestResultSummary {
    /// The package the test belongs to.
    pub package: SmolStr,
    /// The `/`-joined full test path, including any parent subtests.
    pub test: SmolStr,
    /// The terminal status.
    pub status: Status,
    /// Wall-clock duration of the test, if reported.
    pub duration: Option<Duration>,
    /// The reason given for a skip, if any.
    pub skip_reason: Option<SmolStr>,
    /// Up to 40 lines of captured output, preferring lines that look like
    /// error output (see the `error_heuristic` module in `gotcha-runner`).
    pub output_excerpt: Vec<String>,
}

/// One package's aggregate row in the final summary.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct PackageSummary {
    /// The canonical package (import path) name.
    pub name: SmolStr,
    /// The package's own aggregate status, by the parent-aggregation rule.
    pub status: Status,
    /// Count of passed tests in this package's subtree.
    pub passed: usize,
    /// Count of failed tests in this package's subtree.
    pub failed: usize,
    /// Count of skipped tests in this package's subtree.
    pub skipped: usize,
    /// The package's reported statement-coverage percentage, if any.
    pub coverage_percent: Option<f64>,
    /// Output not attributed to any specific test: build failures, bare
    /// `FAIL`/`ok` lines, stray panics before the first `run` event.
    pub output_excerpt: Vec<String>,
}

/// The immutable, serializable final result of a run.
///
/// Produced once by the summary builder after the event stream closes (or
/// cancellation drains), and consumed identically by every report emitter
/// and by the progress cache's post-run write.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct SummaryDocument {
    /// Schema version of this document; consumers should reject summaries
    /// whose version they don't recognize rather than guess at field
    /// meaning.
    pub schema_version: u32,
    /// Failed tests, sorted by `(package, test)` lexicographic order.
    pub failed: Vec<TestResultSummary>,
    /// Skipped tests, in first-seen order.
    pub skipped: Vec<TestResultSummary>,
    /// Passed tests, in first-seen order.
    pub passed: Vec<TestResultSummary>,
    /// Per-package aggregates, in first-seen package order.
    pub packages: Vec<PackageSummary>,
    /// Total wall-clock elapsed time for the run.
    pub elapsed: Duration,
    /// The arithmetic mean of per-package coverage percentages, formatted
    /// to one decimal, over packages that reported coverage. Absent if no
    /// package reported coverage.
    pub coverage_percent: Option<String>,
    /// When the summary was produced.
    pub timestamp: DateTime<FixedOffset>,
    /// The cache fingerprint this run was estimated against, if any.
    pub source_fingerprint: Option<u64>,
    /// True if the run was cancelled by the user before the stream closed.
    pub aborted: bool,
    /// The process exit code this run produced.
    pub exit_code: i32,
}

impl SummaryDocument {
    /// Total passed + failed + skipped across all packages.
    pub fn total(&self) -> usize {
        self.passed.len() + self.failed.len() + self.skipped.len()
    }
}

/// Path conventions for `gotcha`'s output artifacts, kept here so external
/// tooling and the runner agree on where things land without depending on
/// `gotcha-runner`.
#[derive(Clone, Debug, Default)]
pub struct ArtifactPaths {
    /// Markdown report path, if requested.
    pub markdown: Option<Utf8PathBuf>,
    /// CI-comment report path, if requested.
    pub ci_comment: Option<Utf8PathBuf>,
    /// Raw JSON event passthrough path, if requested.
    pub json_passthrough: Option<Utf8PathBuf>,
}

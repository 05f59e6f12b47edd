//! The summary builder (spec.md §4.7, component C7).
//!
//! A pure function from the final [`RunState`] to an immutable
//! [`SummaryDocument`], invoked exactly once after the event stream closes
//! (or a cancellation finishes draining). Every report emitter and the
//! cache store's post-run write consume this value, never the live state.

use chrono::{DateTime, FixedOffset, Utc};
use gotcha_metadata::{PackageSummary, Status, SummaryDocument, TestResultSummary, SUMMARY_SCHEMA_VERSION};
use smol_str::SmolStr;
use std::time::Duration;

use crate::error_heuristic::select_excerpt;
use crate::state::{NodeStatus, PackageResult, RunState, TestNode};

const OUTPUT_EXCERPT_MAX_LINES: usize = 40;

fn to_status(status: NodeStatus) -> Status {
    match status {
        NodeStatus::Pass => Status::Pass,
        NodeStatus::Fail => Status::Fail,
        // Unknown tests never got a terminal signal at all; they're
        // neither a reported pass nor a reported failure, so they land in
        // the same bucket as a skip rather than inventing a fourth list
        // `SummaryDocument` doesn't have room for (see DESIGN.md).
        NodeStatus::Skip | NodeStatus::Unknown => Status::Skip,
        NodeStatus::Pending | NodeStatus::Running => {
            debug_assert!(false, "summary built from non-terminal node");
            Status::Skip
        }
    }
}

/// Flatten one test (and every nested subtest) into result rows, in
/// first-seen (`seq`) order, parent before children.
fn flatten_node(package: &SmolStr, prefix: &str, node: &TestNode, out: &mut Vec<(u64, TestResultSummary)>) {
    let full_name = node.full_name(prefix);
    let row = TestResultSummary {
        package: package.clone(),
        test: full_name.clone(),
        status: to_status(node.status),
        duration: node.elapsed.map(Duration::from_secs_f64),
        skip_reason: node.skip_reason.clone(),
        output_excerpt: select_excerpt(&node.output.lines(), OUTPUT_EXCERPT_MAX_LINES),
    };
    out.push((node.seq, row));

    let mut children: Vec<&TestNode> = node.children.values().collect();
    children.sort_by_key(|c| c.seq);
    for child in children {
        flatten_node(package, &full_name, child, out);
    }
}

fn flatten_package(package: &PackageResult) -> Vec<TestResultSummary> {
    let mut rows = Vec::new();
    let mut tests: Vec<&TestNode> = package.tests.values().collect();
    tests.sort_by_key(|t| t.seq);
    for test in tests {
        flatten_node(&package.name, "", test, &mut rows);
    }
    rows.into_iter().map(|(_, row)| row).collect()
}

fn package_summary(package: &PackageResult) -> PackageSummary {
    let (passed, failed, skipped, unknown) = package.leaf_counts();
    PackageSummary {
        name: package.name.clone(),
        status: to_package_status(package.status),
        passed,
        failed,
        // Unknown leaves fold into the skipped bucket at the aggregate
        // level too, for the same reason as `to_status` above.
        skipped: skipped + unknown,
        coverage_percent: package.coverage_percent,
        output_excerpt: select_excerpt(&package.package_output.lines(), OUTPUT_EXCERPT_MAX_LINES),
    }
}

fn to_package_status(status: NodeStatus) -> Status {
    match status {
        NodeStatus::Pass => Status::Pass,
        NodeStatus::Fail => Status::Fail,
        NodeStatus::Skip => Status::Skip,
        NodeStatus::Unknown => Status::Unknown,
        NodeStatus::Pending | NodeStatus::Running => {
            debug_assert!(false, "summary built from non-finalized package");
            Status::Unknown
        }
    }
}

/// Build the immutable [`SummaryDocument`] from a finalized [`RunState`]
/// (spec.md §4.7).
///
/// `state` must already have had [`RunState::finalize`] (or
/// [`crate::state::Reconstructor::into_state`]) called on it, so every
/// node carries a terminal status.
pub fn build_summary(
    state: &RunState,
    elapsed: Duration,
    aborted: bool,
    exit_code: i32,
    source_fingerprint: Option<u64>,
) -> SummaryDocument {
    let mut failed = Vec::new();
    let mut skipped = Vec::new();
    let mut passed = Vec::new();
    let mut packages = Vec::new();

    for package in state.packages.values() {
        packages.push(package_summary(package));
        for row in flatten_package(package) {
            match row.status {
                Status::Fail => failed.push(row),
                Status::Pass => passed.push(row),
                Status::Skip | Status::Unknown => skipped.push(row),
            }
        }
    }

    // Failures sort lexicographically by (package, test); passes and
    // skips keep first-seen order, which `flatten_package`'s seq-ordered
    // walk (outer loop over `packages` in first-seen order too) already
    // produced.
    failed.sort_by(|a, b| (a.package.as_str(), a.test.as_str()).cmp(&(b.package.as_str(), b.test.as_str())));

    let coverage_values: Vec<f64> = packages.iter().filter_map(|p| p.coverage_percent).collect();
    let coverage_percent = if coverage_values.is_empty() {
        None
    } else {
        let mean = coverage_values.iter().sum::<f64>() / coverage_values.len() as f64;
        Some(format!("{mean:.1}%"))
    };

    let timestamp: DateTime<FixedOffset> = Utc::now().into();

    SummaryDocument {
        schema_version: SUMMARY_SCHEMA_VERSION,
        failed,
        skipped,
        passed,
        packages,
        elapsed,
        coverage_percent,
        timestamp,
        source_fingerprint,
        aborted,
        exit_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Action, Event};
    use crate::state::Reconstructor;

    fn ev(action: Action, package: Option<&str>, test: Option<&str>, elapsed: Option<f64>) -> Event {
        Event {
            seq: 0,
            timestamp: Utc::now().fixed_offset(),
            action,
            package: package.map(SmolStr::new),
            test: test.map(SmolStr::new),
            elapsed,
            output: None,
            skip_reason: None,
        }
    }

    #[test]
    fn subtest_rollup_lists_both_parent_and_child_as_failed() {
        let mut r = Reconstructor::new(4096);
        r.apply(ev(Action::Run, Some("p"), Some("TestX"), None));
        r.apply(ev(Action::Run, Some("p"), Some("TestX/sub1"), None));
        r.apply(ev(Action::Pass, Some("p"), Some("TestX/sub1"), Some(0.02)));
        r.apply(ev(Action::Run, Some("p"), Some("TestX/sub2"), None));
        r.apply(ev(Action::Fail, Some("p"), Some("TestX/sub2"), Some(0.03)));
        r.apply(ev(Action::Fail, Some("p"), Some("TestX"), Some(0.05)));
        let state = r.into_state();

        let summary = build_summary(&state, Duration::from_secs(1), false, 1, None);
        let failed_names: Vec<&str> = summary.failed.iter().map(|t| t.test.as_str()).collect();
        assert!(failed_names.contains(&"TestX"));
        assert!(failed_names.contains(&"TestX/sub2"));
        assert!(!failed_names.contains(&"TestX/sub1"));
    }

    #[test]
    fn coverage_is_averaged_across_reporting_packages() {
        let mut r = Reconstructor::new(4096);
        r.apply(ev(Action::PackageStart, Some("a"), None, None));
        r.apply(Event {
            output: Some("coverage: 80.0% of statements".to_string()),
            ..ev(Action::Output, Some("a"), None, None)
        });
        r.apply(ev(Action::PackageEnd, Some("a"), None, None));
        r.apply(ev(Action::PackageStart, Some("b"), None, None));
        r.apply(Event {
            output: Some("coverage: 60.0% of statements".to_string()),
            ..ev(Action::Output, Some("b"), None, None)
        });
        r.apply(ev(Action::PackageEnd, Some("b"), None, None));
        let state = r.into_state();

        let summary = build_summary(&state, Duration::from_secs(1), false, 0, None);
        assert_eq!(summary.coverage_percent.as_deref(), Some("70.0%"));
    }

    #[test]
    fn empty_run_produces_zero_counts_and_skip_package() {
        let mut r = Reconstructor::new(1024);
        r.apply(ev(Action::PackageStart, Some("p"), None, None));
        r.apply(Event {
            output: Some("no test files\n".to_string()),
            ..ev(Action::PackageEnd, Some("p"), None, None)
        });
        let state = r.into_state();

        let summary = build_summary(&state, Duration::from_secs(1), false, 0, None);
        assert_eq!(summary.total(), 0);
        assert_eq!(summary.packages.len(), 1);
        assert_eq!(summary.packages[0].status, Status::Skip);
    }
}

//! The console emitter (spec.md §4.8): reprints per-test lines in final
//! order plus a boxed summary, for the non-interactive stdout report every
//! run produces at the end regardless of format.

use gotcha_metadata::{Status, SummaryDocument, TestResultSummary};
use std::fmt::Write as _;

fn status_symbol(status: Status) -> &'static str {
    match status {
        Status::Pass => "✓",
        Status::Fail => "✗",
        Status::Skip => "~",
        Status::Unknown => "?",
    }
}

fn write_test_line(out: &mut String, test: &TestResultSummary) {
    let duration = test
        .duration
        .map(|d| format!(" ({:.2}s)", d.as_secs_f64()))
        .unwrap_or_default();
    let _ = writeln!(out, "  {} {}::{}{}", status_symbol(test.status), test.package, test.test, duration);
    if test.status == Status::Fail {
        for line in &test.output_excerpt {
            let _ = writeln!(out, "      {line}");
        }
    }
}

/// Render the final console report: failed tests, then skipped, then
/// passed (the order `SummaryDocument`'s fields are already in), followed
/// by a boxed count/coverage/elapsed summary.
pub fn render(summary: &SummaryDocument) -> String {
    let mut out = String::new();

    for test in &summary.failed {
        write_test_line(&mut out, test);
    }
    for test in &summary.skipped {
        write_test_line(&mut out, test);
    }
    for test in &summary.passed {
        write_test_line(&mut out, test);
    }

    out.push('\n');
    let _ = writeln!(out, "┌─────────────────────────────────────────┐");
    let _ = writeln!(
        out,
        "│ {} passed, {} failed, {} skipped, {} total │",
        summary.passed.len(),
        summary.failed.len(),
        summary.skipped.len(),
        summary.total(),
    );
    let _ = writeln!(out, "│ elapsed: {:.2}s{}", summary.elapsed.as_secs_f64(), {
        match &summary.coverage_percent {
            Some(pct) => format!(", coverage: {pct}"),
            None => String::new(),
        }
    });
    let _ = writeln!(out, "└─────────────────────────────────────────┘");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotcha_metadata::SUMMARY_SCHEMA_VERSION;
    use std::time::Duration;

    fn empty_summary() -> SummaryDocument {
        SummaryDocument {
            schema_version: SUMMARY_SCHEMA_VERSION,
            failed: vec![],
            skipped: vec![],
            passed: vec![],
            packages: vec![],
            elapsed: Duration::from_secs(0),
            coverage_percent: None,
            timestamp: chrono::Utc::now().into(),
            source_fingerprint: None,
            aborted: false,
            exit_code: 0,
        }
    }

    #[test]
    fn renders_deterministically_for_the_same_summary() {
        let summary = empty_summary();
        assert_eq!(render(&summary), render(&summary));
    }

    #[test]
    fn reports_zero_counts_for_empty_run() {
        let rendered = render(&empty_summary());
        assert!(rendered.contains("0 passed, 0 failed, 0 skipped, 0 total"));
    }
}

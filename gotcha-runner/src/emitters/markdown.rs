//! The markdown emitter (spec.md §4.8).
//!
//! A pure function of `(SummaryDocument, ReportContext)`. Above
//! `passed_listing_threshold` passed tests, switches to the hybrid
//! strategy: list tests from changed packages individually, list the
//! top-K slowest tests, and fall back to a package-level aggregate table
//! for everything else.

use super::ReportContext;
use gotcha_metadata::{PackageSummary, Status, SummaryDocument, TestResultSummary};
use std::fmt::Write as _;

/// Render the markdown artifact for `summary`, per `ctx`.
pub fn render(summary: &SummaryDocument, ctx: &ReportContext) -> String {
    let mut out = String::new();
    write_header(&mut out, summary, ctx);
    write_failed_section(&mut out, summary);
    write_skipped_section(&mut out, summary);
    write_passed_section(&mut out, summary, ctx);
    out
}

fn write_header(out: &mut String, summary: &SummaryDocument, ctx: &ReportContext) {
    let _ = writeln!(out, "<!-- summary-uuid: {} -->", ctx.marker);
    let badge = if summary.failed.is_empty() { "✅ passing" } else { "❌ failing" };
    let _ = writeln!(out, "## Test results: {badge}");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} passed, {} failed, {} skipped ({} total) in {:.2}s",
        summary.passed.len(),
        summary.failed.len(),
        summary.skipped.len(),
        summary.total(),
        summary.elapsed.as_secs_f64(),
    );
    if let Some(coverage) = &summary.coverage_percent {
        let _ = writeln!(out, "Coverage: {coverage}");
    }
    let _ = writeln!(out);
}

fn write_test_row(out: &mut String, test: &TestResultSummary, with_output: bool) {
    let duration = test.duration.map(|d| format!("{:.2}s", d.as_secs_f64())).unwrap_or_default();
    let _ = writeln!(out, "- `{}::{}` ({duration})", test.package, test.test);
    if with_output && !test.output_excerpt.is_empty() {
        let _ = writeln!(out, "  ```");
        for line in &test.output_excerpt {
            let _ = writeln!(out, "  {line}");
        }
        let _ = writeln!(out, "  ```");
    }
}

fn write_failed_section(out: &mut String, summary: &SummaryDocument) {
    if summary.failed.is_empty() {
        return;
    }
    let _ = writeln!(out, "### Failed ({})", summary.failed.len());
    for test in &summary.failed {
        write_test_row(out, test, true);
    }
    let _ = writeln!(out);
}

fn write_skipped_section(out: &mut String, summary: &SummaryDocument) {
    if summary.skipped.is_empty() {
        return;
    }
    let _ = writeln!(out, "<details><summary>Skipped ({})</summary>", summary.skipped.len());
    let _ = writeln!(out);
    for test in &summary.skipped {
        write_test_row(out, test, false);
    }
    let _ = writeln!(out, "</details>");
    let _ = writeln!(out);
}

fn write_passed_section(out: &mut String, summary: &SummaryDocument, ctx: &ReportContext) {
    if summary.passed.is_empty() {
        return;
    }
    let _ = writeln!(out, "<details><summary>Passed ({})</summary>", summary.passed.len());
    let _ = writeln!(out);

    if summary.passed.len() <= ctx.passed_listing_threshold {
        for test in &summary.passed {
            write_test_row(out, test, false);
        }
    } else {
        write_hybrid_passed(out, summary, ctx);
    }

    let _ = writeln!(out, "</details>");
    let _ = writeln!(out);
}

/// spec.md §4.8's hybrid strategy: changed-package tests individually, the
/// slowest K overall, and a package aggregate table for the rest.
fn write_hybrid_passed(out: &mut String, summary: &SummaryDocument, ctx: &ReportContext) {
    let changed: Vec<&TestResultSummary> = summary
        .passed
        .iter()
        .filter(|t| ctx.changed_packages.iter().any(|p| p == &t.package))
        .collect();

    if !changed.is_empty() {
        let _ = writeln!(out, "**Tests from changed packages:**");
        for test in &changed {
            write_test_row(out, test, false);
        }
        let _ = writeln!(out);
    }

    let mut by_duration: Vec<&TestResultSummary> = summary.passed.iter().collect();
    by_duration.sort_by(|a, b| b.duration.unwrap_or_default().cmp(&a.duration.unwrap_or_default()));
    let slowest: Vec<&TestResultSummary> = by_duration.into_iter().take(ctx.slowest_top_k).collect();

    if !slowest.is_empty() {
        let _ = writeln!(out, "**Slowest tests:**");
        for test in &slowest {
            write_test_row(out, test, false);
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "**By package:**");
    let _ = writeln!(out);
    write_package_table(out, &summary.packages, true);
}

fn write_package_table(out: &mut String, packages: &[PackageSummary], with_coverage: bool) {
    if with_coverage {
        let _ = writeln!(out, "| Package | Passed | Failed | Skipped | Coverage |");
        let _ = writeln!(out, "|---|---|---|---|---|");
    } else {
        let _ = writeln!(out, "| Package | Passed | Failed | Skipped |");
        let _ = writeln!(out, "|---|---|---|---|");
    }
    for pkg in packages {
        let status_icon = match pkg.status {
            Status::Fail => "❌",
            Status::Pass => "✅",
            Status::Skip | Status::Unknown => "➖",
        };
        if with_coverage {
            let coverage = pkg.coverage_percent.map(|c| format!("{c:.1}%")).unwrap_or_default();
            let _ = writeln!(
                out,
                "| {status_icon} {} | {} | {} | {} | {coverage} |",
                pkg.name, pkg.passed, pkg.failed, pkg.skipped
            );
        } else {
            let _ = writeln!(
                out,
                "| {status_icon} {} | {} | {} | {} |",
                pkg.name, pkg.passed, pkg.failed, pkg.skipped
            );
        }
    }
}

pub(super) use write_package_table as package_table;

#[cfg(test)]
mod tests {
    use super::*;
    use gotcha_metadata::SUMMARY_SCHEMA_VERSION;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn marker() -> super::super::SummaryMarker {
        super::super::SummaryMarker::from_untyped_uuid(uuid_for_tests())
    }

    fn uuid_for_tests() -> newtype_uuid::Uuid {
        newtype_uuid::Uuid::parse_str("00000000-0000-4000-8000-000000000000").unwrap()
    }

    fn summary_with(failed: usize, passed: usize) -> SummaryDocument {
        SummaryDocument {
            schema_version: SUMMARY_SCHEMA_VERSION,
            failed: (0..failed)
                .map(|i| test_row("pkg", &format!("TestFail{i}"), Status::Fail))
                .collect(),
            skipped: vec![],
            passed: (0..passed)
                .map(|i| test_row("pkg", &format!("TestPass{i}"), Status::Pass))
                .collect(),
            packages: vec![PackageSummary {
                name: "pkg".into(),
                status: if failed > 0 { Status::Fail } else { Status::Pass },
                passed,
                failed,
                skipped: 0,
                coverage_percent: Some(70.0),
                output_excerpt: vec![],
            }],
            elapsed: Duration::from_secs(5),
            coverage_percent: Some("70.0%".into()),
            timestamp: chrono::Utc::now().into(),
            source_fingerprint: None,
            aborted: false,
            exit_code: if failed > 0 { 1 } else { 0 },
        }
    }

    fn test_row(package: &str, name: &str, status: Status) -> TestResultSummary {
        TestResultSummary {
            package: package.into(),
            test: name.into(),
            status,
            duration: Some(Duration::from_millis(10)),
            skip_reason: None,
            output_excerpt: vec!["boom".to_string()],
        }
    }

    #[test]
    fn embeds_uuid_marker_on_first_line() {
        let summary = summary_with(1, 1);
        let ctx = ReportContext::new(marker());
        let rendered = render(&summary, &ctx);
        assert!(rendered.lines().next().unwrap().starts_with("<!-- summary-uuid:"));
    }

    #[test]
    fn switches_to_hybrid_view_above_threshold() {
        let summary = summary_with(0, 150);
        let mut ctx = ReportContext::new(marker());
        ctx.passed_listing_threshold = 100;
        let rendered = render(&summary, &ctx);
        assert!(rendered.contains("**By package:**"));
        assert!(!rendered.contains("TestPass149"));
    }

    #[test]
    fn lists_all_passed_tests_under_threshold() {
        let summary = summary_with(0, 5);
        let ctx = ReportContext::new(marker());
        let rendered = render(&summary, &ctx);
        assert!(rendered.contains("TestPass4"));
        assert!(!rendered.contains("**By package:**"));
    }

    #[test]
    fn idempotent_for_the_same_summary_and_context() {
        let summary = summary_with(2, 150);
        let ctx = ReportContext::new(marker());
        assert_eq!(render(&summary, &ctx), render(&summary, &ctx));
    }
}

//! The CI-comment emitter (spec.md §4.8): a markdown body constrained to a
//! hard byte budget, because most CI platforms reject or silently truncate
//! oversized PR comments. Degrades through a fixed order until the budget
//! is met rather than truncating mid-render.

use super::{markdown, ReportContext};
use gotcha_metadata::{SummaryDocument, TestResultSummary};
use std::fmt::Write as _;

/// Render the CI-comment artifact for `summary`, never exceeding
/// `ctx.ci_comment_byte_budget` bytes.
///
/// Degrades in this order until the body fits: (1) drop the passed-test
/// listing down to the package table, (2) drop per-package coverage
/// figures, (3) truncate failed-test output excerpts to a single line,
/// (4) drop the skipped-test table entirely. The header (badge, counts,
/// UUID marker) is never dropped.
pub fn render(summary: &SummaryDocument, ctx: &ReportContext) -> String {
    for degradation in 0..=4 {
        let body = render_at(summary, ctx, degradation);
        if body.len() <= ctx.ci_comment_byte_budget || degradation == 4 {
            return body;
        }
    }
    unreachable!("loop always returns by degradation == 4")
}

fn render_at(summary: &SummaryDocument, ctx: &ReportContext, degradation: u8) -> String {
    let mut out = String::new();
    write_header(&mut out, summary, ctx);
    write_failed_section(&mut out, summary, degradation >= 3);
    if degradation < 4 {
        write_skipped_section(&mut out, summary);
    }
    if degradation < 1 {
        write_passed_section(&mut out, summary, ctx);
    } else {
        let _ = writeln!(out, "<details><summary>Passed ({})</summary>", summary.passed.len());
        let _ = writeln!(out);
        markdown::package_table(&mut out, &summary.packages, degradation < 2);
        let _ = writeln!(out, "</details>");
    }
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
    let _ = writeln!(out);
}

fn write_test_row(out: &mut String, test: &TestResultSummary, truncate_output: bool) {
    let duration = test.duration.map(|d| format!("{:.2}s", d.as_secs_f64())).unwrap_or_default();
    let _ = writeln!(out, "- `{}::{}` ({duration})", test.package, test.test);
    if !test.output_excerpt.is_empty() {
        let lines: &[String] = if truncate_output { &test.output_excerpt[..1] } else { &test.output_excerpt };
        let _ = writeln!(out, "  ```");
        for line in lines {
            let _ = writeln!(out, "  {line}");
        }
        let _ = writeln!(out, "  ```");
    }
}

fn write_failed_section(out: &mut String, summary: &SummaryDocument, truncate_output: bool) {
    if summary.failed.is_empty() {
        return;
    }
    let _ = writeln!(out, "### Failed ({})", summary.failed.len());
    for test in &summary.failed {
        write_test_row(out, test, truncate_output);
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
        write_test_row(out, test, true);
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
            write_test_row(out, test, true);
        }
    } else {
        markdown::package_table(out, &summary.packages, true);
    }
    let _ = writeln!(out, "</details>");
    let _ = writeln!(out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotcha_metadata::{Status, SUMMARY_SCHEMA_VERSION};
    use std::time::Duration;

    fn marker() -> super::super::SummaryMarker {
        super::super::SummaryMarker::from_untyped_uuid(
            newtype_uuid::Uuid::parse_str("00000000-0000-4000-8000-000000000000").unwrap(),
        )
    }

    fn summary_with_many_failures(n: usize) -> SummaryDocument {
        SummaryDocument {
            schema_version: SUMMARY_SCHEMA_VERSION,
            failed: (0..n)
                .map(|i| TestResultSummary {
                    package: "pkg".into(),
                    test: format!("TestFail{i}").into(),
                    status: Status::Fail,
                    duration: Some(Duration::from_millis(10)),
                    skip_reason: None,
                    output_excerpt: vec!["line one".into(), "line two".into(), "line three".into()],
                })
                .collect(),
            skipped: vec![],
            passed: vec![],
            packages: vec![PackageSummary {
                name: "pkg".into(),
                status: Status::Fail,
                passed: 0,
                failed: n,
                skipped: 0,
                coverage_percent: Some(50.0),
                output_excerpt: vec![],
            }],
            elapsed: Duration::from_secs(1),
            coverage_percent: Some("50.0%".into()),
            timestamp: chrono::Utc::now().into(),
            source_fingerprint: None,
            aborted: false,
            exit_code: 1,
        }
    }

    #[test]
    fn never_exceeds_the_byte_budget_when_degradation_is_available() {
        let summary = summary_with_many_failures(500);
        let mut ctx = ReportContext::new(marker());
        ctx.ci_comment_byte_budget = 4096;
        let rendered = render(&summary, &ctx);
        assert!(rendered.len() <= 4096, "rendered {} bytes", rendered.len());
    }

    #[test]
    fn always_keeps_the_header_even_past_budget() {
        let summary = summary_with_many_failures(5000);
        let mut ctx = ReportContext::new(marker());
        ctx.ci_comment_byte_budget = 10;
        let rendered = render(&summary, &ctx);
        assert!(rendered.starts_with("<!-- summary-uuid:"));
    }

    #[test]
    fn fits_under_generous_budget_without_degrading() {
        let summary = summary_with_many_failures(1);
        let ctx = ReportContext::new(marker());
        let rendered = render(&summary, &ctx);
        assert!(rendered.contains("line three"));
    }
}

//! The "does this line look like an error" heuristic shared by the summary
//! builder (spec.md §4.7) and the report emitters (spec.md §4.8) for
//! trimming a failed test's captured output down to the lines worth
//! showing.

const MARKERS: &[&str] = &[
    "panic:",
    "--- FAIL",
    "FAIL\t",
    "Error:",
    "error:",
    "goroutine ",
    "assertion failed",
    "expected:",
    "actual:",
];

fn looks_like_error(line: &str) -> bool {
    MARKERS.iter().any(|marker| line.contains(marker))
}

/// Select up to `max` lines from `lines` for a failed test's output
/// excerpt, per spec.md §4.7: "up to 40 lines, preferring lines matching
/// the error heuristic".
///
/// Error-flagged lines are kept first in their original order; if there's
/// room left, the excerpt is filled out with the tail of the remaining
/// (non-flagged) lines so surrounding context survives truncation too.
pub fn select_excerpt(lines: &[String], max: usize) -> Vec<String> {
    if lines.len() <= max {
        return lines.to_vec();
    }

    let (flagged, rest): (Vec<&String>, Vec<&String>) =
        lines.iter().partition(|line| looks_like_error(line));

    if flagged.len() >= max {
        return flagged.into_iter().take(max).cloned().collect();
    }

    let remaining = max - flagged.len();
    let mut excerpt: Vec<String> = flagged.into_iter().cloned().collect();
    excerpt.extend(rest.into_iter().rev().take(remaining).rev().cloned());
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_is_returned_unchanged() {
        let lines = vec!["a".to_string(), "b".to_string()];
        assert_eq!(select_excerpt(&lines, 40), lines);
    }

    #[test]
    fn error_lines_are_preferred_over_truncation() {
        let mut lines: Vec<String> = (0..100).map(|i| format!("noise {i}")).collect();
        lines.push("panic: boom".to_string());
        let excerpt = select_excerpt(&lines, 5);
        assert!(excerpt.iter().any(|l| l.contains("panic: boom")));
        assert_eq!(excerpt.len(), 5);
    }
}

//! The state reconstructor (spec.md §3/§4.2, component C2).
//!
//! `T_reconstruct` is the sole owner of a [`RunState`]: every decoded
//! [`Event`](crate::event::Event) folds into it one at a time, in order, and
//! each fold produces a [`StateDelta`] snapshot cheap enough to push to the
//! UI on every event without cloning the whole tree.

mod reconstructor;
mod tree;

pub use reconstructor::Reconstructor;
pub use tree::{NodeStatus, OutputBuffer, TestNode};

use indexmap::IndexMap;
use smol_str::SmolStr;

/// Run-wide counts, recomputed incrementally as terminal events land.
///
/// Cheap to copy; this is what the progress estimator and the TUI header
/// actually read on every tick.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counters {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unknown: usize,
    pub running: usize,
}

impl Counters {
    pub fn total_terminal(&self) -> usize {
        self.passed + self.failed + self.skipped + self.unknown
    }
}

/// One Go package's tests and aggregate status.
#[derive(Clone, Debug)]
pub struct PackageResult {
    pub name: SmolStr,
    pub status: NodeStatus,
    /// Top-level tests, each possibly with nested subtests.
    pub tests: IndexMap<SmolStr, TestNode>,
    /// Output not attributed to any specific test: build failures, package
    /// setup/teardown output, stray panics before the first `run` event.
    pub package_output: OutputBuffer,
    pub coverage_percent: Option<f64>,
    pub started: bool,
    pub ended: bool,
    pub elapsed: Option<f64>,
    pub seq: u64,
}

impl PackageResult {
    fn new(name: SmolStr, seq: u64, output_cap: usize) -> Self {
        Self {
            name,
            status: NodeStatus::Pending,
            tests: IndexMap::new(),
            package_output: OutputBuffer::new(output_cap),
            coverage_percent: None,
            started: false,
            ended: false,
            elapsed: None,
            seq,
        }
    }

    /// Counts across every test in this package's subtree, `(passed,
    /// failed, skipped, unknown)`.
    pub fn leaf_counts(&self) -> (usize, usize, usize, usize) {
        self.tests.values().fold((0, 0, 0, 0), |acc, t| {
            let (p, f, s, u) = t.leaf_counts();
            (acc.0 + p, acc.1 + f, acc.2 + s, acc.3 + u)
        })
    }

    fn recompute_status(&mut self) {
        if self.tests.is_empty() {
            return;
        }
        if self.tests.values().any(|t| t.status == NodeStatus::Fail) {
            self.status = NodeStatus::Fail;
            return;
        }
        let all_resolved = self
            .tests
            .values()
            .all(|t| matches!(t.status, NodeStatus::Pass | NodeStatus::Skip));
        if all_resolved {
            self.status = NodeStatus::Pass;
        }
    }

    /// Infer a terminal status for a package whose stream closed before an
    /// explicit `package-end`/build-failure event arrived (spec.md §4.2):
    /// any failing test makes it a failure; a started-but-empty package (a
    /// build failure with no tests ever run) is a failure; otherwise an
    /// all-pass-or-skip package is a pass, and a package that produced no
    /// signal at all falls back to skip.
    fn finalize(&mut self) {
        for test in self.tests.values_mut() {
            test.finalize_incomplete();
        }
        if self.status.is_terminal() {
            return;
        }
        self.recompute_status();
        if self.status.is_terminal() {
            return;
        }
        self.status = if self.tests.is_empty() && self.started {
            NodeStatus::Fail
        } else {
            NodeStatus::Skip
        };
    }
}

/// A coverage sample reported on a package's summary line (spec.md §4.2,
/// `coverage: NN.N% of statements`).
const COVERAGE_LINE_PATTERN: &str = r"coverage:\s*(\d+(?:\.\d+)?)%\s+of\s+statements";

/// Parse a `go test` coverage summary line, returning the percentage if the
/// line matches.
pub fn parse_coverage_line(line: &str) -> Option<f64> {
    // A tiny hand-rolled scan rather than pulling `regex` into the hot
    // per-line output path: the pattern is fixed and anchoring it to
    // `coverage:` first avoids matching overhead on every other line.
    let idx = line.find("coverage:")?;
    let rest = &line[idx + "coverage:".len()..];
    let rest = rest.trim_start();
    let digits_end = rest.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let number = &rest[..digits_end];
    let after = rest[digits_end..].trim_start();
    if !after.starts_with('%') {
        return None;
    }
    let after = after[1..].trim_start();
    if !after.starts_with("of statements") {
        return None;
    }
    number.parse::<f64>().ok()
}

/// The full state of one run, owned exclusively by `T_reconstruct`.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    pub packages: IndexMap<SmolStr, PackageResult>,
    pub counters: Counters,
    seq: u64,
}

/// A cheap-to-clone snapshot of what changed after folding one event,
/// pushed to the UI over the coalescing `ch_ui` channel (spec.md §5: "the
/// UI always renders the latest state, never a backlog of deltas").
#[derive(Clone, Debug)]
pub struct StateDelta {
    pub counters: Counters,
    pub last_package: Option<SmolStr>,
    pub last_test: Option<SmolStr>,
    pub last_output_line: Option<String>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    fn package_mut(&mut self, name: &SmolStr, output_cap: usize) -> &mut PackageResult {
        if !self.packages.contains_key(name) {
            self.seq += 1;
            self.packages
                .insert(name.clone(), PackageResult::new(name.clone(), self.seq, output_cap));
        }
        self.packages.get_mut(name).expect("just inserted")
    }

    /// Finalize every package whose stream never reached a terminal status
    /// (spec.md §4.2's "package lifecycle inference on stream close"),
    /// called once after the event stream ends or a cancellation drains.
    pub fn finalize(&mut self) {
        for package in self.packages.values_mut() {
            package.finalize();
        }
        self.recount();
    }

    /// Recompute `counters` from scratch over every package's leaf tests.
    /// Cheap enough to call after every terminal-affecting fold; avoids the
    /// bookkeeping risk of incrementally tracking four separate counters in
    /// lockstep with tree mutation.
    fn recount(&mut self) {
        let mut counters = Counters::default();
        for package in self.packages.values() {
            let (passed, failed, skipped, unknown) = package.leaf_counts();
            counters.passed += passed;
            counters.failed += failed;
            counters.skipped += skipped;
            counters.unknown += unknown;
        }
        let running = self
            .packages
            .values()
            .flat_map(|p| p.tests.values())
            .filter(|t| matches!(t.status, NodeStatus::Running))
            .count();
        counters.running = running;
        self.counters = counters;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_strategy::proptest;

    #[test]
    fn coverage_line_parses_percentage() {
        assert_eq!(
            parse_coverage_line("coverage: 83.4% of statements"),
            Some(83.4)
        );
        assert_eq!(parse_coverage_line("coverage: 100% of statements"), Some(100.0));
        assert_eq!(parse_coverage_line("PASS"), None);
        assert_eq!(parse_coverage_line("coverage: 1% of statements in ./..."), None);
    }

    #[test]
    fn finalize_empty_started_package_counts_as_failed() {
        let mut state = RunState::new();
        let pkg = state.package_mut(&SmolStr::new("p"), 1024);
        pkg.started = true;
        state.finalize();
        assert_eq!(state.packages["p"].status, NodeStatus::Fail);
    }

    #[test]
    fn finalize_untouched_package_falls_back_to_skip() {
        let mut state = RunState::new();
        let _ = state.package_mut(&SmolStr::new("p"), 1024);
        state.finalize();
        assert_eq!(state.packages["p"].status, NodeStatus::Skip);
    }

    /// spec.md §3's aggregation invariant, exercised over every reachable
    /// combination of child statuses rather than the handful of fixed
    /// cases above: fail dominates, pass-or-skip-everywhere aggregates to
    /// pass, and anything else (a pending/running/unknown child still in
    /// the mix) leaves the package's own status untouched.
    #[proptest(cases = 64)]
    fn recompute_status_matches_the_aggregation_invariant(
        #[strategy(prop::collection::vec(any::<NodeStatus>(), 0..8))] child_statuses: Vec<NodeStatus>,
    ) {
        let mut pkg = PackageResult::new(SmolStr::new("p"), 0, 1024);
        for (i, status) in child_statuses.iter().enumerate() {
            let mut node = TestNode::new(SmolStr::new(format!("T{i}")), i as u64, 1024);
            node.status = *status;
            pkg.tests.insert(node.name.clone(), node);
        }

        pkg.recompute_status();

        if child_statuses.is_empty() {
            prop_assert_eq!(pkg.status, NodeStatus::Pending);
        } else if child_statuses.contains(&NodeStatus::Fail) {
            prop_assert_eq!(pkg.status, NodeStatus::Fail);
        } else if child_statuses
            .iter()
            .all(|s| matches!(s, NodeStatus::Pass | NodeStatus::Skip))
        {
            prop_assert_eq!(pkg.status, NodeStatus::Pass);
        } else {
            prop_assert_eq!(pkg.status, NodeStatus::Pending);
        }
    }

    #[test]
    fn recount_reflects_leaf_status_across_packages() {
        let mut state = RunState::new();
        {
            let pkg = state.package_mut(&SmolStr::new("p"), 1024);
            pkg.tests.insert(
                SmolStr::new("TestA"),
                {
                    let mut n = TestNode::new(SmolStr::new("TestA"), 0, 1024);
                    n.status = NodeStatus::Pass;
                    n
                },
            );
        }
        state.recount();
        assert_eq!(state.counters.passed, 1);
        assert_eq!(state.counters.failed, 0);
    }
}

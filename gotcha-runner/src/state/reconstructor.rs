//! The event-to-state fold (spec.md §4.2).

use super::tree::NodeStatus;
use super::{parse_coverage_line, RunState, StateDelta};
use crate::event::{Action, Event};
use smol_str::SmolStr;

/// Owns a [`RunState`] and folds decoded events into it one at a time.
///
/// This is the only writer of `RunState`; everything downstream (the TUI,
/// the summary builder) only ever reads a [`StateDelta`] snapshot or the
/// final state after [`RunState::finalize`].
pub struct Reconstructor {
    state: RunState,
    output_cap: usize,
}

impl Reconstructor {
    pub fn new(output_cap: usize) -> Self {
        Self {
            state: RunState::new(),
            output_cap,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn into_state(mut self) -> RunState {
        self.state.finalize();
        self.state
    }

    /// Fold one event into the state, returning a snapshot of what changed.
    pub fn apply(&mut self, event: Event) -> StateDelta {
        let Some(package_name) = event.package.clone() else {
            return self.delta(None, event.test, event.output);
        };

        match &event.action {
            Action::PackageStart => {
                let pkg = self.state.package_mut(&package_name, self.output_cap);
                pkg.started = true;
            }
            Action::PackageEnd => {
                self.apply_package_end(&package_name, &event);
            }
            Action::Run => {
                self.apply_test_lifecycle(&package_name, event.test.as_deref(), |test| {
                    test.mark_running();
                });
                self.mark_package_started(&package_name);
            }
            Action::Pause | Action::Cont => {
                // No state change beyond having already marked the test
                // running on its `run` event; these exist for observers
                // that care about scheduling, which this reconstructor
                // doesn't model.
            }
            Action::Output => {
                if let Some(text) = &event.output {
                    if let Some(pct) = parse_coverage_line(text) {
                        let pkg = self.state.package_mut(&package_name, self.output_cap);
                        pkg.coverage_percent = Some(pct);
                    }
                    match event.test.as_deref() {
                        Some(_) => {
                            self.apply_test_lifecycle(&package_name, event.test.as_deref(), |test| {
                                test.append_output(text);
                            });
                        }
                        None => {
                            let pkg = self.state.package_mut(&package_name, self.output_cap);
                            pkg.package_output.push(text);
                        }
                    }
                }
                self.mark_package_started(&package_name);
            }
            Action::Pass | Action::Fail | Action::Skip => {
                let status = match &event.action {
                    Action::Pass => NodeStatus::Pass,
                    Action::Fail => NodeStatus::Fail,
                    Action::Skip => NodeStatus::Skip,
                    _ => unreachable!(),
                };
                let skip_reason = event.skip_reason.clone();
                let elapsed = event.elapsed;
                self.apply_test_lifecycle(&package_name, event.test.as_deref(), move |test| {
                    test.apply_terminal(status, elapsed, skip_reason.clone());
                });
                self.propagate_package_status(&package_name);
            }
            Action::Bench => {
                // Benchmarks report through the same pass/fail/output
                // actions in go test -json; nothing extra to special-case.
            }
            Action::RawOutput => {
                let pkg = self.state.package_mut(&package_name, self.output_cap);
                if let Some(text) = &event.output {
                    match event.test.as_deref() {
                        Some(name) => {
                            if let Some(test) = pkg.tests.get_mut(name) {
                                test.append_output(text);
                            } else {
                                pkg.package_output.push(text);
                            }
                        }
                        None => pkg.package_output.push(text),
                    }
                }
            }
            Action::Truncated { original_len } => {
                let pkg = self.state.package_mut(&package_name, self.output_cap);
                pkg.package_output
                    .push(&format!("[line truncated, {original_len} bytes]\n"));
            }
            Action::Unknown(_) => {
                // Counted for observability only; no state mutation.
            }
        }

        self.state.recount();
        self.delta(Some(package_name), event.test, event.output)
    }

    fn mark_package_started(&mut self, package_name: &SmolStr) {
        let pkg = self.state.package_mut(package_name, self.output_cap);
        pkg.started = true;
    }

    /// Walk (creating as needed) the `/`-split subtest path for `test`
    /// under `package_name`, then apply `f` to the leaf node.
    fn apply_test_lifecycle(
        &mut self,
        package_name: &SmolStr,
        test: Option<&str>,
        f: impl FnOnce(&mut super::TestNode),
    ) {
        let Some(test) = test else { return };
        let output_cap = self.output_cap;
        let pkg = self.state.package_mut(package_name, output_cap);
        pkg.started = true;

        let mut segments = test.split('/');
        let top = segments.next().expect("split always yields at least one segment");

        let next_seq = pkg.tests.len() as u64;
        let node = pkg
            .tests
            .entry(SmolStr::new(top))
            .or_insert_with(|| super::TestNode::new(SmolStr::new(top), next_seq, output_cap));

        let mut current = node;
        for segment in segments {
            let next_seq = current.children.len() as u64;
            current = current
                .children
                .entry(SmolStr::new(segment))
                .or_insert_with(|| super::TestNode::new(SmolStr::new(segment), next_seq, output_cap));
        }
        f(current);
    }

    fn apply_package_end(&mut self, package_name: &SmolStr, event: &Event) {
        let pkg = self.state.package_mut(package_name, self.output_cap);
        pkg.ended = true;
        pkg.elapsed = event.elapsed.or(pkg.elapsed);
        pkg.finalize();
    }

    /// Re-run a package's status aggregation after a test's terminal status
    /// changed underneath it.
    fn propagate_package_status(&mut self, package_name: &SmolStr) {
        let pkg = self.state.package_mut(package_name, self.output_cap);
        for test in pkg.tests.values_mut() {
            test.recompute_from_children();
        }
        pkg.recompute_status();
    }

    fn delta(
        &self,
        package: Option<SmolStr>,
        test: Option<SmolStr>,
        output: Option<String>,
    ) -> StateDelta {
        StateDelta {
            counters: self.state.counters,
            last_package: package,
            last_test: test,
            last_output_line: output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Action;
    use chrono::Utc;

    fn ev(action: Action, package: Option<&str>, test: Option<&str>) -> Event {
        Event {
            seq: 0,
            timestamp: Utc::now().fixed_offset(),
            action,
            package: package.map(SmolStr::new),
            test: test.map(SmolStr::new),
            elapsed: None,
            output: None,
            skip_reason: None,
        }
    }

    #[test]
    fn run_then_pass_resolves_test_to_pass() {
        let mut r = Reconstructor::new(1024);
        r.apply(ev(Action::Run, Some("p"), Some("TestA")));
        r.apply(ev(Action::Pass, Some("p"), Some("TestA")));
        let state = r.into_state();
        assert_eq!(state.packages["p"].tests["TestA"].status, NodeStatus::Pass);
        assert_eq!(state.counters.passed, 1);
    }

    #[test]
    fn subtest_path_creates_nested_nodes() {
        let mut r = Reconstructor::new(1024);
        r.apply(ev(Action::Run, Some("p"), Some("TestA/sub1")));
        r.apply(ev(Action::Fail, Some("p"), Some("TestA/sub1")));
        let state = r.into_state();
        let top = &state.packages["p"].tests["TestA"];
        assert_eq!(top.children["sub1"].status, NodeStatus::Fail);
        assert_eq!(top.status, NodeStatus::Fail);
    }

    #[test]
    fn subtest_failure_propagates_to_package_status() {
        let mut r = Reconstructor::new(1024);
        r.apply(ev(Action::Run, Some("p"), Some("TestA")));
        r.apply(ev(Action::Run, Some("p"), Some("TestA/sub1")));
        r.apply(ev(Action::Fail, Some("p"), Some("TestA/sub1")));
        r.apply(ev(Action::Fail, Some("p"), Some("TestA")));
        let state = r.into_state();
        assert_eq!(state.packages["p"].status, NodeStatus::Fail);
    }

    #[test]
    fn package_end_without_any_test_infers_skip() {
        let mut r = Reconstructor::new(1024);
        r.apply(ev(Action::PackageStart, Some("p"), None));
        r.apply(ev(Action::PackageEnd, Some("p"), None));
        let state = r.into_state();
        assert_eq!(state.packages["p"].status, NodeStatus::Skip);
    }

    #[test]
    fn stream_close_without_package_end_still_finalizes() {
        let mut r = Reconstructor::new(1024);
        r.apply(ev(Action::Run, Some("p"), Some("TestA")));
        let state = r.into_state();
        assert_eq!(state.packages["p"].tests["TestA"].status, NodeStatus::Unknown);
        assert_eq!(state.packages["p"].status, NodeStatus::Skip);
    }
}

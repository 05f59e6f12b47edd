//! The per-test status tree (spec.md §3, component C2).
//!
//! A [`TestNode`] is Go's `/`-separated subtest hierarchy made explicit:
//! `TestA/sub1/sub2` creates three nodes, each keyed by its own path segment
//! under its parent. Status flows down from wire events and back up through
//! aggregation, per the invariant spec.md states outright: a parent is
//! `pass` only if every child is `pass` or `skip`, and `fail` if any child
//! is `fail`.

use indexmap::IndexMap;
use smol_str::SmolStr;

/// The status of a single node in the test tree.
///
/// `Pending` and `Running` are pre-terminal; the other four are terminal
/// and participate in the idempotent-merge and aggregation rules below.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum NodeStatus {
    Pending,
    Running,
    Pass,
    Fail,
    Skip,
    Unknown,
}

impl NodeStatus {
    /// Ordering used to resolve duplicate or conflicting terminal reports:
    /// higher rank wins. Pre-terminal statuses always lose to a terminal
    /// one; among terminal statuses, `Fail` dominates `Pass`/`Skip` (which
    /// are considered equally "good" per the aggregation invariant), and
    /// `Unknown` is the weakest terminal status, used only as an inferred
    /// fallback.
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 0,
            Self::Unknown => 1,
            Self::Pass | Self::Skip => 2,
            Self::Fail => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Skip | Self::Unknown)
    }
}

/// Resolve a duplicate or conflicting status report: keep whichever has the
/// higher rank, preferring `current` on a tie (spec.md §4.2: "a second
/// terminal event of equal or weaker status is ignored").
fn merge_status(current: NodeStatus, incoming: NodeStatus) -> NodeStatus {
    if incoming.rank() > current.rank() {
        incoming
    } else {
        current
    }
}

/// A ring-bounded capture of a test's combined stdout lines.
///
/// Once `cap` bytes have been buffered, further pushes drop the oldest
/// bytes to make room, and `elided` records how many bytes have been lost so
/// the final report can say so rather than silently showing a partial tail.
#[derive(Clone, Debug)]
pub struct OutputBuffer {
    cap: usize,
    data: Vec<u8>,
    elided: usize,
}

impl OutputBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            data: Vec::new(),
            elided: 0,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.data.extend_from_slice(text.as_bytes());
        if self.data.len() > self.cap {
            let overflow = self.data.len() - self.cap;
            self.elided += overflow;
            self.data.drain(0..overflow);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.elided == 0
    }

    /// Render as UTF-8 lines, prefixed with an elision marker if bytes were
    /// dropped from the front.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.elided > 0 {
            lines.push(format!("… {} bytes elided …", self.elided));
        }
        let text = String::from_utf8_lossy(&self.data);
        lines.extend(text.lines().map(str::to_owned));
        lines
    }
}

/// One node in the test tree: either a package-level test, or a subtest
/// reached by splitting a `Test` field on `/`.
#[derive(Clone, Debug)]
pub struct TestNode {
    pub name: SmolStr,
    pub status: NodeStatus,
    pub elapsed: Option<f64>,
    pub skip_reason: Option<SmolStr>,
    pub output: OutputBuffer,
    pub children: IndexMap<SmolStr, TestNode>,
    /// First-seen order among its siblings; used to keep report ordering
    /// stable without re-sorting by name.
    pub seq: u64,
}

impl TestNode {
    pub fn new(name: SmolStr, seq: u64, output_cap: usize) -> Self {
        Self {
            name,
            status: NodeStatus::Pending,
            elapsed: None,
            skip_reason: None,
            output: OutputBuffer::new(output_cap),
            children: IndexMap::new(),
            seq,
        }
    }

    pub fn mark_running(&mut self) {
        if matches!(self.status, NodeStatus::Pending) {
            self.status = NodeStatus::Running;
        }
    }

    pub fn append_output(&mut self, text: &str) {
        self.mark_running();
        self.output.push(text);
    }

    /// Apply a terminal wire event (pass/fail/skip) to this exact node,
    /// idempotently.
    pub fn apply_terminal(
        &mut self,
        incoming: NodeStatus,
        elapsed: Option<f64>,
        skip_reason: Option<SmolStr>,
    ) {
        debug_assert!(incoming.is_terminal());
        self.status = merge_status(self.status, incoming);
        if elapsed.is_some() {
            self.elapsed = elapsed;
        }
        if skip_reason.is_some() {
            self.skip_reason = skip_reason;
        }
    }

    /// Recompute this node's status from its children's current statuses,
    /// per the aggregation invariant, merging the result into whatever
    /// status this node already carries.
    ///
    /// Returns `true` if the node's status changed, so callers can decide
    /// whether to keep propagating the recomputation upward.
    pub fn recompute_from_children(&mut self) -> bool {
        let Some(aggregate) = Self::child_aggregate(&self.children) else {
            return false;
        };
        let before = self.status;
        self.status = merge_status(self.status, aggregate);
        self.status != before
    }

    fn child_aggregate(children: &IndexMap<SmolStr, TestNode>) -> Option<NodeStatus> {
        if children.is_empty() {
            return None;
        }
        if children.values().any(|c| c.status == NodeStatus::Fail) {
            return Some(NodeStatus::Fail);
        }
        let all_resolved = children
            .values()
            .all(|c| matches!(c.status, NodeStatus::Pass | NodeStatus::Skip));
        if all_resolved {
            return Some(NodeStatus::Pass);
        }
        None
    }

    /// Force every still-pending/running node in this subtree to a terminal
    /// status, bottom-up, for use when the stream closes with the tree
    /// incomplete (spec.md §4.2's "package lifecycle inference on stream
    /// close", generalized to any abandoned subtree).
    pub fn finalize_incomplete(&mut self) {
        for child in self.children.values_mut() {
            child.finalize_incomplete();
        }
        if !self.status.is_terminal() {
            self.status = Self::child_aggregate(&self.children).unwrap_or(NodeStatus::Unknown);
        }
    }

    /// Counts of terminal leaf descendants (nodes with no children) by
    /// status `(passed, failed, skipped, unknown)`, used to build
    /// package-level counters without double-counting wrapper nodes.
    pub fn leaf_counts(&self) -> (usize, usize, usize, usize) {
        if self.children.is_empty() {
            return match self.status {
                NodeStatus::Pass => (1, 0, 0, 0),
                NodeStatus::Fail => (0, 1, 0, 0),
                NodeStatus::Skip => (0, 0, 1, 0),
                NodeStatus::Unknown => (0, 0, 0, 1),
                NodeStatus::Pending | NodeStatus::Running => (0, 0, 0, 0),
            };
        }
        self.children.values().fold((0, 0, 0, 0), |acc, child| {
            let (p, f, s, u) = child.leaf_counts();
            (acc.0 + p, acc.1 + f, acc.2 + s, acc.3 + u)
        })
    }

    /// The full `/`-joined path from this node down, given its own
    /// ancestor-joined prefix.
    pub fn full_name(&self, prefix: &str) -> SmolStr {
        if prefix.is_empty() {
            self.name.clone()
        } else {
            SmolStr::new(format!("{prefix}/{}", self.name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(status: NodeStatus) -> TestNode {
        let mut node = TestNode::new("leaf".into(), 0, 1024);
        node.status = status;
        node
    }

    #[test]
    fn duplicate_weaker_terminal_is_ignored() {
        let mut node = TestNode::new("T".into(), 0, 1024);
        node.apply_terminal(NodeStatus::Fail, Some(0.1), None);
        node.apply_terminal(NodeStatus::Pass, Some(0.2), None);
        assert_eq!(node.status, NodeStatus::Fail);
    }

    #[test]
    fn stronger_terminal_overrides_weaker() {
        let mut node = TestNode::new("T".into(), 0, 1024);
        node.apply_terminal(NodeStatus::Pass, Some(0.1), None);
        node.apply_terminal(NodeStatus::Fail, Some(0.2), None);
        assert_eq!(node.status, NodeStatus::Fail);
    }

    #[test]
    fn parent_passes_only_if_every_child_passes_or_skips() {
        let mut parent = TestNode::new("T".into(), 0, 1024);
        parent.children.insert("sub1".into(), leaf(NodeStatus::Pass));
        parent.children.insert("sub2".into(), leaf(NodeStatus::Skip));
        assert!(parent.recompute_from_children());
        assert_eq!(parent.status, NodeStatus::Pass);
    }

    #[test]
    fn parent_fails_if_any_child_fails() {
        let mut parent = TestNode::new("T".into(), 0, 1024);
        parent.children.insert("sub1".into(), leaf(NodeStatus::Pass));
        parent.children.insert("sub2".into(), leaf(NodeStatus::Fail));
        assert!(parent.recompute_from_children());
        assert_eq!(parent.status, NodeStatus::Fail);
    }

    #[test]
    fn incomplete_children_do_not_force_a_parent_status() {
        let mut parent = TestNode::new("T".into(), 0, 1024);
        parent.children.insert("sub1".into(), leaf(NodeStatus::Pass));
        parent.children.insert("sub2".into(), TestNode::new("sub2".into(), 1, 1024));
        assert!(!parent.recompute_from_children());
        assert_eq!(parent.status, NodeStatus::Pending);
    }

    #[test]
    fn finalize_incomplete_infers_unknown_for_untouched_leaf() {
        let mut node = TestNode::new("T".into(), 0, 1024);
        node.finalize_incomplete();
        assert_eq!(node.status, NodeStatus::Unknown);
    }

    #[test]
    fn finalize_incomplete_propagates_fail_bottom_up() {
        let mut parent = TestNode::new("T".into(), 0, 1024);
        parent.children.insert("sub1".into(), leaf(NodeStatus::Fail));
        parent.finalize_incomplete();
        assert_eq!(parent.status, NodeStatus::Fail);
    }

    #[test]
    fn output_buffer_elides_oldest_bytes_once_over_capacity() {
        let mut buf = OutputBuffer::new(8);
        buf.push("abcdefgh");
        buf.push("ij");
        let lines = buf.lines();
        assert_eq!(lines[0], "… 2 bytes elided …");
        assert_eq!(lines[1], "cdefghij");
    }

    #[test]
    fn leaf_counts_do_not_double_count_wrapper_nodes() {
        let mut parent = TestNode::new("T".into(), 0, 1024);
        parent.children.insert("sub1".into(), leaf(NodeStatus::Pass));
        parent.children.insert("sub2".into(), leaf(NodeStatus::Fail));
        parent.recompute_from_children();
        assert_eq!(parent.leaf_counts(), (1, 1, 0, 0));
    }

    #[test]
    fn leaf_counts_tally_unknown_separately() {
        let node = leaf(NodeStatus::Unknown);
        assert_eq!(node.leaf_counts(), (0, 0, 0, 1));
    }
}

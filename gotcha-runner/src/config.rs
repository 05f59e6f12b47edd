//! The configuration record that crosses the boundary from the collaborator
//! CLI layer into the core (spec.md §6).
//!
//! `RunConfig` is constructed once by `gotcha` (or any other caller) and
//! treated as immutable for the duration of a run (spec.md §9): nothing in
//! this crate mutates it, and nothing re-reads environment variables or
//! files after it's built.

use camino::Utf8PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// Which per-test lines the TUI/console should print once a test reaches a
/// terminal state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ShowFilter {
    All,
    #[default]
    Failed,
    Passed,
    Skipped,
    None,
}

/// How much detail to print per test.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Verbosity {
    Minimal,
    #[default]
    Standard,
    WithOutput,
    Verbose,
}

/// The final-report format the orchestrator should drive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ReportFormat {
    #[default]
    Terminal,
    Markdown,
    Json,
    Github,
}

/// A pre-detected color profile, injected rather than probed (spec.md
/// §4.5: "the TUI never probes environment directly").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ColorProfile {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorProfile {
    /// Resolve against a pre-computed "does the terminal support color"
    /// bit, collapsing `Auto` into a concrete yes/no. Called once at TUI
    /// construction, never per-render.
    pub fn resolve(self, terminal_supports_color: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => terminal_supports_color,
        }
    }
}

/// A cooperative cancellation signal shared between the TUI, the
/// supervisor, and the reconstructor.
///
/// Backed by a `tokio::sync::watch` channel rather than a dedicated crate:
/// the set of observers is small and fixed (spec.md §5's four long-lived
/// tasks), and `watch` gives every observer an independent
/// "has this fired yet" view without needing a broadcast channel's buffer
/// management.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    tx: watch::Sender<bool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// True if `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` is called; resolves immediately if it
    /// already has been.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        // `changed` only errors if every sender is dropped, which can't
        // happen here since `self` holds one.
        let _ = rx.changed().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The full configuration record for a single run (spec.md §6).
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// The import-path pattern(s) passed to the underlying toolchain, e.g.
    /// `./...`.
    pub test_path: String,
    /// Specific packages to restrict the run to; empty means "whatever
    /// `test_path` resolves to".
    pub packages: Vec<String>,
    /// Extra arguments forwarded verbatim to the child toolchain's test
    /// binary (after `--`).
    pub test_args: Vec<String>,
    /// Which terminal-status test lines to print.
    pub show_filter: ShowFilter,
    /// How much output detail to show per test.
    pub verbosity: Verbosity,
    /// Which final report to produce.
    pub format: ReportFormat,
    /// Where to write the chosen report format, if not stdout.
    pub output_file: Option<Utf8PathBuf>,
    /// Path to a coverage profile the child toolchain was asked to write;
    /// consumed (its summary line parsed) but never produced by this core.
    pub coverprofile: Option<Utf8PathBuf>,
    /// Whether a CI-comment artifact should be emitted at all.
    pub alert: bool,
    /// Overall wall-clock budget for the child process before escalating
    /// from interrupt to terminate.
    pub timeout: Option<Duration>,
    /// A caller-supplied expected test count, overriding the cache
    /// estimate if present.
    pub expected_count: Option<usize>,
    /// The shared cancellation signal.
    pub cancellation_token: CancellationToken,
    /// The pre-detected color profile.
    pub color_profile: ColorProfile,
    /// Maximum bytes buffered per test before ring-trimming (spec.md
    /// §4.2, default 64 KiB).
    pub test_output_buffer_cap: usize,
    /// Maximum bytes for a single decoded line before truncation (spec.md
    /// §4.1, default 1 MiB).
    pub max_line_len: usize,
    /// Soft cap on buffered-but-undecoded bytes before the child reader
    /// pauses (spec.md §5, default 10 MiB).
    pub backpressure_cap: usize,
    /// Maximum age for a cache entry before it's treated as absent
    /// (spec.md §3, default 24h).
    pub cache_max_age: Duration,
    /// How long to wait for the cache's advisory file lock before giving
    /// up (spec.md §4.3, default 200ms).
    pub cache_lock_timeout: Duration,
    /// The directory holding the cache file (defaults to a dot-directory
    /// next to the invocation root; resolved by the collaborator layer).
    pub cache_dir: Utf8PathBuf,
    /// CI-comment emitter's hard byte budget (spec.md §4.8, default
    /// 65536).
    pub ci_comment_byte_budget: usize,
}

impl RunConfig {
    /// Defaults matching the numbers named in spec.md, for a given
    /// toolchain root and cache directory.
    pub fn with_defaults(test_path: impl Into<String>, cache_dir: Utf8PathBuf) -> Self {
        Self {
            test_path: test_path.into(),
            packages: Vec::new(),
            test_args: Vec::new(),
            show_filter: ShowFilter::default(),
            verbosity: Verbosity::default(),
            format: ReportFormat::default(),
            output_file: None,
            coverprofile: None,
            alert: false,
            timeout: None,
            expected_count: None,
            cancellation_token: CancellationToken::new(),
            color_profile: ColorProfile::default(),
            test_output_buffer_cap: 64 * 1024,
            max_line_len: 1024 * 1024,
            backpressure_cap: 10 * 1024 * 1024,
            cache_max_age: Duration::from_secs(24 * 60 * 60),
            cache_lock_timeout: Duration::from_millis(200),
            cache_dir,
            ci_comment_byte_budget: 65_536,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_profile_resolves_auto() {
        assert!(ColorProfile::Auto.resolve(true));
        assert!(!ColorProfile::Auto.resolve(false));
        assert!(ColorProfile::Always.resolve(false));
        assert!(!ColorProfile::Never.resolve(true));
    }

    #[tokio::test]
    async fn cancellation_token_fires_once() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        // Must not hang: the signal already fired.
        token.cancelled().await;
    }

    #[tokio::test]
    async fn cancellation_token_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::task::yield_now().await;
        token.cancel();
        handle.await.unwrap();
    }
}

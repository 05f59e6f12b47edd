//! The TUI driver (spec.md §4.5, component C5).
//!
//! Renders an indicatif progress bar against the latest [`StateDelta`] and
//! [`ProgressTick`], and watches for a user-requested cancellation (Ctrl-C
//! read directly off the terminal, independent of the process's own SIGINT
//! handling, so the supervisor gets a chance to drain the child cleanly
//! rather than dying to the default signal disposition).
//!
//! Unlike the teacher's hand-rolled termios `InputGuard`
//! (`examples/nextest-rs-nextest/nextest-runner/src/input.rs`), raw-mode
//! enable/disable here goes through crossterm's own
//! `enable_raw_mode`/`disable_raw_mode` rather than re-implementing it with
//! direct `libc::termios` calls: the narrower input-only mode the teacher
//! built by hand exists to avoid crossterm's wider masking of terminal
//! signal processing, which this driver doesn't need since cancellation is
//! read as a plain keypress rather than relying on SIGINT passthrough.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::time::Duration;
use swrite::{swrite, SWrite};
use tokio_stream::StreamExt;

use crate::config::{CancellationToken, ColorProfile};
use crate::progress::ProgressTick;
use crate::state::{Counters, StateDelta};

/// Styling used by the TUI, resolved once at construction (spec.md §4.5:
/// "the TUI never probes environment directly").
#[derive(Clone, Copy, Debug)]
struct Styles {
    colorize: bool,
}

impl Styles {
    fn pass_str(&self, s: &str) -> String {
        if self.colorize {
            s.green().to_string()
        } else {
            s.to_string()
        }
    }

    fn fail_str(&self, s: &str) -> String {
        if self.colorize {
            s.red().bold().to_string()
        } else {
            s.to_string()
        }
    }
}

/// A scope guard around crossterm's raw mode, restoring cooked mode on
/// drop so a panic or early return never leaves the user's shell in raw
/// mode (spec.md §8: "the terminal must be restored to its original state
/// on every exit path, including panics and cancellation").
struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    fn enable() -> Self {
        match crossterm::terminal::enable_raw_mode() {
            Ok(()) => Self { enabled: true },
            Err(error) => {
                tracing::warn!(%error, "failed to enable terminal raw mode, input cancellation disabled");
                Self { enabled: false }
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            if let Err(error) = crossterm::terminal::disable_raw_mode() {
                tracing::warn!(%error, "failed to restore terminal mode");
            }
        }
    }
}

/// The interactive TUI renderer: an indicatif progress bar, cheap to clone
/// (indicatif's `ProgressBar` is reference-counted internally) so the
/// orchestrator's render loop and the spawned [`InputWatcher`] task can each
/// hold their own handle without sharing a lock.
#[derive(Clone)]
pub struct TuiDriver {
    bar: ProgressBar,
    styles: Styles,
}

impl TuiDriver {
    /// Construct a driver attached to stderr, per spec.md §4.5 ("progress
    /// goes to stderr so piping stdout doesn't capture it").
    pub fn new(color_profile: ColorProfile) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(20));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:>10} [{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")
                .expect("template is known to be valid"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        let terminal_supports_color = std::io::stderr().is_terminal() && supports_color::on_cached(supports_color::Stream::Stderr).is_some();

        Self {
            bar,
            styles: Styles {
                colorize: color_profile.resolve(terminal_supports_color),
            },
        }
    }

    /// Render a progress snapshot.
    pub fn render(&self, tick: ProgressTick, delta: &StateDelta) {
        self.bar.set_length(tick.expected.unwrap_or(tick.completed).max(1) as u64);
        self.bar.set_position(tick.completed as u64);
        self.bar.set_prefix(prefix(&delta.counters, &self.styles));
        self.bar.set_message(message(&delta.counters, delta.last_test.as_deref(), &self.styles));
    }

    /// Clears the bar, leaving nothing behind for the final console report
    /// to follow.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// The raw-mode keyboard listener for Ctrl-C/`q`-to-cancel, run as its own
/// task (spec.md §5: `T_ui` is a single-threaded loop, but reading the
/// keyboard and redrawing the bar don't need to block each other here since
/// neither one owns shared mutable state).
pub struct InputWatcher {
    _raw_mode: RawModeGuard,
    events: crossterm::event::EventStream,
}

impl InputWatcher {
    pub fn new() -> Self {
        Self {
            _raw_mode: RawModeGuard::enable(),
            events: crossterm::event::EventStream::new(),
        }
    }

    /// Wait for the next cancellation-triggering key (`Ctrl-C` or `q`),
    /// firing `token`. Returns when the token fires or the input stream
    /// closes/errors, whichever comes first.
    pub async fn watch_for_cancel(&mut self, token: &CancellationToken) {
        use crossterm::event::{Event, KeyCode, KeyModifiers};
        loop {
            match self.events.next().await {
                Some(Ok(Event::Key(key))) => {
                    let is_ctrl_c = key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
                    let is_q = key.code == KeyCode::Char('q') && key.modifiers.is_empty();
                    if is_ctrl_c || is_q {
                        token.cancel();
                        return;
                    }
                }
                Some(Ok(Event::Resize(..))) => {
                    // indicatif re-wraps against the new width on its own next tick.
                    continue;
                }
                Some(Ok(_)) => continue,
                Some(Err(error)) => {
                    tracing::warn!(%error, "terminal input stream error, disabling cancel-by-keypress");
                    return;
                }
                None => return,
            }
        }
    }
}

impl Default for InputWatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn prefix(counters: &Counters, styles: &Styles) -> String {
    let label = if counters.failed > 0 { styles.fail_str("FAILING") } else { styles.pass_str("RUNNING") };
    format!("{label:>10}")
}

fn message(counters: &Counters, last_test: Option<&str>, styles: &Styles) -> String {
    let mut s = String::new();
    swrite!(s, "{} passed", styles.pass_str(&counters.passed.to_string()));
    if counters.failed > 0 {
        swrite!(s, ", {} failed", styles.fail_str(&counters.failed.to_string()));
    }
    if counters.skipped > 0 {
        swrite!(s, ", {} skipped", counters.skipped);
    }
    if let Some(test) = last_test {
        swrite!(s, " ({test})");
    }
    s
}

/// A non-interactive fallback for piped/non-TTY output: periodically prints
/// a one-line status instead of redrawing a bar in place (spec.md §4.5:
/// "a non-TTY invocation still gets coarse progress, just line-buffered").
pub struct HeadlessProgress {
    styles: Styles,
}

impl HeadlessProgress {
    pub fn new(color_profile: ColorProfile) -> Self {
        Self {
            styles: Styles {
                colorize: color_profile.resolve(false),
            },
        }
    }

    pub fn render(&self, tick: ProgressTick, delta: &StateDelta) {
        let expected = tick.expected.map(|e| e.to_string()).unwrap_or_else(|| "?".to_string());
        eprintln!(
            "[{:>6.1}s] {}/{} {}",
            tick.elapsed.as_secs_f64(),
            tick.completed,
            expected,
            message(&delta.counters, delta.last_test.as_deref(), &self.styles),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_includes_failed_count_only_when_nonzero() {
        let styles = Styles { colorize: false };
        let counters = Counters { passed: 3, failed: 0, skipped: 0, unknown: 0, running: 1 };
        assert!(!message(&counters, None, &styles).contains("failed"));

        let counters = Counters { passed: 3, failed: 1, skipped: 0, unknown: 0, running: 1 };
        assert!(message(&counters, None, &styles).contains("1 failed"));
    }

    #[test]
    fn message_appends_last_test_name() {
        let styles = Styles { colorize: false };
        let counters = Counters::default();
        assert!(message(&counters, Some("pkg::TestA"), &styles).contains("pkg::TestA"));
    }
}

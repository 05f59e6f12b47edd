//! The event decoder (spec.md §4.1, component C1).
//!
//! Turns a byte stream into a lazy, finite sequence of [`Event`] values,
//! tolerating garbage lines the way `go test -json` callers must: a build
//! failure, a panic, or a `go vet` warning all show up as plain text on the
//! same stdout the JSON events are interleaved with.
//!
//! The wire shape matches `cmd/internal/test2json`'s field names exactly
//! (`Time`, `Action`, `Package`, `Test`, `Elapsed`, `Output`) plus the
//! `FailedBuild` field newer toolchains add for build-failure attribution
//! (see `SPEC_FULL.md`'s "supplementing spec.md" section).

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use smol_str::SmolStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// The action tag of an [`Event`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    Run,
    Pause,
    Cont,
    Output,
    Pass,
    Fail,
    Skip,
    Bench,
    PackageStart,
    PackageEnd,
    /// A line that didn't parse as a wire event at all. Carries the raw
    /// bytes (lossily decoded) as the event's `output`.
    RawOutput,
    /// A line exceeded the configured maximum length and was truncated.
    Truncated { original_len: usize },
    /// An action tag the decoder doesn't assign semantics to. Retained
    /// verbatim (spec.md §3: "counted for observability") rather than
    /// dropped.
    Unknown(SmolStr),
}

impl Action {
    fn from_wire(tag: &str) -> Self {
        match tag {
            "run" => Self::Run,
            "pause" => Self::Pause,
            "cont" => Self::Cont,
            "output" => Self::Output,
            "pass" => Self::Pass,
            "fail" => Self::Fail,
            "skip" => Self::Skip,
            "bench" => Self::Bench,
            "package-start" => Self::PackageStart,
            "package-end" => Self::PackageEnd,
            other => Self::Unknown(SmolStr::new(other)),
        }
    }
}

/// A single decoded event (spec.md §3).
///
/// Carries no references into the input buffer: every string field is an
/// owned copy, so events can cross channel boundaries freely.
#[derive(Clone, Debug)]
pub struct Event {
    /// A strictly increasing counter assigned by the decoder, independent
    /// of wall-clock time. Guarantees total ordering even when two lines
    /// carry the same (or an absent) wall-clock timestamp.
    pub seq: u64,
    /// The wall-clock time the toolchain reported, or the decode-time
    /// instant if the line carried none (synthetic events, or a wire event
    /// missing `Time`).
    pub timestamp: DateTime<FixedOffset>,
    pub action: Action,
    pub package: Option<SmolStr>,
    pub test: Option<SmolStr>,
    pub elapsed: Option<f64>,
    pub output: Option<String>,
    pub skip_reason: Option<SmolStr>,
}

#[derive(Deserialize)]
struct GoEventWire {
    #[serde(rename = "Time")]
    time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Package")]
    package: Option<String>,
    #[serde(rename = "Test")]
    test: Option<String>,
    #[serde(rename = "Elapsed")]
    elapsed: Option<f64>,
    #[serde(rename = "Output")]
    output: Option<String>,
    #[serde(rename = "FailedBuild")]
    failed_build: Option<String>,
}

/// Tracks the most recently seen `(package, test)` context so that
/// out-of-band lines (garbage, build errors) can be attributed to
/// *something* in the final report rather than silently dropped.
#[derive(Clone, Debug, Default)]
struct Context {
    package: Option<SmolStr>,
    test: Option<SmolStr>,
    /// Set when an `output` line for the current test begins with
    /// `--- SKIP:`; consumed by the `skip` action that follows it, per
    /// `go test -json`'s "skip reason arrives as output, before the
    /// terminal action" ordering.
    pending_skip_reason: Option<SmolStr>,
}

const SKIP_MARKER: &str = "--- SKIP:";

/// Decodes a byte stream into a lazy sequence of [`Event`]s.
///
/// `D::next_event` is the whole contract: call it in a loop until it
/// returns `Ok(None)` (clean end of stream) or `Err` (a read error that
/// occurred before any byte of the stream was ever produced, the only
/// class of I/O error this decoder treats as fatal).
pub struct Decoder<R> {
    reader: R,
    seq: u64,
    context: Context,
    max_line_len: usize,
    any_byte_read: bool,
    line_buf: Vec<u8>,
    /// Lines are tee'd here verbatim, as received, for the JSON passthrough
    /// artifact (spec.md §6: "the raw event stream as received, used for
    /// offline replay"). `None` when no passthrough was requested.
    passthrough: Option<Box<dyn AsyncWrite + Unpin + Send>>,
}

impl<R: AsyncBufRead + Unpin> Decoder<R> {
    pub fn new(reader: R, max_line_len: usize) -> Self {
        Self {
            reader,
            seq: 0,
            context: Context::default(),
            max_line_len,
            any_byte_read: false,
            line_buf: Vec::with_capacity(256),
            passthrough: None,
        }
    }

    /// Tee every well-formed (non-oversized) line read to `sink`, verbatim,
    /// for later offline replay.
    pub fn with_passthrough(mut self, sink: Box<dyn AsyncWrite + Unpin + Send>) -> Self {
        self.passthrough = Some(sink);
        self
    }

    /// Reads and decodes the next event, or returns `Ok(None)` at clean
    /// EOF.
    ///
    /// Per spec.md §4.1: "Errors from the underlying reader after at least
    /// one byte are logged and terminate the sequence cleanly; only
    /// pre-first-byte errors are fatal to the run."
    pub async fn next_event(&mut self) -> std::io::Result<Option<Event>> {
        loop {
            self.line_buf.clear();
            let read_result = self.reader.read_until(b'\n', &mut self.line_buf).await;

            let n = match read_result {
                Ok(n) => n,
                Err(err) => {
                    if self.any_byte_read {
                        tracing::warn!(error = %err, "child stdout read failed mid-stream, treating as EOF");
                        return Ok(None);
                    }
                    return Err(err);
                }
            };

            if n == 0 {
                return Ok(None);
            }
            self.any_byte_read = true;

            if self.line_buf.len() > self.max_line_len {
                let original_len = self.drain_rest_of_line().await? + self.line_buf.len();
                return Ok(Some(self.synthesize(
                    Action::Truncated { original_len },
                    None,
                )));
            }

            if let Some(sink) = &mut self.passthrough {
                if sink.write_all(&self.line_buf).await.is_err() {
                    tracing::warn!("JSON passthrough write failed, disabling it for the rest of the run");
                    self.passthrough = None;
                }
            }

            let line = strip_trailing_newline(&self.line_buf);
            if line.trim_ascii().is_empty() {
                // Blank lines carry no information; don't manufacture a
                // raw-output event for them (go test -json never emits
                // them, but a stray blank line from buffering shouldn't
                // count as garbage). Keep reading.
                continue;
            }

            return match serde_json::from_slice::<GoEventWire>(line) {
                Ok(wire) => Ok(Some(self.accept(wire))),
                Err(err) => {
                    tracing::debug!(error = %err, "malformed event line, emitting as raw output");
                    let text = String::from_utf8_lossy(line).into_owned();
                    Ok(Some(self.synthesize(Action::RawOutput, Some(text))))
                }
            };
        }
    }

    /// Consumes and discards bytes up through the next newline (or EOF),
    /// having already exceeded `max_line_len`. Returns the number of
    /// additional bytes discarded.
    async fn drain_rest_of_line(&mut self) -> std::io::Result<usize> {
        if self.line_buf.last() == Some(&b'\n') {
            return Ok(0);
        }
        let mut discarded = 0usize;
        let mut scratch = Vec::with_capacity(4096);
        loop {
            scratch.clear();
            let n = self.reader.read_until(b'\n', &mut scratch).await?;
            if n == 0 {
                break;
            }
            discarded += n;
            if scratch.last() == Some(&b'\n') {
                break;
            }
        }
        Ok(discarded)
    }

    fn accept(&mut self, wire: GoEventWire) -> Event {
        let action = Action::from_wire(&wire.action);
        let package = wire.package.map(SmolStr::new);
        let test = wire.test.map(SmolStr::new);

        if package.is_some() {
            self.context.package = package.clone();
        }
        if test.is_some() {
            self.context.test = test.clone();
        } else if matches!(action, Action::PackageStart | Action::PackageEnd) {
            self.context.test = None;
        }

        // A build failure reported without a test context still carries a
        // `FailedBuild` package name on newer toolchains; route its output
        // to that package explicitly rather than to whatever happened to
        // be running last.
        let package = package.or_else(|| wire.failed_build.as_deref().map(SmolStr::new));

        if action == Action::Output {
            if let Some(marker_at) = wire.output.as_deref().and_then(|text| text.find(SKIP_MARKER)) {
                let rest = wire.output.as_deref().unwrap()[marker_at + SKIP_MARKER.len()..].trim();
                self.context.pending_skip_reason = Some(SmolStr::new(rest));
            }
        }
        let skip_reason = if action == Action::Skip {
            self.context.pending_skip_reason.take()
        } else {
            None
        };

        self.seq += 1;
        Event {
            seq: self.seq,
            timestamp: wire.time.unwrap_or_else(|| Utc::now().fixed_offset()),
            action,
            package,
            test,
            elapsed: wire.elapsed.filter(|e| *e >= 0.0),
            output: wire.output,
            skip_reason,
        }
    }

    fn synthesize(&mut self, action: Action, output: Option<String>) -> Event {
        self.seq += 1;
        Event {
            seq: self.seq,
            timestamp: Utc::now().fixed_offset(),
            action,
            package: self.context.package.clone(),
            test: self.context.test.clone(),
            elapsed: None,
            output,
            skip_reason: None,
        }
    }
}

fn strip_trailing_newline(line: &[u8]) -> &[u8] {
    let mut line = line;
    if line.last() == Some(&b'\n') {
        line = &line[..line.len() - 1];
    }
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_case::test_case;

    async fn decode_all(input: &str, max_line_len: usize) -> Vec<Event> {
        let cursor = Cursor::new(input.as_bytes().to_vec());
        let mut decoder = Decoder::new(cursor, max_line_len);
        let mut events = Vec::new();
        while let Some(event) = decoder.next_event().await.unwrap() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn decodes_run_pass_in_order() {
        let input = concat!(
            r#"{"Action":"run","Package":"p","Test":"TestA"}"#,
            "\n",
            r#"{"Action":"pass","Package":"p","Test":"TestA","Elapsed":0.01}"#,
            "\n",
        );
        let events = decode_all(input, 1024 * 1024).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, Action::Run);
        assert_eq!(events[1].action, Action::Pass);
        assert_eq!(events[1].elapsed, Some(0.01));
        assert!(events[0].seq < events[1].seq);
    }

    #[tokio::test]
    async fn malformed_line_becomes_raw_output_with_context() {
        let input = concat!(
            r#"{"Action":"run","Package":"p","Test":"TestA"}"#,
            "\n",
            "not json at all\n",
        );
        let events = decode_all(input, 1024 * 1024).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].action, Action::RawOutput);
        assert_eq!(events[1].package.as_deref(), Some("p"));
        assert_eq!(events[1].test.as_deref(), Some("TestA"));
        assert_eq!(events[1].output.as_deref(), Some("not json at all"));
    }

    #[tokio::test]
    async fn oversized_line_is_truncated_not_dropped() {
        let big_output = "x".repeat(200);
        let input = format!(r#"{{"Action":"output","Output":"{big_output}"}}"#) + "\n";
        let events = decode_all(&input, 64).await;
        assert_eq!(events.len(), 1);
        match &events[0].action {
            Action::Truncated { original_len } => assert!(*original_len > 64),
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_action_retained_verbatim() {
        let input = r#"{"Action":"pulse"}"#.to_string() + "\n";
        let events = decode_all(&input, 1024).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, Action::Unknown("pulse".into()));
    }

    #[tokio::test]
    async fn clean_eof_yields_no_final_event() {
        let events = decode_all("", 1024).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn negative_elapsed_is_dropped_not_trusted() {
        let input = r#"{"Action":"pass","Test":"T","Elapsed":-1.0}"#.to_string() + "\n";
        let events = decode_all(&input, 1024).await;
        assert_eq!(events[0].elapsed, None);
    }

    #[tokio::test]
    async fn skip_reason_carried_from_output_line_to_skip_event() {
        let input = indoc::indoc! {r#"
            {"Action":"run","Package":"p","Test":"TestFoo"}
            {"Action":"output","Package":"p","Test":"TestFoo","Output":"    foo_test.go:11: --- SKIP: not on this platform\n"}
            {"Action":"skip","Package":"p","Test":"TestFoo","Elapsed":0.0}
        "#};
        let events = decode_all(input, 1024 * 1024).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].action, Action::Skip);
        assert_eq!(events[2].skip_reason.as_deref(), Some("not on this platform"));
    }

    #[test_case("output", "--- SKIP: short-circuit-before-skip-arrives", true ; "output line carrying the marker sets a pending reason")]
    #[test_case("output", "ordinary captured output", false ; "unrelated output line sets no pending reason")]
    #[test_case("run", "--- SKIP: ignored because this isn't an output action", false ; "marker text on a non-output action is ignored")]
    fn pending_skip_reason_only_set_by_output_lines_with_the_marker(action: &str, output: &str, expect_pending: bool) {
        let wire = GoEventWire {
            time: None,
            action: action.to_string(),
            package: Some("p".to_string()),
            test: Some("TestFoo".to_string()),
            elapsed: None,
            output: Some(output.to_string()),
            failed_build: None,
        };
        let mut decoder = Decoder::new(Cursor::new(Vec::new()), 1024);
        decoder.accept(wire);
        assert_eq!(decoder.context.pending_skip_reason.is_some(), expect_pending);
    }
}

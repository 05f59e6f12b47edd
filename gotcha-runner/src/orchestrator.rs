//! The orchestrator (spec.md §4.9, component C9): composes the supervisor,
//! decoder, reconstructor, and UI into one run, exactly as the nine-step
//! sequence spec.md lays out.
//!
//! The full four-task model of spec.md §5 (`T_child_io`, `T_decode`,
//! `T_reconstruct`, `T_ui` joined by bounded/coalescing channels) collapses
//! here into two cooperating tasks: a render/input task (the TUI, or
//! nothing in headless mode) and this function's own event loop, which
//! pulls directly from the [`Decoder`] rather than relaying through a
//! `ch_raw`/`ch_events` pair. The decoder already operates pull-style on any
//! `AsyncBufRead`, so handing it the child's stdout reader directly gets
//! the same backpressure spec.md §5 asks for (the OS pipe blocks the child
//! when nobody's reading) without an extra channel hop; see `DESIGN.md`.

use camino::Utf8PathBuf;
use gotcha_metadata::{GotchaExitCode, SummaryDocument};
use std::io::IsTerminal;
use std::time::{Instant, UNIX_EPOCH};

use crate::cache::{self, CacheStore};
use crate::config::{ReportFormat, RunConfig};
use crate::emitters::{ci_comment, console, json as json_emitter, markdown, ReportContext, SummaryMarker};
use crate::errors::RunError;
use crate::event::Decoder;
use crate::progress::{self, ProgressEstimator};
use crate::state::{Reconstructor, StateDelta};
use crate::summary::build_summary;
use crate::supervisor::SupervisedChild;
use crate::tui::{HeadlessProgress, InputWatcher, TuiDriver};

/// What a completed (or cancelled) run produced.
pub struct RunOutcome {
    pub summary: SummaryDocument,
    pub exit_code: i32,
}

/// Runs one full test invocation end to end (spec.md §4.9's nine steps),
/// returning once the stream closes, the child exits, or cancellation
/// drains.
pub async fn run(config: RunConfig) -> Result<RunOutcome, RunError> {
    let cwd = current_dir();
    let started_at = Instant::now();

    // Step 1: acquire cache (scoped); read estimate; release.
    let cache = CacheStore::new(config.cache_dir.clone(), config.cache_max_age, config.cache_lock_timeout);
    let fingerprint = cache::fingerprint(&[config.test_path.clone()], &config.packages, toolchain_root_mtime(&cwd));
    let cached_estimate = cache.read(fingerprint).await;
    let expected_count = config
        .expected_count
        .or_else(|| cached_estimate.map(|e| e.estimated_count));

    // Step 2: start the process supervisor.
    let (program, args) = child_invocation(&config);
    let mut child = SupervisedChild::spawn(&program, &args, &cwd)?;

    // Step 3: route supervisor stdout -> decoder -> reconstructor.
    let mut decoder = Decoder::new(child.take_stdout(), config.max_line_len);
    if matches!(config.format, ReportFormat::Json) {
        if let Some(path) = &config.output_file {
            match json_emitter::passthrough_sink(path).await {
                Ok(sink) => decoder = decoder.with_passthrough(sink),
                Err(error) => tracing::warn!(%error, path = %path, "failed to open JSON passthrough sink"),
            }
        }
    }

    let mut reconstructor = Reconstructor::new(config.test_output_buffer_cap);
    let mut estimator = ProgressEstimator::new(expected_count);
    let mut ticker = progress::ticker(std::time::Duration::from_millis(100));

    // Step 4: start the TUI driver or headless printer on the snapshot stream.
    let interactive = std::io::stderr().is_terminal();
    let tui = interactive.then(|| TuiDriver::new(config.color_profile));
    let headless = (!interactive).then(|| HeadlessProgress::new(config.color_profile));
    let input_watcher_task = interactive.then(|| {
        let token = config.cancellation_token.clone();
        tokio::spawn(async move {
            let mut watcher = InputWatcher::new();
            watcher.watch_for_cancel(&token).await;
        })
    });

    let mut last_delta = StateDelta {
        counters: reconstructor.state().counters,
        last_package: None,
        last_test: None,
        last_output_line: None,
    };

    // Step 5: await stream close or cancellation.
    let mut aborted = false;
    loop {
        tokio::select! {
            biased;
            _ = config.cancellation_token.cancelled(), if !aborted => {
                aborted = true;
            }
            _ = ticker.tick() => {
                let tick = estimator.sample(reconstructor.state().counters.total_terminal());
                render(&tui, &headless, tick, &last_delta);
            }
            next = decoder.next_event() => {
                match next {
                    Ok(Some(event)) => {
                        last_delta = reconstructor.apply(event);
                        let tick = estimator.sample(reconstructor.state().counters.total_terminal());
                        render(&tui, &headless, tick, &last_delta);
                    }
                    Ok(None) => break,
                    Err(error) => {
                        tracing::error!(%error, "fatal read error before any byte of child stdout was received");
                        break;
                    }
                }
            }
        }
        if aborted {
            break;
        }
    }

    if let Some(task) = input_watcher_task {
        task.abort();
    }
    if let Some(tui) = &tui {
        tui.finish();
    }

    let drain_timeout = config.timeout.unwrap_or(std::time::Duration::from_secs(1));
    let cancelled_signal = config.cancellation_token.cancelled();
    let child_outcome = child.finish(cancelled_signal, drain_timeout).await;

    // Step 6: build the summary.
    let state = reconstructor.into_state();
    let exit_code = resolve_exit_code(aborted, state.counters.failed, child_outcome.exit_code);
    let summary = build_summary(&state, started_at.elapsed(), aborted, exit_code, Some(fingerprint));

    // Step 7: acquire cache (scoped); upsert iff not aborted and exit in {0, 1}.
    if !aborted && matches!(exit_code, GotchaExitCode::OK | GotchaExitCode::TEST_RUN_FAILED) {
        cache.write(fingerprint, &state).await;
    }

    // Step 8: invoke report emitters on the configured paths.
    emit_reports(&config, &summary);

    if !child_outcome.stderr.trim().is_empty() && state.counters.failed == 0 && child_outcome.exit_code != 0 {
        tracing::warn!(stderr = %child_outcome.stderr, "child exited non-zero with no recorded test failures");
    }

    // Step 9: return the exit code.
    Ok(RunOutcome { summary, exit_code })
}

fn render(tui: &Option<TuiDriver>, headless: &Option<HeadlessProgress>, tick: crate::progress::ProgressTick, delta: &StateDelta) {
    if let Some(tui) = tui {
        tui.render(tick, delta);
    } else if let Some(headless) = headless {
        headless.render(tick, delta);
    }
}

fn resolve_exit_code(aborted: bool, failed: usize, child_exit_code: i32) -> i32 {
    if aborted {
        return GotchaExitCode::CANCELLED;
    }
    if failed > 0 {
        return GotchaExitCode::TEST_RUN_FAILED;
    }
    if child_exit_code != 0 {
        return child_exit_code;
    }
    GotchaExitCode::OK
}

fn child_invocation(config: &RunConfig) -> (String, Vec<String>) {
    let mut args = vec!["test".to_string(), "-json".to_string()];
    if let Some(coverprofile) = &config.coverprofile {
        args.push(format!("-coverprofile={coverprofile}"));
    }
    args.push(config.test_path.clone());
    args.extend(config.packages.iter().cloned());
    if !config.test_args.is_empty() {
        args.push("--".to_string());
        args.extend(config.test_args.iter().cloned());
    }
    ("go".to_string(), args)
}

fn emit_reports(config: &RunConfig, summary: &SummaryDocument) {
    let console_report = console::render(summary);
    print!("{console_report}");

    match config.format {
        ReportFormat::Terminal | ReportFormat::Json => {}
        ReportFormat::Markdown => {
            let ctx = ReportContext::new(SummaryMarker::new_v4());
            write_artifact(&config.output_file, &markdown::render(summary, &ctx));
        }
        ReportFormat::Github => {
            let mut ctx = ReportContext::new(SummaryMarker::new_v4());
            ctx.ci_comment_byte_budget = config.ci_comment_byte_budget;
            write_artifact(&config.output_file, &ci_comment::render(summary, &ctx));
        }
    }

    if config.alert && !matches!(config.format, ReportFormat::Github) {
        let mut ctx = ReportContext::new(SummaryMarker::new_v4());
        ctx.ci_comment_byte_budget = config.ci_comment_byte_budget;
        write_artifact(&config.output_file, &ci_comment::render(summary, &ctx));
    }
}

fn write_artifact(path: &Option<Utf8PathBuf>, contents: &str) {
    match path {
        Some(path) => {
            if let Err(error) = std::fs::write(path, contents) {
                tracing::warn!(%error, path = %path, "failed to write report artifact");
            }
        }
        None => print!("{contents}"),
    }
}

fn current_dir() -> camino::Utf8PathBuf {
    std::env::current_dir()
        .ok()
        .and_then(|p| camino::Utf8PathBuf::from_path_buf(p).ok())
        .unwrap_or_else(|| camino::Utf8PathBuf::from("."))
}

fn toolchain_root_mtime(root: &camino::Utf8Path) -> i64 {
    std::fs::metadata(root)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

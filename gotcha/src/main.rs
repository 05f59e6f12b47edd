//! `gotcha`: the collaborator layer spec.md §1 explicitly treats as
//! external to the core — CLI flag parsing, config-file loading,
//! color-profile and CI detection — wired up to hand a single immutable
//! [`gotcha_runner::RunConfig`] to [`gotcha_runner::run`].
//!
//! Thin by design: everything interesting (the event pipeline, the state
//! machine, the TUI, the cache, the emitters) lives in `gotcha-runner`.

mod cli;
mod config_file;
mod errors;

use bytesize::ByteSize;
use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::Result;
use errors::ExpectedError;
use gotcha_runner::config::{CancellationToken, ColorProfile, RunConfig};
use std::time::Duration;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = cli::CliArgs::parse();
    init_logging(args.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start the tokio runtime");

    let exit_code = match runtime.block_on(run(args)) {
        Ok(exit_code) => exit_code,
        Err(error) => {
            error.display_to_stderr();
            error.process_exit_code()
        }
    };

    std::process::exit(exit_code);
}

async fn run(args: cli::CliArgs) -> std::result::Result<i32, ExpectedError> {
    let cwd = std::env::current_dir()
        .ok()
        .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
        .ok_or_else(|| ExpectedError::CurrentDirUnavailable {
            source: std::io::Error::other("current directory is not valid UTF-8 or unreadable"),
        })?;

    let file_config = config_file::load(&cwd, args.config_file.as_deref())?;
    let config = build_run_config(&cwd, &args, file_config)?;

    // Forward SIGINT to the shared cancellation token regardless of
    // whether the TUI owns the terminal: a piped/non-TTY invocation still
    // gets a clean, drained shutdown instead of the default disposition
    // killing the child uncleanly.
    let token = config.cancellation_token.clone();
    tokio::spawn(forward_ctrl_c(token));

    let outcome = gotcha_runner::run(config).await?;
    tracing::info!(exit_code = outcome.exit_code, total = outcome.summary.total(), "run finished");
    Ok(outcome.exit_code)
}

async fn forward_ctrl_c(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        token.cancel();
    }
}

fn build_run_config(
    cwd: &camino::Utf8Path,
    args: &cli::CliArgs,
    file: config_file::FileConfig,
) -> std::result::Result<RunConfig, ExpectedError> {
    let cache_root = args.cache_root.clone().unwrap_or_else(|| cwd.to_owned());
    let cache_dir = cache_root.join(".gotcha");
    std::fs::create_dir_all(&cache_dir).map_err(|source| ExpectedError::CacheDirCreateError {
        path: cache_dir.clone(),
        source,
    })?;

    let mut config = RunConfig::with_defaults(args.test_path.clone(), cache_dir);
    config.packages = args.packages.clone();
    config.test_args = args.test_args.clone();
    config.coverprofile = args.coverprofile.clone();
    config.output_file = args.output_file.clone();

    if let Some(show) = parse_show_filter(file.show.as_deref()) {
        config.show_filter = show;
    }
    if let Some(verbosity) = parse_verbosity(file.verbosity.as_deref()) {
        config.verbosity = verbosity;
    }
    if let Some(format) = parse_report_format(file.format.as_deref()) {
        config.format = format;
    }
    config.alert = file.alert.unwrap_or(config.alert);
    config.expected_count = file.expected_count;
    config.timeout = file.timeout;
    config.test_output_buffer_cap = file.test_output_buffer_cap.map(byte_size_as_usize).unwrap_or(config.test_output_buffer_cap);
    config.max_line_len = file.max_line_len.map(byte_size_as_usize).unwrap_or(config.max_line_len);
    config.backpressure_cap = file.backpressure_cap.map(byte_size_as_usize).unwrap_or(config.backpressure_cap);
    config.cache_max_age = file.cache_max_age.unwrap_or(config.cache_max_age);
    config.cache_lock_timeout = file.cache_lock_timeout.unwrap_or(config.cache_lock_timeout);
    config.ci_comment_byte_budget = file.ci_comment_byte_budget.unwrap_or(config.ci_comment_byte_budget);

    // CLI flags are the highest-priority layer; they override the
    // config-file values just applied above.
    if let Some(show) = args.show {
        config.show_filter = show.into();
    }
    if let Some(verbosity) = args.verbosity {
        config.verbosity = verbosity.into();
    }
    if let Some(format) = args.format {
        config.format = format.into();
    }
    if args.alert {
        config.alert = true;
    }
    if let Some(timeout) = args.timeout.clone() {
        config.timeout = Some(Duration::from(timeout));
    }
    if let Some(expected_count) = args.expected_count {
        config.expected_count = Some(expected_count);
    }

    config.color_profile = resolve_color_profile(args.color);

    Ok(config)
}

fn byte_size_as_usize(size: ByteSize) -> usize {
    size.as_u64() as usize
}

fn parse_show_filter(value: Option<&str>) -> Option<gotcha_runner::config::ShowFilter> {
    use gotcha_runner::config::ShowFilter as F;
    match value? {
        "all" => Some(F::All),
        "failed" => Some(F::Failed),
        "passed" => Some(F::Passed),
        "skipped" => Some(F::Skipped),
        "none" => Some(F::None),
        other => {
            tracing::warn!(value = other, "unrecognized `show` in config file, ignoring");
            None
        }
    }
}

fn parse_verbosity(value: Option<&str>) -> Option<gotcha_runner::config::Verbosity> {
    use gotcha_runner::config::Verbosity as V;
    match value? {
        "minimal" => Some(V::Minimal),
        "standard" => Some(V::Standard),
        "with-output" => Some(V::WithOutput),
        "verbose" => Some(V::Verbose),
        other => {
            tracing::warn!(value = other, "unrecognized `verbosity` in config file, ignoring");
            None
        }
    }
}

fn parse_report_format(value: Option<&str>) -> Option<gotcha_runner::config::ReportFormat> {
    use gotcha_runner::config::ReportFormat as R;
    match value? {
        "terminal" => Some(R::Terminal),
        "markdown" => Some(R::Markdown),
        "json" => Some(R::Json),
        "github" => Some(R::Github),
        other => {
            tracing::warn!(value = other, "unrecognized `format` in config file, ignoring");
            None
        }
    }
}

/// Resolves the user's `--color` choice against an actual auto-detected
/// signal rather than having the TUI probe the environment itself (spec.md
/// §4.5: "the TUI never probes environment directly"; §6: "terminal-attached
/// flag, color-support profile, CI detection flag ... received as fields of
/// its configuration record").
///
/// The headless (non-TTY) printer resolves `Auto` to no-color, since it has
/// no terminal to probe at all — but most CI log viewers (GitHub Actions
/// among them) do render ANSI color in a non-TTY pipe, so `Auto` under a
/// detected CI environment is promoted to `Always` here rather than left to
/// silently go plain.
fn resolve_color_profile(requested: cli::ColorArg) -> ColorProfile {
    match requested {
        cli::ColorArg::Always => ColorProfile::Always,
        cli::ColorArg::Never => ColorProfile::Never,
        cli::ColorArg::Auto if is_ci::is_ci() && supports_color::on_cached(supports_color::Stream::Stderr).is_some() => {
            ColorProfile::Always
        }
        cli::ColorArg::Auto => ColorProfile::Auto,
    }
}

fn init_logging(log_level: u8) {
    use tracing_subscriber::EnvFilter;

    let default_directive = match log_level {
        0 => "gotcha=warn,gotcha_runner=warn",
        1 => "gotcha=info,gotcha_runner=info",
        2 => "gotcha=debug,gotcha_runner=debug",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn base_args() -> cli::CliArgs {
        cli::CliArgs::parse_from(["gotcha"])
    }

    #[test]
    fn build_run_config_applies_file_defaults() {
        let dir = camino_tempfile::tempdir().unwrap();
        let file_config = config_file::load(dir.path(), None).unwrap();
        let args = base_args();
        let config = build_run_config(dir.path(), &args, file_config).unwrap();
        assert_eq!(config.ci_comment_byte_budget, 65_536);
        assert_eq!(config.cache_max_age, Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn cli_flags_override_file_config() {
        let dir = camino_tempfile::tempdir().unwrap();
        let file_config = config_file::load(dir.path(), None).unwrap();
        let mut args = base_args();
        args.alert = true;
        args.expected_count = Some(42);
        let config = build_run_config(dir.path(), &args, file_config).unwrap();
        assert!(config.alert);
        assert_eq!(config.expected_count, Some(42));
    }

    #[test]
    fn cache_dir_is_created_under_the_cache_root() {
        let dir = camino_tempfile::tempdir().unwrap();
        let file_config = config_file::load(dir.path(), None).unwrap();
        let mut args = base_args();
        args.cache_root = Some(Utf8PathBuf::from(dir.path()));
        let config = build_run_config(dir.path(), &args, file_config).unwrap();
        assert!(config.cache_dir.ends_with(".gotcha"));
        assert!(config.cache_dir.is_dir());
    }
}

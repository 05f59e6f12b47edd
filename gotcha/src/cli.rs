//! CLI argument parsing (spec.md §1: "command-line flag parsing" is out of
//! scope for the core, but a real binary still has to define the surface).
//!
//! Every field here either maps 1:1 onto a [`gotcha_runner::RunConfig`]
//! field or layers on top of a value read from [`crate::config_file`]; the
//! merge happens in `main.rs` once, at startup, matching spec.md §9's "the
//! core treats its config as immutable for the duration of a run."

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};

/// `gotcha`: a live-progress front-end for `go test -json`.
#[derive(Debug, Parser)]
#[command(name = "gotcha", version, about, long_about = None)]
pub struct CliArgs {
    /// The import-path pattern(s) to test, e.g. `./...`.
    #[arg(default_value = "./...")]
    pub test_path: String,

    /// Restrict the run to these packages (may be repeated).
    #[arg(long = "package", short = 'p', value_name = "IMPORT-PATH")]
    pub packages: Vec<String>,

    /// Which terminal-status test lines to print.
    #[arg(long, value_enum)]
    pub show: Option<ShowFilterArg>,

    /// How much output detail to show per test.
    #[arg(long, short = 'v', value_enum)]
    pub verbosity: Option<VerbosityArg>,

    /// Which final report format to produce.
    #[arg(long, value_enum)]
    pub format: Option<ReportFormatArg>,

    /// Where to write the chosen report format; defaults to stdout.
    #[arg(long, value_name = "PATH")]
    pub output_file: Option<Utf8PathBuf>,

    /// Path to a coverage profile for the child toolchain to write;
    /// consumed for its summary line only, never produced by `gotcha`.
    #[arg(long, value_name = "PATH")]
    pub coverprofile: Option<Utf8PathBuf>,

    /// Emit a CI-comment artifact regardless of `--format`.
    #[arg(long)]
    pub alert: bool,

    /// Overall wall-clock budget before escalating from interrupt to kill.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<humantime::Duration>,

    /// Override the cache-derived expected test count.
    #[arg(long, value_name = "N")]
    pub expected_count: Option<usize>,

    /// Force color output on or off; defaults to auto-detection.
    #[arg(long, value_enum, default_value_t)]
    pub color: ColorArg,

    /// Directory holding `gotcha`'s dot-directory cache file; defaults to
    /// the current directory.
    #[arg(long, value_name = "PATH")]
    pub cache_root: Option<Utf8PathBuf>,

    /// Path to a config file, overriding `.config/gotcha.toml` discovery.
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<Utf8PathBuf>,

    /// Increase log verbosity; repeatable (`-vv`, `-vvv`). Independent of
    /// `--verbosity`, which controls per-test report detail, not the
    /// diagnostic log stream.
    #[arg(long = "log", short = 'l', action = clap::ArgAction::Count)]
    pub log_level: u8,

    /// Extra arguments forwarded to the child test binary after `--`.
    #[arg(last = true)]
    pub test_args: Vec<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ShowFilterArg {
    All,
    Failed,
    Passed,
    Skipped,
    None,
}

impl From<ShowFilterArg> for gotcha_runner::config::ShowFilter {
    fn from(value: ShowFilterArg) -> Self {
        use gotcha_runner::config::ShowFilter as F;
        match value {
            ShowFilterArg::All => F::All,
            ShowFilterArg::Failed => F::Failed,
            ShowFilterArg::Passed => F::Passed,
            ShowFilterArg::Skipped => F::Skipped,
            ShowFilterArg::None => F::None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum VerbosityArg {
    Minimal,
    Standard,
    WithOutput,
    Verbose,
}

impl From<VerbosityArg> for gotcha_runner::config::Verbosity {
    fn from(value: VerbosityArg) -> Self {
        use gotcha_runner::config::Verbosity as V;
        match value {
            VerbosityArg::Minimal => V::Minimal,
            VerbosityArg::Standard => V::Standard,
            VerbosityArg::WithOutput => V::WithOutput,
            VerbosityArg::Verbose => V::Verbose,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ReportFormatArg {
    Terminal,
    Markdown,
    Json,
    Github,
}

impl From<ReportFormatArg> for gotcha_runner::config::ReportFormat {
    fn from(value: ReportFormatArg) -> Self {
        use gotcha_runner::config::ReportFormat as R;
        match value {
            ReportFormatArg::Terminal => R::Terminal,
            ReportFormatArg::Markdown => R::Markdown,
            ReportFormatArg::Json => R::Json,
            ReportFormatArg::Github => R::Github,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum ColorArg {
    #[default]
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for gotcha_runner::config::ColorProfile {
    fn from(value: ColorArg) -> Self {
        use gotcha_runner::config::ColorProfile as C;
        match value {
            ColorArg::Auto => C::Auto,
            ColorArg::Always => C::Always,
            ColorArg::Never => C::Never,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_test_path_is_all_packages() {
        let args = CliArgs::parse_from(["gotcha"]);
        assert_eq!(args.test_path, "./...");
        assert!(args.packages.is_empty());
    }

    #[test]
    fn test_args_after_double_dash_are_collected() {
        let args = CliArgs::parse_from(["gotcha", "./...", "--", "-run", "TestFoo"]);
        assert_eq!(args.test_args, vec!["-run", "TestFoo"]);
    }

    #[test]
    fn repeated_package_flag_accumulates() {
        let args = CliArgs::parse_from(["gotcha", "-p", "./foo", "-p", "./bar"]);
        assert_eq!(args.packages, vec!["./foo", "./bar"]);
    }
}

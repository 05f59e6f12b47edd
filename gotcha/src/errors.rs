//! The expected-failure taxonomy for the `gotcha` binary (à la
//! cargo-nextest's `errors.rs`): every variant here is a failure that can
//! plausibly happen to a well-behaved user, gets a clean one-line
//! diagnostic instead of a backtrace, and maps to one of
//! `gotcha_metadata::GotchaExitCode`'s documented codes. Anything *not*
//! representable here is a bug and propagates through `color-eyre`
//! instead.

use camino::Utf8PathBuf;
use gotcha_metadata::GotchaExitCode;
use miette::Diagnostic;
use owo_colors::{OwoColorize, Stream};
use std::error::Error;
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// An error that occurred assembling or launching a run, as opposed to a
/// test failing during the run itself (that's not an error at all — it's
/// `GotchaExitCode::TEST_RUN_FAILED`, handled by `gotcha_runner::run`'s own
/// return value).
#[derive(Debug, Error, Diagnostic)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("failed to load configuration")]
    #[diagnostic(help("check the config file named by --config-file, or .config/gotcha.toml"))]
    ConfigLoadError {
        path: Option<Utf8PathBuf>,
        #[source]
        source: config::ConfigError,
    },

    #[error("could not determine the current directory")]
    CurrentDirUnavailable {
        #[source]
        source: std::io::Error,
    },

    #[error("could not create cache directory at {path}")]
    CacheDirCreateError {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start the child test process")]
    SpawnFailed {
        #[from]
        source: gotcha_runner::errors::ChildSpawnError,
    },
}

impl From<gotcha_runner::errors::RunError> for ExpectedError {
    fn from(value: gotcha_runner::errors::RunError) -> Self {
        use gotcha_runner::errors::RunError as R;
        match value {
            R::Spawn(source) => Self::SpawnFailed { source },
        }
    }
}

impl ExpectedError {
    /// The process exit code this failure should surface as.
    ///
    /// Only `SpawnFailed` gets its own documented code
    /// (`GotchaExitCode::SPAWN_FAILED`); every other expected error happens
    /// before a child process exists at all, so there's no test-failure
    /// vs. tool-failure distinction to preserve and `TEST_RUN_FAILED` is
    /// the closest honest answer ("the run did not produce a result").
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::SpawnFailed { .. } => GotchaExitCode::SPAWN_FAILED,
            Self::ConfigLoadError { .. } | Self::CurrentDirUnavailable { .. } | Self::CacheDirCreateError { .. } => GotchaExitCode::TEST_RUN_FAILED,
        }
    }

    /// Prints a clean, colorized one-line diagnostic (plus the source
    /// chain) to stderr, matching the teacher's split between "this is a
    /// bug" (color-eyre) and "this is an expected failure" (a single
    /// styled line).
    pub fn display_to_stderr(&self) {
        let header = self.to_string();
        eprintln!("{} {}", "error:".if_supports_color(Stream::Stderr, |s| s.red().bold()), header);

        let mut next_error: Option<&dyn Error> = self.source();
        while let Some(error) = next_error {
            eprintln!("  {} {}", "caused by:".if_supports_color(Stream::Stderr, |s| s.dimmed()), error);
            next_error = error.source();
        }
    }
}

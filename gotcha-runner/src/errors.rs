//! Error taxonomy for `gotcha-runner`.
//!
//! Most of the failure modes in spec.md §7 are *not* `Result::Err` values:
//! malformed events, buffer overflows, and emitter budget overruns are all
//! represented as data (synthetic events, degraded output) rather than
//! propagated as errors, because the whole point of the decoder and the
//! reporters is to never abort a run over bad input. What's left here are
//! the handful of failures that really do need to stop or redirect control
//! flow: spawning the child and acquiring the cache. Terminal and signal
//! handler setup can fail too, but both degrade in place instead (a
//! `tracing::warn!` and reduced functionality), so they carry no error
//! type here.

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Failure to launch the child toolchain process at all.
///
/// Per spec.md §4.6/§7, this is fatal: exit code 2, diagnostic emitted, no
/// cache write attempted.
#[derive(Debug, Error)]
#[error("failed to start `{program}`")]
pub struct ChildSpawnError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Failures from the cache store.
///
/// Every variant here is soft per spec.md §7 (`CacheLockTimeout` and
/// `CacheSchemaMismatch` both resolve to "treat the cache as absent and
/// continue"); the orchestrator never surfaces these to the user as fatal,
/// but they're still distinguished so `tracing::warn!` can say why the
/// cache was skipped.
#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("could not acquire the cache lock within the configured timeout")]
    LockTimeout,

    #[error("cache file has schema version {found}, expected {expected}")]
    #[diagnostic(help("the cache file will be discarded and rebuilt from this run"))]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("failed to read cache file at {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse cache file at {path}")]
    #[diagnostic(help("the cache file will be discarded and rebuilt from this run"))]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write cache file at {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The top-level error type for a single orchestrated run.
///
/// Only the truly fatal cases appear here; everything recoverable is
/// folded into the `Summary` instead (spec.md §7: "every stream-time
/// failure is represented in the final Summary so CI always receives an
/// explanation"). Terminal/signal setup failures are not among them: both
/// degrade in place (`tui::RawModeGuard::enable`, the orchestrator's input
/// watcher) rather than aborting the run, so there is no fatal variant for
/// either here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Spawn(#[from] ChildSpawnError),
}

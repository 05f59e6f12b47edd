//! Layered configuration loading (SPEC_FULL.md's "Configuration" section).
//!
//! Mirrors `NextestConfig`'s layering
//! (`examples/nextest-rs-nextest/nextest-runner/src/config/config_impl.rs`):
//! a baked-in `default-config.toml` layered under an optional repo-level
//! `.config/gotcha.toml`, composed with the `config` crate and deserialized
//! once into [`FileConfig`]. CLI flags (parsed separately in `cli.rs`) are
//! the final, highest-priority layer and are merged on top of this in
//! `main.rs`.

use bytesize::ByteSize;
use camino::Utf8Path;
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

use crate::errors::ExpectedError;

/// Default location of the repo-level config file, relative to the
/// invocation root.
pub const CONFIG_PATH: &str = ".config/gotcha.toml";

const DEFAULT_CONFIG: &str = include_str!("../default-config.toml");

/// The subset of `RunConfig` that can be set from a config file or
/// environment variable, all optional so the CLI (and the defaults layer
/// below it) can fill in whatever's missing.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub show: Option<String>,
    pub verbosity: Option<String>,
    pub format: Option<String>,
    pub alert: Option<bool>,
    pub expected_count: Option<usize>,
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
    pub test_output_buffer_cap: Option<ByteSize>,
    pub max_line_len: Option<ByteSize>,
    pub backpressure_cap: Option<ByteSize>,
    #[serde(default, with = "humantime_serde::option")]
    pub cache_max_age: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub cache_lock_timeout: Option<Duration>,
    pub ci_comment_byte_budget: Option<usize>,
}

/// Loads the layered config: the baked-in defaults, then the repo file
/// (explicit path if given, else `.config/gotcha.toml` relative to `root`,
/// not required to exist).
pub fn load(root: &Utf8Path, explicit_path: Option<&Utf8Path>) -> Result<FileConfig, ExpectedError> {
    let repo_file = match explicit_path {
        Some(path) => File::new(path.as_str(), FileFormat::Toml),
        None => {
            let default_path = root.join(CONFIG_PATH);
            File::new(default_path.as_str(), FileFormat::Toml).required(false)
        }
    };

    let merged = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(repo_file)
        .build()
        .map_err(|source| ExpectedError::ConfigLoadError {
            path: explicit_path.map(|p| p.to_owned()),
            source,
        })?;

    merged
        .try_deserialize()
        .map_err(|source| ExpectedError::ConfigLoadError {
            path: explicit_path.map(|p| p.to_owned()),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn defaults_load_without_a_repo_file() {
        let root = Utf8PathBuf::from("/nonexistent-gotcha-test-root");
        let config = load(&root, None).expect("default-config.toml alone must parse");
        assert_eq!(config.show.as_deref(), Some("failed"));
        assert_eq!(config.ci_comment_byte_budget, Some(65_536));
        assert_eq!(config.cache_max_age, Some(Duration::from_secs(24 * 60 * 60)));
    }

    #[test]
    fn repo_file_overrides_defaults() {
        let dir = camino_tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gotcha.toml"), "alert = true\nshow = \"all\"\n").unwrap();
        let config = load(dir.path(), Some(&dir.path().join("gotcha.toml"))).unwrap();
        assert_eq!(config.alert, Some(true));
        assert_eq!(config.show.as_deref(), Some("all"));
    }
}

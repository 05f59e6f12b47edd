//! The progress-estimation cache (spec.md §3/§4.3, component C3).
//!
//! A file-backed mapping from a run-pattern fingerprint to the estimated
//! test count and package inventory the previous matching run observed.
//! Read once at orchestrator startup, written once at clean run end; never
//! touched mid-run.
//!
//! Locking is a plain sentinel lock file rather than an OS-level `flock`:
//! the cache is a soft-failure resource everywhere it's used (spec.md §7:
//! `CacheLockTimeout` just means "treat the cache as absent"), so a
//! create-and-retry loop with a timeout gives the same observable behavior
//! without an extra platform-specific dependency.

use atomicwrites::{AllowOverwrite, AtomicFile};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use gotcha_metadata::{
    CacheEntrySummary, CacheFileSummary, CachePackageEntry, CACHE_SCHEMA_VERSION,
};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;
use xxhash_rust::xxh3::Xxh3;

use crate::errors::CacheError;
use crate::state::RunState;

const LOCK_FILE_NAME: &str = "cache.lock";
const CACHE_FILE_NAME: &str = "cache.json";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Computes the fingerprint that keys a cache entry: the pattern list, the
/// explicit package filter, and the toolchain root's mtime, hashed together
/// so a changed source tree invalidates the estimate (spec.md §3, glossary
/// "Fingerprint").
pub fn fingerprint(patterns: &[String], packages: &[String], toolchain_root_mtime: i64) -> u64 {
    let mut hasher = Xxh3::new();
    for pattern in patterns {
        hasher.update(pattern.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"\x01");
    for package in packages {
        hasher.update(package.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"\x02");
    hasher.update(&toolchain_root_mtime.to_le_bytes());
    hasher.digest()
}

/// A read estimate from a matching cache entry, handed to the progress
/// estimator.
#[derive(Clone, Debug)]
pub struct CacheEstimate {
    pub estimated_count: usize,
    pub package_inventory: BTreeMap<SmolStr, usize>,
}

/// The file-backed cache store (spec.md §4.3, component C3).
pub struct CacheStore {
    dir: Utf8PathBuf,
    max_age: Duration,
    lock_timeout: Duration,
}

impl CacheStore {
    pub fn new(dir: Utf8PathBuf, max_age: Duration, lock_timeout: Duration) -> Self {
        Self {
            dir,
            max_age,
            lock_timeout,
        }
    }

    fn lock_path(&self) -> Utf8PathBuf {
        self.dir.join(LOCK_FILE_NAME)
    }

    fn cache_path(&self) -> Utf8PathBuf {
        self.dir.join(CACHE_FILE_NAME)
    }

    /// Acquire the advisory lock, run `f` with it held, then release.
    ///
    /// Returns `Ok(None)` (not an error) on a lock timeout: the cache is a
    /// soft-failure resource, per spec.md §7's `CacheLockTimeout`.
    async fn with_lock<T>(
        &self,
        f: impl FnOnce() -> Result<T, CacheError>,
    ) -> Result<Option<T>, CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| CacheError::Write {
            path: self.cache_path(),
            source,
        })?;

        let lock_path = self.lock_path();
        let deadline = tokio::time::Instant::now() + self.lock_timeout;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_guard) => {
                    let result = f();
                    let _ = std::fs::remove_file(&lock_path);
                    return result.map(Some);
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if tokio::time::Instant::now() >= deadline {
                        tracing::warn!("cache lock timed out, treating cache as absent");
                        return Ok(None);
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(source) => {
                    return Err(CacheError::Write {
                        path: lock_path,
                        source,
                    });
                }
            }
        }
    }

    /// Read the entry matching `fp`, if any unexpired one exists.
    ///
    /// Returns `None` on lock timeout, missing file, schema mismatch, or a
    /// stale (older than `max_age`) entry: every one of these is a soft
    /// failure (spec.md §7).
    pub async fn read(&self, fp: u64) -> Option<CacheEstimate> {
        let path = self.cache_path();
        let max_age = self.max_age;
        let result = self
            .with_lock(move || Self::read_locked(&path, fp, max_age))
            .await;
        match result {
            Ok(Some(estimate)) => estimate,
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "cache read failed, treating cache as absent");
                None
            }
        }
    }

    fn read_locked(
        path: &Utf8Path,
        fp: u64,
        max_age: Duration,
    ) -> Result<Option<CacheEstimate>, CacheError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        let file: CacheFileSummary = match serde_json::from_str(&text) {
            Ok(file) => file,
            Err(source) => {
                return Err(CacheError::Parse {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        if file.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::SchemaMismatch {
                found: file.schema_version,
                expected: CACHE_SCHEMA_VERSION,
            });
        }

        let now = Utc::now();
        let entry = file.entries.into_iter().find(|e| e.fingerprint == fp);
        let Some(entry) = entry else { return Ok(None) };

        if now.signed_duration_since(entry.recorded_at).to_std().unwrap_or(Duration::MAX) > max_age
        {
            return Ok(None);
        }

        Ok(Some(CacheEstimate {
            estimated_count: entry.estimated_count,
            package_inventory: entry
                .package_inventory
                .into_iter()
                .map(|(name, pkg)| (name, pkg.last_count))
                .collect(),
        }))
    }

    /// Upsert the entry for `fp` from the final [`RunState`], replacing any
    /// existing entry with the same fingerprint (spec.md §4.3: "replace the
    /// matching entry, truncate-and-rename to guarantee atomicity").
    ///
    /// Callers must only invoke this when the run terminated without
    /// cancellation and with exit code 0 or 1 (spec.md §3/§7's cache write
    /// discipline); this method doesn't re-check that itself.
    pub async fn write(&self, fp: u64, state: &RunState) {
        let path = self.cache_path();
        let entry = CacheEntrySummary {
            fingerprint: fp,
            estimated_count: state.counters.total_terminal(),
            package_inventory: state
                .packages
                .values()
                .map(|pkg| {
                    let (passed, failed, skipped, unknown) = pkg.leaf_counts();
                    (
                        pkg.name.clone(),
                        CachePackageEntry {
                            last_count: passed + failed + skipped + unknown,
                            last_seen_at: Utc::now(),
                        },
                    )
                })
                .collect(),
            recorded_at: Utc::now(),
        };

        let result = self.with_lock(move || Self::write_locked(&path, fp, entry)).await;
        match result {
            Ok(Some(())) | Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "cache write failed"),
        }
    }

    fn write_locked(path: &Utf8Path, fp: u64, entry: CacheEntrySummary) -> Result<(), CacheError> {
        let mut file = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|_| CacheFileSummary::empty()),
            Err(_) => CacheFileSummary::empty(),
        };
        if file.schema_version != CACHE_SCHEMA_VERSION {
            file = CacheFileSummary::empty();
        }
        file.entries.retain(|e| e.fingerprint != fp);
        file.entries.push(entry);

        let json = serde_json::to_string_pretty(&file).map_err(|source| CacheError::Parse {
            path: path.to_owned(),
            source,
        })?;

        let atomic = AtomicFile::new(path, AllowOverwrite);
        atomic
            .write(|f| f.write_all(json.as_bytes()))
            .map_err(|err| CacheError::Write {
                path: path.to_owned(),
                source: match err {
                    atomicwrites::Error::Internal(io) => io,
                    atomicwrites::Error::User(io) => io,
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;

    #[test]
    fn fingerprint_is_deterministic_and_sensitive_to_inputs() {
        let a = fingerprint(&["./...".into()], &[], 100);
        let b = fingerprint(&["./...".into()], &[], 100);
        let c = fingerprint(&["./foo".into()], &[], 100);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn read_on_empty_dir_returns_none() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(
            dir.path().to_owned(),
            Duration::from_secs(3600),
            Duration::from_millis(200),
        );
        assert!(store.read(1234).await.is_none());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(
            dir.path().to_owned(),
            Duration::from_secs(3600),
            Duration::from_millis(200),
        );
        let mut state = RunState::new();
        store.write(42, &state).await;
        let estimate = store.read(42).await;
        assert!(estimate.is_some());
        assert_eq!(estimate.unwrap().estimated_count, 0);

        // A different fingerprint still misses.
        assert!(store.read(43).await.is_none());
        let _ = &mut state; // keep state alive for clarity of intent
    }

    #[tokio::test]
    async fn stale_entry_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(
            dir.path().to_owned(),
            Duration::from_millis(0),
            Duration::from_millis(200),
        );
        let state = RunState::new();
        store.write(1, &state).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.read(1).await.is_none());
    }
}

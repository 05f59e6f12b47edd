use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// The schema version for the on-disk cache file.
///
/// Consumers that see a mismatched version must discard the file wholesale
/// (spec: "entries whose schemaVersion differs trigger full discard").
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// A single package's last-known test inventory, part of a
/// [`CacheEntrySummary`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CachePackageEntry {
    /// The number of tests last seen for this package.
    pub last_count: usize,
    /// When this package was last seen in a run matching this fingerprint.
    pub last_seen_at: DateTime<Utc>,
}

/// One cache entry: an estimated total test count plus a per-package
/// breakdown, keyed externally by a fingerprint hash (see
/// `gotcha_runner::cache::fingerprint`).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheEntrySummary {
    /// The fingerprint this entry was recorded under, stored alongside the
    /// entry (rather than solely as a map key) so the file can be audited
    /// or replayed independent of the in-memory map representation.
    pub fingerprint: u64,
    /// The estimated total number of tests the previous matching run saw.
    pub estimated_count: usize,
    /// Per-package inventory from the previous matching run, keyed by
    /// canonical package name.
    pub package_inventory: BTreeMap<SmolStr, CachePackageEntry>,
    /// When this entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// The whole cache file: a schema version tag plus a flat list of entries.
///
/// Stored as a single JSON document, replaced atomically on write (truncate
/// + rename) so a reader never observes a half-written file.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheFileSummary {
    /// Schema version; a mismatch here means "discard the whole file",
    /// never "best-effort parse what you can".
    pub schema_version: u32,
    /// All recorded entries. Small in practice (one per distinct
    /// pattern/filter/toolchain combination a project actually runs).
    pub entries: Vec<CacheEntrySummary>,
}

impl CacheFileSummary {
    /// An empty cache file at the current schema version.
    pub fn empty() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            entries: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_file_has_current_schema_version() {
        let file = CacheFileSummary::empty();
        assert_eq!(file.schema_version, CACHE_SCHEMA_VERSION);
        assert!(file.entries.is_empty());
    }

    #[test]
    fn cache_file_round_trips_through_json() {
        let mut file = CacheFileSummary::empty();
        file.entries.push(CacheEntrySummary {
            fingerprint: 0xdead_beef,
            estimated_count: 42,
            package_inventory: BTreeMap::new(),
            recorded_at: Utc::now(),
        });

        let json = serde_json::to_string_pretty(&file).unwrap();
        let back: CacheFileSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(file, back);
    }
}

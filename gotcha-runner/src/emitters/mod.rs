//! Report emitters (spec.md §4.8, component C8): pure functions from a
//! [`SummaryDocument`](gotcha_metadata::SummaryDocument) to a rendered
//! artifact, plus the one emitter (JSON passthrough) that's necessarily a
//! run-time tee rather than a post-hoc function of the summary (spec.md §6
//! treats it as "the raw event stream as received", not a derived report).

pub mod ci_comment;
pub mod console;
pub mod json;
pub mod markdown;

use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};
use smol_str::SmolStr;

/// Tag type for the UUID embedded in markdown/CI-comment artifacts, used
/// by external tooling to find and replace a prior run's comment rather
/// than piling up duplicates (spec.md §4.8: "A UUID comment marker is
/// embedded for deduplication").
#[derive(Debug)]
pub enum SummaryMarkerKind {}

impl TypedUuidKind for SummaryMarkerKind {
    fn tag() -> TypedUuidTag {
        static TAG: TypedUuidTag = TypedUuidTag::new("gotcha-summary");
        TAG
    }
}

/// The marker embedded as `<!-- summary-uuid: <uuid> -->` on its own line
/// at the top of the markdown and CI-comment artifacts.
pub type SummaryMarker = TypedUuid<SummaryMarkerKind>;

/// Context supplied by the (out-of-core) collaborator layer that the
/// emitters can't derive from a `SummaryDocument` alone: which packages
/// changed in this diff/commit (for the markdown hybrid strategy), and the
/// size knobs spec.md names as configurable.
///
/// Constructing this is the caller's job precisely because spec.md §9
/// treats "posting-strategy selection" as belonging to the CI collaborator,
/// not the core (see the Open Question note and `DESIGN.md`).
#[derive(Clone, Debug)]
pub struct ReportContext {
    /// The stable marker for this artifact, used for the dedup comment.
    /// Callers must supply the *same* marker across re-renders of the same
    /// logical comment for the emitter-idempotence property (spec.md §8)
    /// to hold; the emitter never mints its own.
    pub marker: SummaryMarker,
    /// Packages touched by the change under test, supplied by the CI
    /// collaborator (e.g. from a diff). Empty if unknown.
    pub changed_packages: Vec<SmolStr>,
    /// Above this many passed tests, the markdown emitter switches to the
    /// hybrid summarized view (spec.md §4.8, default 100).
    pub passed_listing_threshold: usize,
    /// How many of the slowest passed tests to list under the hybrid
    /// strategy.
    pub slowest_top_k: usize,
    /// Hard byte budget for the CI-comment emitter (spec.md §4.8, default
    /// 65536).
    pub ci_comment_byte_budget: usize,
}

impl ReportContext {
    pub fn new(marker: SummaryMarker) -> Self {
        Self {
            marker,
            changed_packages: Vec::new(),
            passed_listing_threshold: 100,
            slowest_top_k: 10,
            ci_comment_byte_budget: 65_536,
        }
    }
}

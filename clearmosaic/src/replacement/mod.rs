//! Temporal cloud replacement.
//!
//! Tiles whose dilated cloud fraction exceeds the limit are rebuilt from
//! older mosaics. For each window of the [`SearchPlan`], newest first, the
//! same tile is fetched from a mosaic registered for that window,
//! classified, and merged pixel by pixel into the running
//! [`ReplacementState`]:
//!
//! ```text
//!  window ─► register key ─► fetch companion + product ─► classify + dilate
//!                                                            │
//!        ┌───────────────── merge_candidate ◄────────────────┘
//!        ▼
//!  fraction < limit ? ── yes ─► Cleared
//!  similar ≥ max ?    ── yes ─► Stagnated
//!  next window (none left ─► Exhausted)
//! ```
//!
//! Fetch and registration failures skip a window. Classifier failures abort
//! the run.

mod merge;
mod pass;
mod plan;
mod search;

pub use merge::{merge_candidate, Candidate, MergeRule, MergeStats, ReplacementState, ALPHA_BAND};
pub use pass::{MaskTargets, ReplacementPass, ReplacementReport};
pub use plan::{SearchPlan, SearchWindows};
pub use search::{
    CandidateFetcher, CandidateTiles, IterationOutcome, SearchSummary, SkipReason,
    SourceCandidateFetcher, TemporalSearch, Termination, CANDIDATE_CLOUD_COVER,
};

//! Trailer selection-and-sequencing engine.
//!
//! Pure, deterministic pipeline from scored candidate records to an ordered
//! cut list: index and categorize, expand the style's phase budget, reserve
//! the best ending up front, select beats per phase, top up to the minimum,
//! evaluate the suspense curve, and place overlays. Media analysis and
//! rendering live with the callers on either side.

pub mod assembler;
pub mod backfill;
pub mod error;
pub mod hook;
pub mod index;
pub mod models;
pub mod overlay;
pub mod phases;
pub mod selector;
pub mod suspense;

pub use assembler::NarrativeAssembler;
pub use backfill::{BackfillOutcome, MinimumFillBackfiller};
pub use error::{InvalidCandidateError, NarrativeError, NarrativeResult};
pub use hook::{EndingReservation, HookFinalizer};
pub use index::CandidateIndex;
pub use models::{
    Beat, Candidate, CandidateRecord, Category, CharacterHint, NarrativeSequence, Phase,
    PhaseRole, SuspenseCurve, TensionPoint, TransitionStyle,
};
pub use overlay::OverlayAnnotator;
pub use phases::{PhaseBudgetPlanner, StyleLibrary};
pub use selector::{BeatSelector, SelectionState, SelectionStrategy};
pub use suspense::SuspenseCurveEvaluator;

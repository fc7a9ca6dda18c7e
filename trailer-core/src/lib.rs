pub mod config;
pub mod error;
pub mod narrative;

pub use config::{load_style_library, AssemblerConfig, EndingWeights, RankWeights, TensionWeights};
pub use error::{ConfigurationError, Result};
pub use narrative::{
    Beat, Candidate, CandidateIndex, CandidateRecord, Category, CharacterHint, NarrativeAssembler,
    NarrativeError, NarrativeResult, NarrativeSequence, Phase, PhaseBudgetPlanner, PhaseRole,
    StyleLibrary, SuspenseCurve, TransitionStyle,
};

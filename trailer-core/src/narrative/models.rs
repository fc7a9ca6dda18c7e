use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Content category a candidate can score in. Ordering is only used to keep
/// bucket iteration deterministic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Establishing,
    CharacterIntro,
    Dialogue,
    Action,
    Emotional,
    Tension,
    Spectacle,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Establishing,
        Category::CharacterIntro,
        Category::Dialogue,
        Category::Action,
        Category::Emotional,
        Category::Tension,
        Category::Spectacle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Establishing => "establishing",
            Category::CharacterIntro => "character_intro",
            Category::Dialogue => "dialogue",
            Category::Action => "action",
            Category::Emotional => "emotional",
            Category::Tension => "tension",
            Category::Spectacle => "spectacle",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "establishing" => Ok(Category::Establishing),
            "character_intro" => Ok(Category::CharacterIntro),
            "dialogue" => Ok(Category::Dialogue),
            "action" => Ok(Category::Action),
            "emotional" => Ok(Category::Emotional),
            "tension" => Ok(Category::Tension),
            "spectacle" => Ok(Category::Spectacle),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Structural role of a phase within the trailer arc. Styles may rename
/// phases freely; the role is what selection, suspense scaling and overlay
/// placement key off.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRole {
    Hook,
    World,
    Character,
    Conflict,
    ClimaxTease,
}

impl PhaseRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseRole::Hook => "hook",
            PhaseRole::World => "world",
            PhaseRole::Character => "character",
            PhaseRole::Conflict => "conflict",
            PhaseRole::ClimaxTease => "climax_tease",
        }
    }

    /// Suspense multiplier applied to the raw tension value of beats in this
    /// phase.
    pub fn tension_multiplier(&self) -> f64 {
        match self {
            PhaseRole::Hook => 0.7,
            PhaseRole::World => 0.4,
            PhaseRole::Character => 0.5,
            PhaseRole::Conflict => 0.8,
            PhaseRole::ClimaxTease => 1.0,
        }
    }

    /// Mid/late narrative phases grant a ranking bonus to dialogue-bearing
    /// candidates.
    pub fn favors_dialogue(&self) -> bool {
        matches!(
            self,
            PhaseRole::Character | PhaseRole::Conflict | PhaseRole::ClimaxTease
        )
    }
}

impl fmt::Display for PhaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visual transition applied between beats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    Cut,
    Fade,
    Dissolve,
    Flash,
    FadeToBlack,
}

impl TransitionStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionStyle::Cut => "cut",
            TransitionStyle::Fade => "fade",
            TransitionStyle::Dissolve => "dissolve",
            TransitionStyle::Flash => "flash",
            TransitionStyle::FadeToBlack => "fade_to_black",
        }
    }
}

impl fmt::Display for TransitionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw candidate record as produced by the upstream media analyzers. Time
/// fields stay optional here so ingestion can reject malformed records with a
/// precise error instead of failing deep inside scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateRecord {
    pub id: String,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    #[serde(default)]
    pub emotional_score: f64,
    #[serde(default)]
    pub action_score: f64,
    #[serde(default)]
    pub visual_highlight: bool,
    #[serde(default)]
    pub establishing: bool,
    #[serde(default)]
    pub has_dialogue: bool,
    #[serde(default)]
    pub dialogue_text: Option<String>,
    #[serde(default)]
    pub is_question: bool,
    #[serde(default)]
    pub spoiler_level: u8,
}

impl CandidateRecord {
    pub fn new(id: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            id: id.into(),
            start_time: Some(start_time),
            end_time: Some(end_time),
            emotional_score: 0.0,
            action_score: 0.0,
            visual_highlight: false,
            establishing: false,
            has_dialogue: false,
            dialogue_text: None,
            is_question: false,
            spoiler_level: 0,
        }
    }
}

/// A validated, categorized unit of source content. Immutable once built by
/// the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    /// Fraction of the way through the source timeline, clamped to [0, 1].
    pub position: f64,
    pub category_scores: BTreeMap<Category, f64>,
    pub primary_category: Category,
    pub primary_score: f64,
    pub emotional_score: f64,
    pub action_score: f64,
    pub has_dialogue: bool,
    pub dialogue_text: Option<String>,
    pub is_question: bool,
    pub spoiler_level: u8,
    /// Position in the original input list; final tie-break for ranking.
    pub input_order: usize,
}

impl Candidate {
    pub fn score_for(&self, category: Category) -> f64 {
        self.category_scores.get(&category).copied().unwrap_or(0.0)
    }

    pub fn word_count(&self) -> usize {
        self.dialogue_text
            .as_deref()
            .map(|text| text.split_whitespace().count())
            .unwrap_or(0)
    }
}

/// A named segment of the trailer structure with its own budget and
/// category preferences. Built from the static style table; never mutated at
/// runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    pub name: String,
    pub role: PhaseRole,
    /// Assigned by the planner from table position when omitted.
    #[serde(default)]
    pub order: usize,
    pub duration_ratio: f64,
    pub max_candidates: usize,
    pub preferred_categories: Vec<Category>,
    #[serde(default)]
    pub requires_dialogue: bool,
    #[serde(default)]
    pub allow_spoiler: bool,
    pub transition_style: TransitionStyle,
}

/// One selected-and-placed candidate in the final sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Beat {
    pub order: usize,
    pub candidate_id: String,
    pub phase_name: String,
    pub phase_role: PhaseRole,
    pub source_start: f64,
    pub source_end: f64,
    pub assigned_duration: f64,
    pub transition_in: TransitionStyle,
    pub transition_out: TransitionStyle,
    #[serde(default)]
    pub text_overlay: Option<String>,
    #[serde(default)]
    pub is_character_intro: bool,
    #[serde(default)]
    pub is_ending: bool,
    /// Human-readable scoring breakdown; informative only.
    pub rationale: String,
}

/// One sampled point of the suspense curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TensionPoint {
    pub beat_order: usize,
    /// Midpoint of the beat on the trailer timeline, in seconds.
    pub time: f64,
    pub tension: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuspenseCurve {
    pub points: Vec<TensionPoint>,
    /// Timeline position (0-1) of the maximum tension sample.
    pub peak_position: f64,
    /// 0-100 score of how close the peak sits to the ideal position.
    pub curve_quality: f64,
}

impl SuspenseCurve {
    pub fn empty() -> Self {
        Self {
            points: Vec::new(),
            peak_position: 0.0,
            curve_quality: 0.0,
        }
    }
}

/// Optional side-channel hint from a story analyzer. The engine must produce
/// a fully valid sequence without it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterHint {
    pub name: String,
    pub role: String,
    pub introduction_candidate_id: Option<String>,
}

/// Final ordered cut list handed to the downstream media assembler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrativeSequence {
    pub style: String,
    pub beats: Vec<Beat>,
    pub target_duration: f64,
    pub actual_duration: f64,
    pub suspense_curve: SuspenseCurve,
    /// 0-100 score of how much of the intended structure was realized.
    pub structure_quality: f64,
    /// 0-100 blended confidence in the output.
    pub confidence: f64,
    /// True when minimum counts, non-reuse or ending quality could not be
    /// fully met.
    pub degraded: bool,
}

impl NarrativeSequence {
    pub fn empty(style: impl Into<String>, target_duration: f64) -> Self {
        Self {
            style: style.into(),
            beats: Vec::new(),
            target_duration,
            actual_duration: 0.0,
            suspense_curve: SuspenseCurve::empty(),
            structure_quality: 0.0,
            confidence: 0.0,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().ok(), Some(category));
        }
    }

    #[test]
    fn phase_role_multipliers_follow_arc() {
        assert!(PhaseRole::World.tension_multiplier() < PhaseRole::Hook.tension_multiplier());
        assert!(PhaseRole::Conflict.tension_multiplier() < PhaseRole::ClimaxTease.tension_multiplier());
        assert_eq!(PhaseRole::ClimaxTease.tension_multiplier(), 1.0);
    }

    #[test]
    fn wire_format_uses_snake_case() {
        let json = serde_json::to_value(Category::CharacterIntro).unwrap();
        assert_eq!(json, serde_json::json!("character_intro"));
        let json = serde_json::to_value(TransitionStyle::FadeToBlack).unwrap();
        assert_eq!(json, serde_json::json!("fade_to_black"));

        // Analyzer records only carry the fields they know about.
        let record: CandidateRecord =
            serde_json::from_str(r#"{ "id": "clip", "start_time": 1.0, "end_time": 7.0 }"#)
                .unwrap();
        assert_eq!(record.spoiler_level, 0);
        assert!(!record.has_dialogue);
    }

    #[test]
    fn empty_sequence_is_degraded() {
        let sequence = NarrativeSequence::empty("dramatic", 60.0);
        assert!(sequence.degraded);
        assert_eq!(sequence.confidence, 0.0);
        assert!(sequence.beats.is_empty());
    }
}

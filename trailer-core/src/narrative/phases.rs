use std::collections::BTreeMap;

use crate::error::{ConfigurationError, Result};

use super::models::{Category, Phase, PhaseRole, TransitionStyle};

const RATIO_SUM_TOLERANCE: f64 = 0.01;

/// Named collection of validated phase tables. Builtins cover the three
/// production styles; external TOML tables may override or extend them.
#[derive(Debug, Clone)]
pub struct StyleLibrary {
    styles: BTreeMap<String, Vec<Phase>>,
}

impl StyleLibrary {
    pub fn builtin() -> Self {
        let mut styles = BTreeMap::new();
        styles.insert("dramatic".to_string(), dramatic_phases());
        styles.insert("action".to_string(), action_phases());
        styles.insert("emotional".to_string(), emotional_phases());
        Self { styles }
    }

    /// Validates and inserts a style, replacing any existing table with the
    /// same name. Phase order indices are assigned from table position.
    pub fn insert(&mut self, name: impl Into<String>, mut phases: Vec<Phase>) -> Result<()> {
        let name = name.into();
        validate_phases(&name, &phases)?;
        for (idx, phase) in phases.iter_mut().enumerate() {
            phase.order = idx;
        }
        self.styles.insert(name, phases);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.styles.contains_key(name)
    }

    pub fn style_names(&self) -> impl Iterator<Item = &str> {
        self.styles.keys().map(String::as_str)
    }

    pub fn phases(&self, name: &str) -> Option<&[Phase]> {
        self.styles.get(name).map(Vec::as_slice)
    }
}

/// Expands a style name into its ordered phase list.
#[derive(Debug, Clone)]
pub struct PhaseBudgetPlanner {
    library: StyleLibrary,
}

impl PhaseBudgetPlanner {
    pub fn new(library: StyleLibrary) -> Self {
        Self { library }
    }

    pub fn expand(&self, style: &str) -> Result<Vec<Phase>> {
        let phases = self
            .library
            .phases(style)
            .ok_or_else(|| ConfigurationError::UnknownStyle {
                name: style.to_string(),
            })?;
        // Builtins are validated at construction and external tables on
        // insert, but a caller may hand us a hand-built library.
        validate_phases(style, phases)?;
        Ok(phases.to_vec())
    }

    pub fn library(&self) -> &StyleLibrary {
        &self.library
    }
}

fn validate_phases(style: &str, phases: &[Phase]) -> Result<()> {
    if phases.is_empty() {
        return Err(ConfigurationError::EmptyPhases {
            style: style.to_string(),
        });
    }
    let sum: f64 = phases.iter().map(|phase| phase.duration_ratio).sum();
    if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
        return Err(ConfigurationError::RatioSum {
            style: style.to_string(),
            sum,
        });
    }
    for phase in phases {
        if phase.max_candidates == 0 {
            return Err(ConfigurationError::InvalidMaxCandidates {
                style: style.to_string(),
                phase: phase.name.clone(),
            });
        }
    }
    Ok(())
}

fn phase(
    name: &str,
    role: PhaseRole,
    order: usize,
    duration_ratio: f64,
    max_candidates: usize,
    preferred_categories: &[Category],
    requires_dialogue: bool,
    allow_spoiler: bool,
    transition_style: TransitionStyle,
) -> Phase {
    Phase {
        name: name.to_string(),
        role,
        order,
        duration_ratio,
        max_candidates,
        preferred_categories: preferred_categories.to_vec(),
        requires_dialogue,
        allow_spoiler,
        transition_style,
    }
}

fn dramatic_phases() -> Vec<Phase> {
    vec![
        phase(
            "hook",
            PhaseRole::Hook,
            0,
            0.15,
            2,
            &[Category::Establishing, Category::Spectacle],
            false,
            false,
            TransitionStyle::Cut,
        ),
        phase(
            "world",
            PhaseRole::World,
            1,
            0.20,
            3,
            &[Category::Establishing, Category::Action],
            false,
            false,
            TransitionStyle::Dissolve,
        ),
        phase(
            "character",
            PhaseRole::Character,
            2,
            0.20,
            3,
            &[Category::CharacterIntro, Category::Dialogue],
            true,
            false,
            TransitionStyle::Fade,
        ),
        phase(
            "conflict",
            PhaseRole::Conflict,
            3,
            0.30,
            4,
            &[Category::Tension, Category::Action, Category::Emotional],
            false,
            false,
            TransitionStyle::Cut,
        ),
        // The tease is the one builtin phase that may place retained
        // spoiler-zone clips.
        phase(
            "climax_tease",
            PhaseRole::ClimaxTease,
            4,
            0.15,
            2,
            &[Category::Tension, Category::Dialogue],
            true,
            true,
            TransitionStyle::Flash,
        ),
    ]
}

fn action_phases() -> Vec<Phase> {
    vec![
        phase(
            "cold_open",
            PhaseRole::Hook,
            0,
            0.20,
            2,
            &[Category::Spectacle, Category::Action],
            false,
            false,
            TransitionStyle::Cut,
        ),
        phase(
            "world",
            PhaseRole::World,
            1,
            0.15,
            2,
            &[Category::Establishing, Category::Spectacle],
            false,
            false,
            TransitionStyle::Cut,
        ),
        phase(
            "character",
            PhaseRole::Character,
            2,
            0.15,
            2,
            &[Category::CharacterIntro, Category::Dialogue],
            true,
            false,
            TransitionStyle::Fade,
        ),
        phase(
            "escalation",
            PhaseRole::Conflict,
            3,
            0.35,
            5,
            &[Category::Action, Category::Spectacle, Category::Tension],
            false,
            false,
            TransitionStyle::Cut,
        ),
        phase(
            "climax_tease",
            PhaseRole::ClimaxTease,
            4,
            0.15,
            2,
            &[Category::Tension, Category::Action],
            false,
            true,
            TransitionStyle::Flash,
        ),
    ]
}

fn emotional_phases() -> Vec<Phase> {
    vec![
        phase(
            "hook",
            PhaseRole::Hook,
            0,
            0.15,
            2,
            &[Category::Establishing, Category::Emotional],
            false,
            false,
            TransitionStyle::Fade,
        ),
        phase(
            "world",
            PhaseRole::World,
            1,
            0.15,
            2,
            &[Category::Establishing, Category::Dialogue],
            false,
            false,
            TransitionStyle::Dissolve,
        ),
        phase(
            "character",
            PhaseRole::Character,
            2,
            0.25,
            3,
            &[Category::CharacterIntro, Category::Emotional, Category::Dialogue],
            true,
            false,
            TransitionStyle::Fade,
        ),
        phase(
            "heartbreak",
            PhaseRole::Conflict,
            3,
            0.30,
            4,
            &[Category::Emotional, Category::Tension, Category::Dialogue],
            false,
            false,
            TransitionStyle::Dissolve,
        ),
        phase(
            "climax_tease",
            PhaseRole::ClimaxTease,
            4,
            0.15,
            2,
            &[Category::Emotional, Category::Tension],
            true,
            true,
            TransitionStyle::Fade,
        ),
    ]
}

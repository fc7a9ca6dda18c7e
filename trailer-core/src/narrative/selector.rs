use std::collections::HashSet;

use tracing::debug;

use crate::config::{AssemblerConfig, RankWeights};

use super::index::CandidateIndex;
use super::models::{Beat, Candidate, Phase, PhaseRole};

/// Phase duration budgets may be exceeded by this factor before selection
/// stops.
pub(crate) const PHASE_BUDGET_SLACK: f64 = 1.2;

/// Per-run selection bookkeeping, passed explicitly between components so a
/// run never touches shared state.
#[derive(Debug, Default, Clone)]
pub struct SelectionState {
    used: HashSet<usize>,
    reserved_ending: Option<usize>,
}

impl SelectionState {
    pub fn with_reserved_ending(reserved: Option<usize>) -> Self {
        Self {
            used: HashSet::new(),
            reserved_ending: reserved,
        }
    }

    pub fn reserved_ending(&self) -> Option<usize> {
        self.reserved_ending
    }

    pub fn mark_used(&mut self, idx: usize) {
        self.used.insert(idx);
    }

    pub fn is_available(&self, idx: usize) -> bool {
        !self.used.contains(&idx) && self.reserved_ending != Some(idx)
    }

    /// Unused dialogue-bearing candidates across every bucket.
    pub fn unused_dialogue_count(&self, index: &CandidateIndex) -> usize {
        index
            .dialogue_indices()
            .iter()
            .filter(|&&idx| self.is_available(idx))
            .count()
    }
}

/// Candidate pool tiers tried in order for each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Unused candidates filed under the phase's preferred categories.
    PreferredCategories,
    /// Every unused candidate, regardless of category.
    AllCategories,
}

/// Shared ranking formula: primary category score plus a weighted emotional
/// component, with dialogue and question bonuses depending on where in the
/// arc the candidate would land.
pub(crate) fn rank_score(
    candidate: &Candidate,
    weights: &RankWeights,
    dialogue_bonus: bool,
    question_bonus: bool,
) -> f64 {
    let mut score = candidate.primary_score + weights.emotional * candidate.emotional_score;
    if dialogue_bonus && candidate.has_dialogue {
        score += weights.dialogue_bonus;
    }
    if question_bonus && candidate.is_question {
        score += weights.question_bonus;
    }
    score
}

/// Trailer-timeline duration granted to a candidate, bounded by its natural
/// length and tiered by how strong its category score is.
pub(crate) fn clamp_duration(candidate: &Candidate) -> f64 {
    let ceiling = if candidate.primary_score >= 70.0 {
        7.0
    } else if candidate.primary_score >= 50.0 {
        5.0
    } else {
        4.0
    };
    candidate.duration.min(ceiling)
}

pub(crate) fn beat_from(candidate: &Candidate, phase: &Phase, rationale: String) -> Beat {
    Beat {
        order: 0, // renumbered by the assembler
        candidate_id: candidate.id.clone(),
        phase_name: phase.name.clone(),
        phase_role: phase.role,
        source_start: candidate.start_time,
        source_end: candidate.end_time,
        assigned_duration: clamp_duration(candidate),
        transition_in: phase.transition_style,
        transition_out: phase.transition_style,
        text_overlay: None,
        is_character_intro: false,
        is_ending: false,
        rationale,
    }
}

/// Greedy per-phase selection with explicit fallback tiers.
#[derive(Debug)]
pub struct BeatSelector<'a> {
    config: &'a AssemblerConfig,
}

impl<'a> BeatSelector<'a> {
    pub fn new(config: &'a AssemblerConfig) -> Self {
        Self { config }
    }

    /// Runs every phase in order against the shared pool. `beat_budget`
    /// bounds the total number of beats this pass may produce;
    /// `final_phase_reserve` is duration already committed to the reserved
    /// ending, charged against the final phase's budget so appending the
    /// ending cannot overspend it.
    pub fn run(
        &self,
        index: &CandidateIndex,
        phases: &[Phase],
        state: &mut SelectionState,
        beat_budget: usize,
        final_phase_reserve: f64,
    ) -> Vec<Beat> {
        let mut beats = Vec::new();
        for (pos, phase) in phases.iter().enumerate() {
            if beats.len() >= beat_budget {
                break;
            }
            let remaining = beat_budget - beats.len();
            let pre_spent = if pos + 1 == phases.len() {
                final_phase_reserve
            } else {
                0.0
            };
            let phase_beats = self.select_phase(index, phase, state, remaining, pre_spent);
            beats.extend(phase_beats);
        }
        beats
    }

    fn select_phase(
        &self,
        index: &CandidateIndex,
        phase: &Phase,
        state: &mut SelectionState,
        beat_budget: usize,
        pre_spent: f64,
    ) -> Vec<Beat> {
        let mut pool = self.pool(index, phase, state, SelectionStrategy::PreferredCategories);
        if pool.len() < phase.max_candidates {
            pool = self.pool(index, phase, state, SelectionStrategy::AllCategories);
        }

        // Soft dialogue requirement: only enforced while dialogue supply is
        // plentiful, so a scarce pool never starves the phase.
        if phase.requires_dialogue
            && state.unused_dialogue_count(index) >= self.config.min_dialogue_pool
        {
            pool.retain(|&idx| index.get(idx).has_dialogue);
        }

        debug!(
            target: "narrative.selector",
            phase = %phase.name,
            pool = pool.len(),
            "phase pool assembled"
        );

        let mut ranked: Vec<(usize, f64)> = pool
            .into_iter()
            .map(|idx| {
                let candidate = index.get(idx);
                let score = rank_score(
                    candidate,
                    &self.config.rank,
                    phase.role.favors_dialogue(),
                    phase.role == PhaseRole::ClimaxTease,
                );
                (idx, score)
            })
            .collect();
        ranked.sort_by(|a, b| {
            let ca = index.get(a.0);
            let cb = index.get(b.0);
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    ca.start_time
                        .partial_cmp(&cb.start_time)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(ca.input_order.cmp(&cb.input_order))
        });

        let cap = self.config.target_duration_s * phase.duration_ratio * PHASE_BUDGET_SLACK;
        let mut spent = pre_spent;
        let mut beats = Vec::new();
        for (idx, score) in ranked {
            if beats.len() >= phase.max_candidates || beats.len() >= beat_budget {
                break;
            }
            let candidate = index.get(idx);
            let assigned = clamp_duration(candidate);
            if spent + assigned > cap {
                break;
            }
            let rationale = format!(
                "phase={} cat={} rank={:.1} base={:.1} emotional={:.1}",
                phase.name,
                candidate.primary_category,
                score,
                candidate.primary_score,
                candidate.emotional_score
            );
            beats.push(beat_from(candidate, phase, rationale));
            state.mark_used(idx);
            spent += assigned;
        }
        beats
    }

    fn pool(
        &self,
        index: &CandidateIndex,
        phase: &Phase,
        state: &SelectionState,
        strategy: SelectionStrategy,
    ) -> Vec<usize> {
        // Retained spoiler-zone candidates are only visible to phases that
        // opted in.
        let eligible = |idx: usize| {
            state.is_available(idx)
                && (phase.allow_spoiler
                    || index.get(idx).position <= self.config.spoiler_cutoff)
        };
        match strategy {
            SelectionStrategy::PreferredCategories => {
                let mut seen = HashSet::new();
                let mut pool = Vec::new();
                for &category in &phase.preferred_categories {
                    for &idx in index.bucket(category) {
                        if eligible(idx) && seen.insert(idx) {
                            pool.push(idx);
                        }
                    }
                }
                pool
            }
            SelectionStrategy::AllCategories => {
                (0..index.len()).filter(|&idx| eligible(idx)).collect()
            }
        }
    }
}

use std::collections::{BTreeSet, HashMap};

use tracing::{info, warn};

use crate::config::AssemblerConfig;

use super::backfill::{renumber, MinimumFillBackfiller};
use super::error::NarrativeResult;
use super::hook::{EndingReservation, HookFinalizer};
use super::index::CandidateIndex;
use super::models::{
    Beat, Candidate, CandidateRecord, CharacterHint, NarrativeSequence, Phase, SuspenseCurve,
    TransitionStyle,
};
use super::phases::{PhaseBudgetPlanner, StyleLibrary};
use super::selector::{beat_from, clamp_duration, BeatSelector, SelectionState};
use super::suspense::SuspenseCurveEvaluator;
use super::overlay::OverlayAnnotator;

/// Top-level orchestrator. A pure function of its inputs: every run builds
/// its own index and selection state, so parallel runs across styles need no
/// synchronization.
#[derive(Debug)]
pub struct NarrativeAssembler {
    config: AssemblerConfig,
    planner: PhaseBudgetPlanner,
}

impl NarrativeAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self::with_library(config, StyleLibrary::builtin())
    }

    pub fn with_library(config: AssemblerConfig, library: StyleLibrary) -> Self {
        Self {
            config,
            planner: PhaseBudgetPlanner::new(library),
        }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Assembles one trailer sequence. Only configuration and schema
    /// problems are fatal; every data-sparsity condition degrades instead.
    pub fn assemble(
        &self,
        records: &[CandidateRecord],
        source_duration: f64,
        style: &str,
        hint: Option<&CharacterHint>,
    ) -> NarrativeResult<NarrativeSequence> {
        let phases = self.planner.expand(style)?;
        let index = CandidateIndex::build(
            records,
            source_duration,
            self.config.spoiler_cutoff,
            self.config.include_spoilers,
        )?;

        if index.is_empty() {
            warn!(target: "narrative", style, "empty candidate pool, returning degraded sequence");
            return Ok(NarrativeSequence::empty(style, self.config.target_duration_s));
        }

        let hook = HookFinalizer::new(self.config.ending.clone());
        let reservation = hook.reserve(&index, self.config.spoiler_cutoff);
        let mut state =
            SelectionState::with_reserved_ending(reservation.map(|r| r.candidate_index));
        let mut degraded = false;

        let beat_budget = if reservation.is_some() {
            self.config.max_beats.saturating_sub(1)
        } else {
            self.config.max_beats
        };
        // Charge the reserved ending's duration against the final phase so
        // appending it cannot push that phase past its cap.
        let ending_reserve = reservation
            .map(|r| clamp_duration(index.get(r.candidate_index)))
            .unwrap_or(0.0);
        let selector = BeatSelector::new(&self.config);
        let mut beats = selector.run(&index, &phases, &mut state, beat_budget, ending_reserve);

        match reservation {
            Some(reservation) => {
                beats.push(self.ending_beat(&index, &phases, reservation));
            }
            None => {
                // No eligible cliffhanger: promote whatever comes last.
                match beats.last_mut() {
                    Some(last) => {
                        last.is_ending = true;
                        last.transition_out = TransitionStyle::FadeToBlack;
                        degraded = true;
                    }
                    None => {
                        warn!(target: "narrative", style, "no beats selected, returning degraded sequence");
                        return Ok(NarrativeSequence::empty(
                            style,
                            self.config.target_duration_s,
                        ));
                    }
                }
            }
        }

        let backfill = MinimumFillBackfiller::new(&self.config);
        let outcome = backfill.run(&index, &phases, &mut state, &mut beats);
        degraded |= outcome.degrades();
        renumber(&mut beats);

        if let Some(hint) = hint {
            mark_character_intro(&mut beats, hint);
        }

        let evaluator = SuspenseCurveEvaluator::new(&self.config);
        let suspense_curve = evaluator.run(&index, &mut beats);

        OverlayAnnotator::new(&self.config).annotate(style, &mut beats);

        let actual_duration: f64 = beats.iter().map(|beat| beat.assigned_duration).sum();
        let by_id: HashMap<&str, &Candidate> = index
            .candidates()
            .iter()
            .map(|candidate| (candidate.id.as_str(), candidate))
            .collect();
        let structure_quality = structure_quality(&self.config, &phases, &beats, &by_id);
        let confidence = confidence(&suspense_curve, &beats, &by_id, hint);

        info!(
            target: "narrative",
            style,
            beats = beats.len(),
            actual_duration,
            structure_quality,
            confidence,
            degraded,
            "sequence assembled"
        );

        Ok(NarrativeSequence {
            style: style.to_string(),
            beats,
            target_duration: self.config.target_duration_s,
            actual_duration,
            suspense_curve,
            structure_quality,
            confidence,
            degraded,
        })
    }

    fn ending_beat(
        &self,
        index: &CandidateIndex,
        phases: &[Phase],
        reservation: EndingReservation,
    ) -> Beat {
        let candidate = index.get(reservation.candidate_index);
        // The ending belongs to the final phase of the arc.
        let phase = phases.last().expect("phase table validated non-empty");
        let rationale = format!(
            "ending score={:.1} question={}",
            reservation.score, reservation.is_question
        );
        let mut beat = beat_from(candidate, phase, rationale);
        beat.is_ending = true;
        beat.transition_out = TransitionStyle::FadeToBlack;
        beat
    }
}

fn mark_character_intro(beats: &mut [Beat], hint: &CharacterHint) {
    let Some(intro_id) = hint.introduction_candidate_id.as_deref() else {
        return;
    };
    for beat in beats.iter_mut() {
        if beat.candidate_id == intro_id {
            beat.is_character_intro = true;
            break;
        }
    }
}

fn structure_quality(
    config: &AssemblerConfig,
    phases: &[Phase],
    beats: &[Beat],
    by_id: &HashMap<&str, &Candidate>,
) -> f64 {
    if beats.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;
    let represented = phases
        .iter()
        .filter(|phase| beats.iter().any(|beat| beat.phase_name == phase.name))
        .count();
    score += represented as f64 * 8.0;

    if beats.iter().any(|beat| beat.is_character_intro) {
        score += 10.0;
    }

    if let Some(ending) = beats.iter().find(|beat| beat.is_ending) {
        if let Some(candidate) = by_id.get(ending.candidate_id.as_str()) {
            let has_mark = candidate
                .dialogue_text
                .as_deref()
                .map(|text| text.contains('?'))
                .unwrap_or(false);
            if has_mark {
                score += 15.0;
            } else if candidate.is_question {
                score += 10.0;
            }
        }
    }

    let dialogue_beats = beats
        .iter()
        .filter(|beat| {
            by_id
                .get(beat.candidate_id.as_str())
                .map(|candidate| candidate.has_dialogue)
                .unwrap_or(false)
        })
        .count();
    let dialogue_ratio = dialogue_beats as f64 / beats.len() as f64;
    if (0.3..=0.6).contains(&dialogue_ratio) {
        score += 10.0;
    }

    if (config.min_beats..=config.max_beats).contains(&beats.len()) {
        score += 5.0;
    }

    score.min(100.0)
}

fn confidence(
    curve: &SuspenseCurve,
    beats: &[Beat],
    by_id: &HashMap<&str, &Candidate>,
    hint: Option<&CharacterHint>,
) -> f64 {
    if beats.is_empty() {
        return 0.0;
    }

    let ending_strength = beats
        .iter()
        .find(|beat| beat.is_ending)
        .and_then(|beat| by_id.get(beat.candidate_id.as_str()))
        .map(|candidate| {
            let has_mark = candidate
                .dialogue_text
                .as_deref()
                .map(|text| text.contains('?'))
                .unwrap_or(false);
            if has_mark {
                100.0
            } else if candidate.is_question {
                70.0
            } else {
                30.0
            }
        })
        .unwrap_or(0.0);

    let categories: BTreeSet<_> = beats
        .iter()
        .filter_map(|beat| by_id.get(beat.candidate_id.as_str()))
        .map(|candidate| candidate.primary_category)
        .collect();
    let diversity = categories.len() as f64 / 7.0 * 100.0;

    let hint_richness = match hint {
        Some(_) if beats.iter().any(|beat| beat.is_character_intro) => 100.0,
        Some(_) => 50.0,
        None => 25.0,
    };

    let blended = 0.4 * curve.curve_quality
        + 0.25 * ending_strength
        + 0.2 * diversity
        + 0.15 * hint_richness;
    blended.min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialogue_record(id: &str, start: f64, text: &str) -> CandidateRecord {
        let mut record = CandidateRecord::new(id, start, start + 5.0);
        record.has_dialogue = true;
        record.dialogue_text = Some(text.into());
        record
    }

    fn action_record(id: &str, start: f64, score: f64) -> CandidateRecord {
        let mut record = CandidateRecord::new(id, start, start + 5.0);
        record.action_score = score;
        record
    }

    fn sample_pool() -> Vec<CandidateRecord> {
        let mut records = Vec::new();
        records.push(action_record("open", 5.0, 70.0));
        records.push(dialogue_record("meet", 30.0, "my name is mara"));
        records.push(dialogue_record("warn", 80.0, "they know where we live"));
        records.push(action_record("chase", 100.0, 85.0));
        records.push(action_record("clash", 120.0, 90.0));
        records.push(dialogue_record("hook", 110.0, "what do we do now?"));
        records
    }

    #[test]
    fn assembles_ending_from_question_line() {
        let assembler = NarrativeAssembler::new(AssemblerConfig {
            min_beats: 3,
            ..AssemblerConfig::default()
        });
        let sequence = assembler
            .assemble(&sample_pool(), 200.0, "dramatic", None)
            .unwrap();
        let ending = sequence.beats.last().unwrap();
        assert!(ending.is_ending);
        assert_eq!(ending.candidate_id, "hook");
        assert_eq!(ending.transition_out, TransitionStyle::FadeToBlack);
    }

    #[test]
    fn empty_input_returns_degraded_sequence() {
        let assembler = NarrativeAssembler::new(AssemblerConfig::default());
        let sequence = assembler.assemble(&[], 200.0, "dramatic", None).unwrap();
        assert!(sequence.beats.is_empty());
        assert_eq!(sequence.confidence, 0.0);
        assert!(sequence.degraded);
    }

    #[test]
    fn no_dialogue_pool_promotes_last_beat_to_ending() {
        let records = vec![
            action_record("a", 20.0, 80.0),
            action_record("b", 60.0, 85.0),
        ];
        let assembler = NarrativeAssembler::new(AssemblerConfig {
            min_beats: 2,
            ..AssemblerConfig::default()
        });
        let sequence = assembler.assemble(&records, 200.0, "action", None).unwrap();
        assert!(sequence.degraded);
        assert!(sequence.beats.last().unwrap().is_ending);
    }

    #[test]
    fn character_hint_marks_intro_beat() {
        let hint = CharacterHint {
            name: "Mara".into(),
            role: "protagonist".into(),
            introduction_candidate_id: Some("meet".into()),
        };
        let assembler = NarrativeAssembler::new(AssemblerConfig {
            min_beats: 3,
            ..AssemblerConfig::default()
        });
        let sequence = assembler
            .assemble(&sample_pool(), 200.0, "dramatic", Some(&hint))
            .unwrap();
        let intro_beats: Vec<_> = sequence
            .beats
            .iter()
            .filter(|beat| beat.is_character_intro)
            .collect();
        assert_eq!(intro_beats.len(), 1);
        assert_eq!(intro_beats[0].candidate_id, "meet");
    }

    #[test]
    fn unknown_style_is_fatal() {
        let assembler = NarrativeAssembler::new(AssemblerConfig::default());
        let err = assembler
            .assemble(&sample_pool(), 200.0, "noir", None)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::narrative::NarrativeError::Configuration(_)
        ));
    }

    #[test]
    fn structure_quality_rewards_question_ending() {
        let assembler = NarrativeAssembler::new(AssemblerConfig {
            min_beats: 3,
            ..AssemblerConfig::default()
        });
        let with_question = assembler
            .assemble(&sample_pool(), 200.0, "dramatic", None)
            .unwrap();

        let mut pool = sample_pool();
        pool.retain(|record| record.id != "hook");
        let without_question = assembler
            .assemble(&pool, 200.0, "dramatic", None)
            .unwrap();
        assert!(with_question.structure_quality > without_question.structure_quality);
    }
}

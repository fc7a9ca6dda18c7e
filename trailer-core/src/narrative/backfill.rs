use tracing::{debug, warn};

use crate::config::AssemblerConfig;

use super::index::CandidateIndex;
use super::models::{Beat, Phase};
use super::selector::{beat_from, clamp_duration, rank_score, SelectionState, PHASE_BUDGET_SLACK};

/// What the top-up pass did; the assembler folds this into the `degraded`
/// flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillOutcome {
    pub added: usize,
    pub reused: usize,
    /// True when the minimum beat count still could not be reached.
    pub shortfall: bool,
}

impl BackfillOutcome {
    pub fn degrades(&self) -> bool {
        self.reused > 0 || self.shortfall
    }
}

/// Tops the sequence up to the configured minimum beat count from globally
/// ranked leftovers. Each insert lands at the end of the latest phase that
/// still has budget headroom, so the per-phase duration cap keeps holding.
#[derive(Debug)]
pub struct MinimumFillBackfiller<'a> {
    config: &'a AssemblerConfig,
}

impl<'a> MinimumFillBackfiller<'a> {
    pub fn new(config: &'a AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        index: &CandidateIndex,
        phases: &[Phase],
        state: &mut SelectionState,
        beats: &mut Vec<Beat>,
    ) -> BackfillOutcome {
        let mut outcome = BackfillOutcome::default();
        if beats.len() >= self.config.min_beats || beats.is_empty() {
            return outcome;
        }

        let ranked = self.ranked_unused(index, state);
        for idx in ranked {
            if beats.len() >= self.config.min_beats {
                break;
            }
            // A candidate that fits no phase is skipped; a shorter one
            // further down may still fit.
            if self.try_insert(index, phases, beats, idx) {
                state.mark_used(idx);
                outcome.added += 1;
            }
        }

        if beats.len() < self.config.min_beats && self.config.reuse_on_shortfall {
            // Last resort: cycle the strongest already-used candidates. The
            // result is explicitly degraded.
            let ranked_all = self.ranked_all(index, state);
            let mut cursor = 0;
            let mut stalled = 0;
            while beats.len() < self.config.min_beats
                && !ranked_all.is_empty()
                && stalled < ranked_all.len()
            {
                let idx = ranked_all[cursor % ranked_all.len()];
                if self.try_insert(index, phases, beats, idx) {
                    outcome.reused += 1;
                    stalled = 0;
                } else {
                    stalled += 1;
                }
                cursor += 1;
            }
        }

        outcome.shortfall = beats.len() < self.config.min_beats;
        renumber(beats);

        if outcome.shortfall {
            warn!(
                target: "narrative",
                beats = beats.len(),
                minimum = self.config.min_beats,
                "candidate pool exhausted below minimum beat count"
            );
        } else if outcome.added > 0 || outcome.reused > 0 {
            debug!(
                target: "narrative",
                added = outcome.added,
                reused = outcome.reused,
                "minimum fill applied"
            );
        }

        outcome
    }

    fn ranked_unused(&self, index: &CandidateIndex, state: &SelectionState) -> Vec<usize> {
        let pool: Vec<usize> = (0..index.len())
            .filter(|&idx| state.is_available(idx))
            .collect();
        self.rank(index, pool)
    }

    fn ranked_all(&self, index: &CandidateIndex, state: &SelectionState) -> Vec<usize> {
        let pool: Vec<usize> = (0..index.len())
            .filter(|&idx| state.reserved_ending() != Some(idx))
            .collect();
        self.rank(index, pool)
    }

    fn rank(&self, index: &CandidateIndex, pool: Vec<usize>) -> Vec<usize> {
        let mut ranked: Vec<(usize, f64)> = pool
            .into_iter()
            .map(|idx| {
                let score = rank_score(index.get(idx), &self.config.rank, true, true);
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
        ranked.into_iter().map(|(idx, _)| idx).collect()
    }

    /// Walks phases from the back and files the candidate into the first
    /// one with budget headroom, positioned so phase order stays monotonic
    /// and the ending stays last. Returns false when no phase can absorb
    /// the candidate.
    fn try_insert(
        &self,
        index: &CandidateIndex,
        phases: &[Phase],
        beats: &mut Vec<Beat>,
        idx: usize,
    ) -> bool {
        let candidate = index.get(idx);
        let assigned = clamp_duration(candidate);

        // A promoted ending may sit in an early phase; nothing may be filed
        // into a phase after it.
        let max_order = beats
            .last()
            .filter(|beat| beat.is_ending)
            .map(|beat| phase_order(phases, &beat.phase_name))
            .unwrap_or(usize::MAX);

        for phase in phases.iter().rev() {
            if phase.order > max_order {
                continue;
            }
            if !phase.allow_spoiler && candidate.position > self.config.spoiler_cutoff {
                continue;
            }
            let spent: f64 = beats
                .iter()
                .filter(|beat| beat.phase_name == phase.name)
                .map(|beat| beat.assigned_duration)
                .sum();
            let cap = self.config.target_duration_s * phase.duration_ratio * PHASE_BUDGET_SLACK;
            if spent + assigned > cap {
                continue;
            }

            let position = beats
                .iter()
                .position(|beat| beat.is_ending || phase_order(phases, &beat.phase_name) > phase.order)
                .unwrap_or(beats.len());
            let rationale = format!(
                "backfill cat={} base={:.1}",
                candidate.primary_category, candidate.primary_score
            );
            beats.insert(position, beat_from(candidate, phase, rationale));
            return true;
        }
        false
    }
}

fn phase_order(phases: &[Phase], name: &str) -> usize {
    phases
        .iter()
        .find(|phase| phase.name == name)
        .map(|phase| phase.order)
        .unwrap_or(usize::MAX)
}

pub(crate) fn renumber(beats: &mut [Beat]) {
    for (order, beat) in beats.iter_mut().enumerate() {
        beat.order = order;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::models::{CandidateRecord, PhaseRole, TransitionStyle};
    use crate::narrative::phases::StyleLibrary;

    fn record(id: &str, start: f64) -> CandidateRecord {
        CandidateRecord::new(id, start, start + 6.0)
    }

    fn dramatic_phases() -> Vec<Phase> {
        StyleLibrary::builtin().phases("dramatic").unwrap().to_vec()
    }

    fn bare_phase(name: &str, order: usize, duration_ratio: f64) -> Phase {
        Phase {
            name: name.into(),
            role: PhaseRole::Conflict,
            order,
            duration_ratio,
            max_candidates: 4,
            preferred_categories: Vec::new(),
            requires_dialogue: false,
            allow_spoiler: false,
            transition_style: TransitionStyle::Cut,
        }
    }

    fn phase_spend(beats: &[Beat], name: &str) -> f64 {
        beats
            .iter()
            .filter(|beat| beat.phase_name == name)
            .map(|beat| beat.assigned_duration)
            .sum()
    }

    fn ending_beat(candidate_id: &str) -> Beat {
        Beat {
            order: 0,
            candidate_id: candidate_id.into(),
            phase_name: "climax_tease".into(),
            phase_role: PhaseRole::ClimaxTease,
            source_start: 50.0,
            source_end: 55.0,
            assigned_duration: 5.0,
            transition_in: TransitionStyle::Flash,
            transition_out: TransitionStyle::FadeToBlack,
            text_overlay: None,
            is_character_intro: false,
            is_ending: true,
            rationale: "ending".into(),
        }
    }

    #[test]
    fn fills_before_ending_until_minimum() {
        let records: Vec<CandidateRecord> =
            (0..6).map(|i| record(&format!("c{i}"), 20.0 + i as f64 * 8.0)).collect();
        let index = CandidateIndex::build(&records, 100.0, 0.85, false).unwrap();
        let config = AssemblerConfig {
            min_beats: 5,
            ..AssemblerConfig::default()
        };
        let mut state = SelectionState::default();
        let mut beats = vec![ending_beat("end")];
        let outcome = MinimumFillBackfiller::new(&config).run(&index, &dramatic_phases(), &mut state, &mut beats);
        assert_eq!(beats.len(), 5);
        assert_eq!(outcome.added, 4);
        assert!(!outcome.degrades());
        assert!(beats.last().unwrap().is_ending);
        let orders: Vec<usize> = beats.iter().map(|b| b.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn exhausted_pool_reports_shortfall() {
        let records = vec![record("only", 30.0)];
        let index = CandidateIndex::build(&records, 100.0, 0.85, false).unwrap();
        let config = AssemblerConfig {
            min_beats: 5,
            ..AssemblerConfig::default()
        };
        let mut state = SelectionState::default();
        let mut beats = vec![ending_beat("end")];
        let outcome = MinimumFillBackfiller::new(&config).run(&index, &dramatic_phases(), &mut state, &mut beats);
        assert_eq!(beats.len(), 2);
        assert!(outcome.shortfall);
        assert!(outcome.degrades());
    }

    #[test]
    fn reuse_fills_when_enabled_and_flags_degraded() {
        let records = vec![record("a", 30.0), record("b", 40.0)];
        let index = CandidateIndex::build(&records, 100.0, 0.85, false).unwrap();
        let config = AssemblerConfig {
            min_beats: 6,
            reuse_on_shortfall: true,
            ..AssemblerConfig::default()
        };
        let mut state = SelectionState::default();
        let mut beats = vec![ending_beat("end")];
        let outcome = MinimumFillBackfiller::new(&config).run(&index, &dramatic_phases(), &mut state, &mut beats);
        assert_eq!(beats.len(), 6);
        assert!(outcome.reused > 0);
        assert!(outcome.degrades());
        assert!(!outcome.shortfall);
    }

    #[test]
    fn already_satisfied_sequences_are_untouched() {
        let records = vec![record("a", 30.0)];
        let index = CandidateIndex::build(&records, 100.0, 0.85, false).unwrap();
        let config = AssemblerConfig {
            min_beats: 1,
            ..AssemblerConfig::default()
        };
        let mut state = SelectionState::default();
        let mut beats = vec![ending_beat("end")];
        let outcome = MinimumFillBackfiller::new(&config).run(&index, &dramatic_phases(), &mut state, &mut beats);
        assert_eq!(outcome.added, 0);
        assert_eq!(beats.len(), 1);
    }

    #[test]
    fn budget_exhausted_phases_are_skipped_over() {
        let records = vec![record("a", 30.0), record("b", 40.0), record("c", 50.0)];
        let index = CandidateIndex::build(&records, 100.0, 0.85, false).unwrap();
        let config = AssemblerConfig {
            target_duration_s: 10.0,
            min_beats: 5,
            ..AssemblerConfig::default()
        };
        let phases = vec![bare_phase("build", 0, 0.5), bare_phase("payoff", 1, 0.5)];
        let mut end = ending_beat("end");
        end.phase_name = "payoff".into();
        let mut state = SelectionState::default();
        let mut beats = vec![end];
        let outcome = MinimumFillBackfiller::new(&config).run(&index, &phases, &mut state, &mut beats);
        // Caps are 6s each; the 5s ending fills payoff, one 4s clip fits
        // build, the rest are refused rather than overspending.
        assert_eq!(outcome.added, 1);
        assert!(outcome.shortfall);
        assert!(phase_spend(&beats, "build") <= 6.0);
        assert!(phase_spend(&beats, "payoff") <= 6.0);
        assert_eq!(beats.first().unwrap().candidate_id, "a");
        assert!(beats.last().unwrap().is_ending);
    }

    #[test]
    fn spoiler_backfill_needs_phase_opt_in() {
        // Position 0.9, retained because spoilers are included.
        let late = record("late", 90.0);
        let index = CandidateIndex::build(&[late], 100.0, 0.85, true).unwrap();
        let config = AssemblerConfig {
            min_beats: 2,
            include_spoilers: true,
            ..AssemblerConfig::default()
        };

        let fenced = vec![bare_phase("build", 0, 0.5), bare_phase("payoff", 1, 0.5)];
        let mut state = SelectionState::default();
        let mut beats = vec![ending_beat("end")];
        let outcome = MinimumFillBackfiller::new(&config).run(&index, &fenced, &mut state, &mut beats);
        assert_eq!(outcome.added, 0);
        assert!(outcome.shortfall);

        let mut opted = vec![bare_phase("build", 0, 0.5), bare_phase("payoff", 1, 0.5)];
        opted[1].allow_spoiler = true;
        let mut state = SelectionState::default();
        let mut beats = vec![ending_beat("end")];
        let outcome = MinimumFillBackfiller::new(&config).run(&index, &opted, &mut state, &mut beats);
        assert_eq!(outcome.added, 1);
        assert_eq!(beats[0].candidate_id, "late");
        assert_eq!(beats[0].phase_name, "payoff");
    }
}

use std::collections::HashMap;

use tracing::debug;

use crate::config::AssemblerConfig;

use super::backfill::renumber;
use super::index::CandidateIndex;
use super::models::{Beat, PhaseRole, SuspenseCurve, TensionPoint};

/// Computes the tension curve over the assembled sequence and, when the
/// peak lands too far from the ideal position, runs one bounded reordering
/// pass inside the conflict-equivalent phase.
#[derive(Debug)]
pub struct SuspenseCurveEvaluator<'a> {
    config: &'a AssemblerConfig,
}

impl<'a> SuspenseCurveEvaluator<'a> {
    pub fn new(config: &'a AssemblerConfig) -> Self {
        Self { config }
    }

    /// Evaluates the curve and applies at most one local reorder. Beats of
    /// phases other than the conflict phase are never moved.
    pub fn run(&self, index: &CandidateIndex, beats: &mut Vec<Beat>) -> SuspenseCurve {
        let scores = score_lookup(index);
        let mut curve = self.evaluate(&scores, beats);
        if curve.curve_quality < self.config.reorder_quality_floor && !beats.is_empty() {
            debug!(
                target: "narrative.suspense",
                curve_quality = curve.curve_quality,
                "curve below floor, reordering conflict phase"
            );
            self.reorder_conflict(&scores, beats);
            renumber(beats);
            curve = self.evaluate(&scores, beats);
        }
        curve
    }

    pub fn evaluate(&self, scores: &ScoreLookup, beats: &[Beat]) -> SuspenseCurve {
        if beats.is_empty() {
            return SuspenseCurve::empty();
        }

        let mut points = Vec::with_capacity(beats.len());
        let mut elapsed = 0.0;
        for beat in beats {
            let tension = self.tension_of(scores, beat);
            points.push(TensionPoint {
                beat_order: beat.order,
                time: elapsed + beat.assigned_duration / 2.0,
                tension,
            });
            elapsed += beat.assigned_duration;
        }

        let mut peak_time = points[0].time;
        let mut peak_tension = points[0].tension;
        for point in &points[1..] {
            // Strictly greater keeps the earliest peak on ties.
            if point.tension > peak_tension {
                peak_tension = point.tension;
                peak_time = point.time;
            }
        }

        let peak_position = if elapsed > 0.0 { peak_time / elapsed } else { 0.0 };
        let curve_quality =
            (100.0 - 200.0 * (peak_position - self.config.ideal_peak_position).abs()).max(0.0);

        SuspenseCurve {
            points,
            peak_position,
            curve_quality,
        }
    }

    fn tension_of(&self, scores: &ScoreLookup, beat: &Beat) -> f64 {
        let (emotional, action) = scores
            .get(beat.candidate_id.as_str())
            .copied()
            .unwrap_or((0.0, 0.0));
        let raw = self.config.tension.emotional * emotional + self.config.tension.action * action;
        let scaled = raw * beat.phase_role.tension_multiplier();
        if beat.is_ending {
            scaled.max(self.config.tension.ending_floor)
        } else {
            scaled
        }
    }

    /// Stable re-sort of conflict-phase beats by ascending tension, pushing
    /// higher-tension beats later within that phase.
    fn reorder_conflict(&self, scores: &ScoreLookup, beats: &mut [Beat]) {
        let positions: Vec<usize> = beats
            .iter()
            .enumerate()
            .filter(|(_, beat)| beat.phase_role == PhaseRole::Conflict && !beat.is_ending)
            .map(|(idx, _)| idx)
            .collect();
        if positions.len() < 2 {
            return;
        }

        let mut conflict: Vec<Beat> = positions.iter().map(|&idx| beats[idx].clone()).collect();
        conflict.sort_by(|a, b| {
            self.tension_of(scores, a)
                .partial_cmp(&self.tension_of(scores, b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (slot, beat) in positions.into_iter().zip(conflict) {
            beats[slot] = beat;
        }
    }
}

pub type ScoreLookup<'a> = HashMap<&'a str, (f64, f64)>;

pub fn score_lookup(index: &CandidateIndex) -> ScoreLookup<'_> {
    index
        .candidates()
        .iter()
        .map(|candidate| {
            (
                candidate.id.as_str(),
                (candidate.emotional_score, candidate.action_score),
            )
        })
        .collect()
}

use std::collections::BTreeMap;

use tracing::debug;

use super::error::InvalidCandidateError;
use super::models::{Candidate, CandidateRecord, Category};

const MIN_CLIP_DURATION: f64 = 2.0;
const MAX_CLIP_DURATION: f64 = 20.0;
const SCORE_THRESHOLD: f64 = 40.0;
const SPECTACLE_ACTION_THRESHOLD: f64 = 60.0;
const EARLY_POSITION: f64 = 0.15;
const INTRO_POSITION: f64 = 0.35;
const TENSION_WINDOW: (f64, f64) = (0.4, 0.8);

/// Validated, categorized candidate pool. Every candidate is filed under its
/// single highest-scoring category; dialogue-bearing candidates are
/// additionally filed under `dialogue` so phases that require dialogue can
/// always find them.
#[derive(Debug, Clone)]
pub struct CandidateIndex {
    candidates: Vec<Candidate>,
    buckets: BTreeMap<Category, Vec<usize>>,
}

impl CandidateIndex {
    /// Builds the index from raw upstream records. Structurally malformed
    /// records are fatal; records outside the duration window or in the
    /// spoiler zone are silently dropped.
    pub fn build(
        records: &[CandidateRecord],
        source_duration: f64,
        spoiler_cutoff: f64,
        include_spoilers: bool,
    ) -> Result<Self, InvalidCandidateError> {
        let mut candidates = Vec::new();
        let mut buckets: BTreeMap<Category, Vec<usize>> = BTreeMap::new();
        let mut dropped = 0usize;

        for record in records {
            let (start, end) = validate_time_range(record)?;
            let duration = end - start;
            if !(MIN_CLIP_DURATION..=MAX_CLIP_DURATION).contains(&duration) {
                dropped += 1;
                continue;
            }

            let position = if source_duration > 0.0 {
                (start / source_duration).clamp(0.0, 1.0)
            } else {
                0.0
            };
            if position > spoiler_cutoff && !include_spoilers {
                dropped += 1;
                continue;
            }

            let is_question = record.is_question
                || record
                    .dialogue_text
                    .as_deref()
                    .map(|text| text.contains('?'))
                    .unwrap_or(false);

            let category_scores = score_categories(record, position);
            let (primary_category, primary_score) = primary_of(&category_scores, record);

            let idx = candidates.len();
            buckets.entry(primary_category).or_default().push(idx);
            if record.has_dialogue && primary_category != Category::Dialogue {
                buckets.entry(Category::Dialogue).or_default().push(idx);
            }

            candidates.push(Candidate {
                id: record.id.clone(),
                start_time: start,
                end_time: end,
                duration,
                position,
                category_scores,
                primary_category,
                primary_score,
                emotional_score: record.emotional_score,
                action_score: record.action_score,
                has_dialogue: record.has_dialogue,
                dialogue_text: record.dialogue_text.clone(),
                is_question,
                spoiler_level: record.spoiler_level,
                input_order: idx,
            });
        }

        debug!(
            target: "narrative.index",
            accepted = candidates.len(),
            dropped,
            "candidate pool indexed"
        );

        Ok(Self { candidates, buckets })
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn get(&self, idx: usize) -> &Candidate {
        &self.candidates[idx]
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Indices filed under a category, in input order.
    pub fn bucket(&self, category: Category) -> &[usize] {
        self.buckets
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All dialogue-bearing candidate indices.
    pub fn dialogue_indices(&self) -> &[usize] {
        self.bucket(Category::Dialogue)
    }
}

fn validate_time_range(record: &CandidateRecord) -> Result<(f64, f64), InvalidCandidateError> {
    let (Some(start), Some(end)) = (record.start_time, record.end_time) else {
        return Err(InvalidCandidateError::MissingTimeRange {
            id: record.id.clone(),
        });
    };
    if !start.is_finite() || !end.is_finite() {
        return Err(InvalidCandidateError::NonFiniteTime {
            id: record.id.clone(),
        });
    }
    if end <= start {
        return Err(InvalidCandidateError::EmptyTimeRange {
            id: record.id.clone(),
            start,
            end,
        });
    }
    Ok((start, end))
}

fn score_categories(record: &CandidateRecord, position: f64) -> BTreeMap<Category, f64> {
    let mut scores = BTreeMap::new();

    if record.establishing || (position < EARLY_POSITION && !record.has_dialogue) {
        let mut score = 70.0;
        if record.visual_highlight {
            score += 30.0;
        }
        scores.insert(Category::Establishing, score);
    }

    if position < INTRO_POSITION && record.has_dialogue {
        scores.insert(
            Category::CharacterIntro,
            60.0 + 0.3 * record.emotional_score,
        );
    }

    if record.has_dialogue {
        let text = record.dialogue_text.as_deref().unwrap_or("");
        let mut score = 50.0;
        if text.contains('?') {
            score += 30.0;
        }
        let words = text.split_whitespace().count() as f64;
        score += (words * 2.0).min(20.0);
        scores.insert(Category::Dialogue, score);
    }

    if record.action_score > SCORE_THRESHOLD {
        scores.insert(Category::Action, record.action_score);
    }

    if record.emotional_score > SCORE_THRESHOLD {
        scores.insert(Category::Emotional, record.emotional_score);
    }

    let (tension_lo, tension_hi) = TENSION_WINDOW;
    if position > tension_lo
        && position < tension_hi
        && (record.emotional_score > SCORE_THRESHOLD || record.action_score > SCORE_THRESHOLD)
    {
        scores.insert(
            Category::Tension,
            (record.emotional_score + record.action_score) / 2.0,
        );
    }

    if record.visual_highlight || record.action_score > SPECTACLE_ACTION_THRESHOLD {
        scores.insert(
            Category::Spectacle,
            record.action_score.max(SPECTACLE_ACTION_THRESHOLD),
        );
    }

    scores
}

/// Picks the highest-scoring category; ties resolve in `Category::ALL`
/// order. Records that match no scoring rule still need a home so the
/// widened selection pools can reach them.
fn primary_of(
    scores: &BTreeMap<Category, f64>,
    record: &CandidateRecord,
) -> (Category, f64) {
    let mut best: Option<(Category, f64)> = None;
    for category in Category::ALL {
        if let Some(score) = scores.get(&category) {
            match best {
                Some((_, current)) if *score <= current => {}
                _ => best = Some((category, *score)),
            }
        }
    }
    best.unwrap_or_else(|| {
        let fallback = if record.has_dialogue {
            Category::Dialogue
        } else {
            Category::Establishing
        };
        (fallback, 0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, start: f64, end: f64) -> CandidateRecord {
        CandidateRecord::new(id, start, end)
    }

    #[test]
    fn missing_time_range_is_fatal() {
        let mut bad = record("broken", 0.0, 5.0);
        bad.end_time = None;
        let err = CandidateIndex::build(&[bad], 100.0, 0.85, false).unwrap_err();
        assert!(matches!(err, InvalidCandidateError::MissingTimeRange { .. }));
    }

    #[test]
    fn inverted_time_range_is_fatal() {
        let bad = record("inverted", 10.0, 4.0);
        let err = CandidateIndex::build(&[bad], 100.0, 0.85, false).unwrap_err();
        assert!(matches!(err, InvalidCandidateError::EmptyTimeRange { .. }));
    }

    #[test]
    fn duration_window_filters_silently() {
        let too_short = record("short", 0.0, 1.0);
        let too_long = record("long", 0.0, 45.0);
        let fine = record("fine", 30.0, 36.0);
        let index = CandidateIndex::build(&[too_short, too_long, fine], 100.0, 0.85, false).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0).id, "fine");
    }

    #[test]
    fn spoiler_zone_respected_unless_overridden() {
        let late = record("late", 90.0, 96.0);
        let index = CandidateIndex::build(std::slice::from_ref(&late), 100.0, 0.85, false).unwrap();
        assert!(index.is_empty());

        let index = CandidateIndex::build(&[late], 100.0, 0.85, true).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn establishing_scores_early_silent_clips() {
        let mut opener = record("opener", 2.0, 8.0);
        opener.visual_highlight = true;
        let index = CandidateIndex::build(&[opener], 100.0, 0.85, false).unwrap();
        let candidate = index.get(0);
        assert_eq!(candidate.score_for(Category::Establishing), 100.0);
        assert_eq!(candidate.primary_category, Category::Establishing);
    }

    #[test]
    fn question_dialogue_scores_high_and_sets_flag() {
        let mut line = record("line", 50.0, 55.0);
        line.has_dialogue = true;
        line.dialogue_text = Some("what happens when it all falls apart?".into());
        let index = CandidateIndex::build(&[line], 100.0, 0.85, false).unwrap();
        let candidate = index.get(0);
        assert!(candidate.is_question);
        // 50 base + 30 question + 14 for 7 words.
        assert_eq!(candidate.score_for(Category::Dialogue), 94.0);
    }

    #[test]
    fn tension_only_inside_mid_window() {
        let mut early = record("early", 10.0, 16.0);
        early.action_score = 80.0;
        let mut mid = record("mid", 50.0, 56.0);
        mid.action_score = 80.0;
        mid.emotional_score = 60.0;
        let index = CandidateIndex::build(&[early, mid], 100.0, 0.85, false).unwrap();
        assert_eq!(index.get(0).score_for(Category::Tension), 0.0);
        assert_eq!(index.get(1).score_for(Category::Tension), 70.0);
    }

    #[test]
    fn dialogue_candidates_stay_discoverable() {
        // Action is the top category, but the line must still be filed under
        // dialogue for phases that require it.
        let mut chase = record("chase", 40.0, 46.0);
        chase.action_score = 95.0;
        chase.has_dialogue = true;
        chase.dialogue_text = Some("drive faster".into());
        let index = CandidateIndex::build(&[chase], 100.0, 0.85, false).unwrap();
        assert_ne!(index.get(0).primary_category, Category::Dialogue);
        assert_eq!(index.dialogue_indices(), &[0]);
    }

    #[test]
    fn unmatched_records_fall_back_to_a_bucket() {
        let mut flat = record("flat", 30.0, 36.0);
        flat.emotional_score = 10.0;
        let index = CandidateIndex::build(&[flat], 100.0, 0.85, false).unwrap();
        assert_eq!(index.get(0).primary_category, Category::Establishing);
        assert_eq!(index.get(0).primary_score, 0.0);
        assert_eq!(index.bucket(Category::Establishing), &[0]);
    }
}

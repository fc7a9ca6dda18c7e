use regex::Regex;
use tracing::{debug, warn};

use crate::config::EndingWeights;

use super::index::CandidateIndex;
use super::models::Candidate;

/// Phrases that mark a line as a question even without a question mark.
/// Checked once; only the first match counts.
const QUESTION_MARKER_PATTERN: &str = r"(?i)\b(what if|what happens|how (?:can|could|will|do)|who (?:is|was|are)|why (?:did|would|is|are)|where (?:is|are)|can (?:we|they|he|she|you)|will (?:they|he|she|we|it|you))\b";

/// Emotionally charged words; each one found adds the keyword weight, with
/// no cap on accumulation.
const EMOTIONAL_KEYWORDS: &[&str] = &[
    "never", "everything", "nothing", "secret", "truth", "die", "death", "love", "fear",
    "forever", "betray", "destroy", "save", "lost", "end", "promise", "sacrifice",
];

/// Phrases that give away the resolution; heavily penalized.
const SPOILER_PHRASES: &[&str] = &[
    "dies at the end",
    "the killer is",
    "turns out",
    "all along",
    "the real ending",
    "it was me",
    "i am your",
];

/// Window of the source timeline where an ending line lands best.
const ENDING_POSITION_WINDOW: (f64, f64) = (0.3, 0.75);
const ENDING_WORD_RANGE: (usize, usize) = (5, 15);

/// The candidate reserved as the sequence's final beat, chosen before the
/// per-phase pass so no earlier phase can consume it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndingReservation {
    pub candidate_index: usize,
    pub score: f64,
    pub is_question: bool,
}

/// Scans the whole dialogue pool once, up front, for the best cliffhanger
/// line.
#[derive(Debug)]
pub struct HookFinalizer {
    weights: EndingWeights,
    question_marker: Regex,
}

impl HookFinalizer {
    pub fn new(weights: EndingWeights) -> Self {
        Self {
            weights,
            question_marker: Regex::new(QUESTION_MARKER_PATTERN).expect("valid regex"),
        }
    }

    /// Reserves the maximum-scoring eligible ending, preferring genuine
    /// question lines over everything else. Returns `None` on an empty or
    /// fully ineligible pool; the orchestrator then synthesizes a degraded
    /// placeholder ending.
    pub fn reserve(&self, index: &CandidateIndex, spoiler_cutoff: f64) -> Option<EndingReservation> {
        let mut best: Option<EndingReservation> = None;
        let mut best_candidate: Option<&Candidate> = None;

        for &idx in index.dialogue_indices() {
            let candidate = index.get(idx);
            if candidate.spoiler_level >= self.weights.max_spoiler_level {
                continue;
            }
            if candidate.position > spoiler_cutoff {
                continue;
            }

            let score = self.score(candidate);
            let reservation = EndingReservation {
                candidate_index: idx,
                score,
                is_question: candidate.is_question,
            };

            let replace = match (&best, best_candidate) {
                (None, _) => true,
                (Some(current), Some(current_candidate)) => {
                    // Question lines always beat non-questions; within a
                    // tier, higher score wins, then earlier start time, then
                    // input order.
                    match (reservation.is_question, current.is_question) {
                        (true, false) => true,
                        (false, true) => false,
                        _ => {
                            score > current.score
                                || (score == current.score
                                    && (candidate.start_time, candidate.input_order)
                                        < (current_candidate.start_time, current_candidate.input_order))
                        }
                    }
                }
                (Some(_), None) => true,
            };
            if replace {
                best = Some(reservation);
                best_candidate = Some(candidate);
            }
        }

        match &best {
            Some(reservation) => debug!(
                target: "narrative.hook",
                candidate = %index.get(reservation.candidate_index).id,
                score = reservation.score,
                is_question = reservation.is_question,
                "ending reserved"
            ),
            None => warn!(
                target: "narrative.hook",
                "no eligible ending candidate; sequence will be degraded"
            ),
        }

        best
    }

    fn score(&self, candidate: &Candidate) -> f64 {
        let text = candidate.dialogue_text.as_deref().unwrap_or("");
        let lower = text.to_lowercase();
        let mut score = 0.0;

        if text.contains('?') {
            score += self.weights.question_mark;
        } else if self.question_marker.is_match(text) {
            score += self.weights.question_marker;
        }

        for keyword in EMOTIONAL_KEYWORDS {
            if lower.contains(keyword) {
                score += self.weights.emotional_keyword;
            }
        }

        if SPOILER_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
            score += self.weights.spoiler_phrase;
        }

        let words = candidate.word_count();
        let (min_words, max_words) = ENDING_WORD_RANGE;
        if (min_words..=max_words).contains(&words) {
            score += self.weights.word_count_bonus;
        }

        let (lo, hi) = ENDING_POSITION_WINDOW;
        if candidate.position > lo && candidate.position < hi {
            score += self.weights.position_bonus;
        }

        score
    }
}

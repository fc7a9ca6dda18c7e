use tracing::debug;

use crate::config::AssemblerConfig;

use super::models::{Beat, PhaseRole};

/// Style-appropriate tagline shown near the three-quarter mark.
const STYLE_TAGLINES: &[(&str, &str)] = &[
    ("dramatic", "Every secret has a price"),
    ("action", "There is no way out"),
    ("emotional", "Some bonds cannot be broken"),
];
const FALLBACK_TAGLINE: &str = "Coming soon";
const FALLBACK_TITLE: &str = "COMING SOON";

/// Fraction of the sequence where the tagline overlay is anchored.
const TAGLINE_ANCHOR: f64 = 0.75;

/// Assigns title/tagline text overlays at fixed structural points.
#[derive(Debug)]
pub struct OverlayAnnotator<'a> {
    config: &'a AssemblerConfig,
}

impl<'a> OverlayAnnotator<'a> {
    pub fn new(config: &'a AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn annotate(&self, style: &str, beats: &mut [Beat]) {
        if beats.is_empty() {
            return;
        }

        let title = self
            .config
            .title
            .clone()
            .unwrap_or_else(|| FALLBACK_TITLE.to_string());
        if let Some(slot) = title_slot(beats) {
            beats[slot].text_overlay = Some(title);
        }

        let tagline = STYLE_TAGLINES
            .iter()
            .find(|(name, _)| *name == style)
            .map(|(_, text)| *text)
            .unwrap_or(FALLBACK_TAGLINE);
        let slot = tagline_slot(beats);
        if beats[slot].text_overlay.is_none() {
            beats[slot].text_overlay = Some(tagline.to_string());
        } else {
            debug!(
                target: "narrative",
                slot,
                "tagline slot already holds an overlay, skipping"
            );
        }
    }
}

/// First beat of the character-introduction phase, or the third beat overall
/// when that phase produced none.
fn title_slot(beats: &[Beat]) -> Option<usize> {
    beats
        .iter()
        .position(|beat| beat.phase_role == PhaseRole::Character)
        .or_else(|| if beats.len() >= 3 { Some(2) } else { None })
}

/// Beat whose cumulative midpoint lands nearest the anchor fraction of the
/// total duration.
fn tagline_slot(beats: &[Beat]) -> usize {
    let total: f64 = beats.iter().map(|beat| beat.assigned_duration).sum();
    let anchor = total * TAGLINE_ANCHOR;

    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    let mut elapsed = 0.0;
    for (idx, beat) in beats.iter().enumerate() {
        let midpoint = elapsed + beat.assigned_duration / 2.0;
        let distance = (midpoint - anchor).abs();
        if distance < best_distance {
            best_distance = distance;
            best = idx;
        }
        elapsed += beat.assigned_duration;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::models::TransitionStyle;

    fn beat(id: &str, role: PhaseRole, duration: f64, order: usize) -> Beat {
        Beat {
            order,
            candidate_id: id.into(),
            phase_name: role.as_str().into(),
            phase_role: role,
            source_start: 0.0,
            source_end: duration,
            assigned_duration: duration,
            transition_in: TransitionStyle::Cut,
            transition_out: TransitionStyle::Cut,
            text_overlay: None,
            is_character_intro: false,
            is_ending: false,
            rationale: String::new(),
        }
    }

    fn sequence_with_character_phase() -> Vec<Beat> {
        vec![
            beat("a", PhaseRole::Hook, 4.0, 0),
            beat("b", PhaseRole::World, 4.0, 1),
            beat("c", PhaseRole::Character, 4.0, 2),
            beat("d", PhaseRole::Conflict, 4.0, 3),
            beat("e", PhaseRole::ClimaxTease, 4.0, 4),
        ]
    }

    #[test]
    fn title_lands_on_first_character_beat() {
        let config = AssemblerConfig {
            title: Some("THE LONG NIGHT".into()),
            ..AssemblerConfig::default()
        };
        let mut beats = sequence_with_character_phase();
        OverlayAnnotator::new(&config).annotate("dramatic", &mut beats);
        assert_eq!(beats[2].text_overlay.as_deref(), Some("THE LONG NIGHT"));
    }

    #[test]
    fn title_falls_back_to_third_beat() {
        let config = AssemblerConfig::default();
        let mut beats = vec![
            beat("a", PhaseRole::Hook, 4.0, 0),
            beat("b", PhaseRole::World, 4.0, 1),
            beat("c", PhaseRole::Conflict, 4.0, 2),
            beat("d", PhaseRole::Conflict, 4.0, 3),
        ];
        OverlayAnnotator::new(&config).annotate("action", &mut beats);
        assert_eq!(beats[2].text_overlay.as_deref(), Some(FALLBACK_TITLE));
    }

    #[test]
    fn tagline_lands_near_three_quarters() {
        let config = AssemblerConfig::default();
        let mut beats = sequence_with_character_phase();
        OverlayAnnotator::new(&config).annotate("dramatic", &mut beats);
        // Total 20s, anchor 15s; beat d spans 12-16 with midpoint 14.
        assert_eq!(
            beats[3].text_overlay.as_deref(),
            Some("Every secret has a price")
        );
    }

    #[test]
    fn tagline_never_overwrites_existing_overlay() {
        let config = AssemblerConfig::default();
        let mut beats = vec![
            beat("a", PhaseRole::Hook, 4.0, 0),
            beat("b", PhaseRole::Character, 4.0, 1),
        ];
        OverlayAnnotator::new(&config).annotate("emotional", &mut beats);
        // Title went to beat b; the tagline anchor also resolves to beat b
        // and must not replace the title.
        assert_eq!(beats[1].text_overlay.as_deref(), Some(FALLBACK_TITLE));
        assert!(beats[0].text_overlay.is_none());
    }

    #[test]
    fn short_sequences_get_no_title() {
        let config = AssemblerConfig::default();
        let mut beats = vec![beat("a", PhaseRole::Hook, 4.0, 0)];
        OverlayAnnotator::new(&config).annotate("dramatic", &mut beats);
        // No character phase and fewer than three beats: only the tagline.
        assert_eq!(beats[0].text_overlay.as_deref(), Some("Every secret has a price"));
    }
}

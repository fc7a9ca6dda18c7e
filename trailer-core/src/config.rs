use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};
use crate::narrative::phases::StyleLibrary;

/// Tunables for one assembly run. All thresholds live here as explicit call
/// parameters; nothing is process-wide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssemblerConfig {
    /// Trailer duration budget in seconds.
    pub target_duration_s: f64,
    pub min_beats: usize,
    pub max_beats: usize,
    /// Source-timeline fraction beyond which candidates are excluded to
    /// avoid revealing the ending.
    pub spoiler_cutoff: f64,
    /// Where on the trailer timeline the tension peak should land.
    pub ideal_peak_position: f64,
    /// Selection may dip into the spoiler zone when set.
    pub include_spoilers: bool,
    /// When the minimum beat count cannot be met from unused candidates,
    /// re-insert already-used ones (the result is flagged degraded either
    /// way).
    pub reuse_on_shortfall: bool,
    /// A phase's dialogue requirement is only enforced while at least this
    /// many unused dialogue candidates remain globally.
    pub min_dialogue_pool: usize,
    /// Curve quality below this triggers the single conflict-phase reorder.
    pub reorder_quality_floor: f64,
    /// Overlay title; falls back to the style default when unset.
    pub title: Option<String>,
    pub ending: EndingWeights,
    pub tension: TensionWeights,
    pub rank: RankWeights,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            target_duration_s: 60.0,
            min_beats: 10,
            max_beats: 18,
            spoiler_cutoff: 0.85,
            ideal_peak_position: 0.85,
            include_spoilers: false,
            reuse_on_shortfall: false,
            min_dialogue_pool: 5,
            reorder_quality_floor: 70.0,
            title: None,
            ending: EndingWeights::default(),
            tension: TensionWeights::default(),
            rank: RankWeights::default(),
        }
    }
}

/// Ending-hook scoring weights. Empirically tuned values carried over from
/// production; override rather than re-derive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndingWeights {
    pub question_mark: f64,
    pub question_marker: f64,
    pub emotional_keyword: f64,
    pub spoiler_phrase: f64,
    pub word_count_bonus: f64,
    pub position_bonus: f64,
    /// Candidates at or above this spoiler level are never eligible as the
    /// ending.
    pub max_spoiler_level: u8,
}

impl Default for EndingWeights {
    fn default() -> Self {
        Self {
            question_mark: 100.0,
            question_marker: 50.0,
            emotional_keyword: 20.0,
            spoiler_phrase: -100.0,
            word_count_bonus: 20.0,
            position_bonus: 15.0,
            max_spoiler_level: 7,
        }
    }
}

/// Raw tension blend for the suspense curve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TensionWeights {
    pub emotional: f64,
    pub action: f64,
    /// Tension floor applied to the ending beat regardless of its scores.
    pub ending_floor: f64,
}

impl Default for TensionWeights {
    fn default() -> Self {
        Self {
            emotional: 0.4,
            action: 0.3,
            ending_floor: 80.0,
        }
    }
}

/// Candidate ranking weights shared by the per-phase selector and the
/// minimum-fill backfiller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankWeights {
    pub emotional: f64,
    pub dialogue_bonus: f64,
    pub question_bonus: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            emotional: 0.5,
            dialogue_bonus: 100.0,
            question_bonus: 50.0,
        }
    }
}

/// Loads an external style table and validates it on top of the builtins.
pub fn load_style_library<P: AsRef<Path>>(path: P) -> Result<StyleLibrary> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let file: StyleFile = toml::from_str(&content).map_err(|source| ConfigurationError::Parse {
        source,
        path: path.to_path_buf(),
    })?;

    let mut library = StyleLibrary::builtin();
    for (name, table) in file.styles {
        library.insert(name, table.phases)?;
    }
    Ok(library)
}

#[derive(Debug, Deserialize)]
struct StyleFile {
    #[serde(default)]
    styles: std::collections::BTreeMap<String, StyleTable>,
}

#[derive(Debug, Deserialize)]
struct StyleTable {
    phases: Vec<crate::narrative::Phase>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = AssemblerConfig::default();
        assert_eq!(config.spoiler_cutoff, 0.85);
        assert_eq!(config.ideal_peak_position, 0.85);
        assert_eq!(config.min_beats, 10);
        assert_eq!(config.ending.question_mark, 100.0);
        assert_eq!(config.tension.emotional, 0.4);
        assert_eq!(config.tension.action, 0.3);
    }

    #[test]
    fn style_file_parses_and_validates() {
        let dir = std::env::temp_dir().join("trailer-core-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("styles.toml");
        std::fs::write(
            &path,
            r#"
[styles.teaser]
phases = [
  { name = "hook", role = "hook", duration_ratio = 0.5, max_candidates = 2, preferred_categories = ["spectacle"], transition_style = "cut" },
  { name = "tease", role = "climax_tease", duration_ratio = 0.5, max_candidates = 2, preferred_categories = ["tension"], transition_style = "flash" },
]
"#,
        )
        .unwrap();

        let library = load_style_library(&path).unwrap();
        assert!(library.contains("teaser"));
        assert!(library.contains("dramatic"));
    }

    #[test]
    fn bad_ratio_sum_is_rejected() {
        let dir = std::env::temp_dir().join("trailer-core-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad_styles.toml");
        std::fs::write(
            &path,
            r#"
[styles.broken]
phases = [
  { name = "hook", role = "hook", duration_ratio = 0.9, max_candidates = 2, preferred_categories = ["spectacle"], transition_style = "cut" },
]
"#,
        )
        .unwrap();

        let err = load_style_library(&path).unwrap_err();
        assert!(matches!(err, ConfigurationError::RatioSum { .. }));
    }
}

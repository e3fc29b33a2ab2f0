//! Label normalization across heterogeneous classifier taxonomies.
//!
//! Different backends name their two classes incompatibly ("LABEL_1",
//! "Fake", "artificial"). Normalization maps any of them onto one binary
//! {synthetic, authentic} score pair: exact alias match first, substring
//! match second, max-aggregation on duplicates, and a flagged best-effort
//! pick when nothing in the taxonomy is recognized.

use serde::{Deserialize, Serialize};

use crate::backend::PredictionSet;

/// Labels counted as the synthetic class on exact match
pub const SYNTHETIC_ALIASES: &[&str] = &["fake", "ai", "artificial", "deepfake", "label_1", "1"];

/// Labels counted as the authentic class on exact match
pub const AUTHENTIC_ALIASES: &[&str] = &["real", "authentic", "original", "human", "label_0", "0"];

/// Tokens that mark an unrecognized label as synthetic-leaning
const SYNTHETIC_TOKENS: &[&str] = &["fake", "artificial"];

/// Polarity assigned to the best-effort pick when no label matched the
/// known taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolarity {
    /// Authentic unless the winning label carries a synthetic-leaning token
    #[default]
    LabelHeuristic,
    /// Always authentic
    AssumeAuthentic,
}

impl FallbackPolarity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "label-heuristic" => Some(FallbackPolarity::LabelHeuristic),
            "assume-authentic" => Some(FallbackPolarity::AssumeAuthentic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedScore {
    pub synthetic: f64,
    pub authentic: f64,
}

/// Best-effort pick reported when the taxonomy was not recognized.
/// Callers must surface this as low-confidence, not as a matched result.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackPick {
    pub label: String,
    pub score: f64,
    pub synthetic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub scores: NormalizedScore,
    pub fallback: Option<FallbackPick>,
}

pub fn normalize(set: PredictionSet, polarity: FallbackPolarity) -> Normalized {
    let predictions = set.into_predictions();
    let mut scores = NormalizedScore::default();

    for prediction in &predictions {
        let label = prediction.label.to_lowercase();

        if SYNTHETIC_ALIASES.contains(&label.as_str()) {
            scores.synthetic = scores.synthetic.max(prediction.score);
        } else if AUTHENTIC_ALIASES.contains(&label.as_str()) {
            scores.authentic = scores.authentic.max(prediction.score);
        } else if label.contains("fake") {
            scores.synthetic = scores.synthetic.max(prediction.score);
        } else if label.contains("real") {
            scores.authentic = scores.authentic.max(prediction.score);
        }
    }

    let mut fallback = None;
    if scores.synthetic == 0.0 && scores.authentic == 0.0 {
        if let Some(top) = predictions
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
        {
            let synthetic = match polarity {
                FallbackPolarity::AssumeAuthentic => false,
                FallbackPolarity::LabelHeuristic => {
                    let label = top.label.to_lowercase();
                    SYNTHETIC_TOKENS.iter().any(|token| label.contains(token))
                }
            };
            fallback = Some(FallbackPick {
                label: top.label.clone(),
                score: top.score,
                synthetic,
            });
        }
    }

    Normalized { scores, fallback }
}

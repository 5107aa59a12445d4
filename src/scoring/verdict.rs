// Verdict aggregation: raw per-category probabilities to a single judgment.
//
// Categories at or above the threshold are "detected". When anything is
// detected the overall score is the mean detected probability on a 0-100
// scale. When nothing is, the overall score is half the highest raw
// probability, so borderline text still gets a visible (but sub-50) score.
//
// The 50x fallback is a heuristic carried over for compatibility with
// existing clients. Nothing derives it statistically, so treat the exact
// number as product behaviour rather than a calibrated probability.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::toxicity::traits::{Category, RawScores};

/// A category is "detected" when its probability is at or above this value.
pub const TOXICITY_THRESHOLD: f64 = 0.5;

/// Multiplier for the no-detection fallback score.
const FALLBACK_SCALE: f64 = 50.0;

/// Precondition failures for [`aggregate`].
#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("no category scores to aggregate")]
    EmptyScores,
    #[error("score for {category} is not a finite number: {score}")]
    NonFiniteScore { category: Category, score: f64 },
}

/// The aggregated toxicity judgment for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToxicityVerdict {
    /// Categories at or above the threshold, with their scores.
    pub detected_categories: BTreeMap<Category, f64>,
    /// 0 to 100.
    pub overall_score: f64,
    pub all_scores: RawScores,
    pub is_toxic: bool,
}

impl ToxicityVerdict {
    /// Verdict for input that never reached the classifier: every category
    /// at zero, nothing detected.
    pub fn zero() -> Self {
        Self {
            detected_categories: BTreeMap::new(),
            overall_score: 0.0,
            all_scores: RawScores::zeroed(),
            is_toxic: false,
        }
    }
}

/// Aggregate classifier output into a verdict.
pub fn aggregate(scores: &RawScores) -> Result<ToxicityVerdict, InputError> {
    if scores.is_empty() {
        return Err(InputError::EmptyScores);
    }
    if let Some((category, score)) = scores.iter().find(|(_, s)| !s.is_finite()) {
        return Err(InputError::NonFiniteScore { category, score });
    }

    let detected_categories: BTreeMap<Category, f64> = scores
        .iter()
        .filter(|&(_, score)| score >= TOXICITY_THRESHOLD)
        .collect();

    let overall_score = if detected_categories.is_empty() {
        let max = scores.iter().map(|(_, s)| s).fold(f64::NEG_INFINITY, f64::max);
        max * FALLBACK_SCALE
    } else {
        let sum: f64 = detected_categories.values().sum();
        (sum / detected_categories.len() as f64 * 100.0).min(100.0)
    };

    Ok(ToxicityVerdict {
        is_toxic: !detected_categories.is_empty(),
        detected_categories,
        overall_score,
        all_scores: scores.clone(),
    })
}

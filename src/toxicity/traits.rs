// Toxicity classifier trait: the swap-ready abstraction.
//
// The default implementation runs Detoxify's `original` checkpoint (trained on
// the Jigsaw toxic comment data) locally through ONNX Runtime. Anything that
// produces the six Jigsaw category probabilities can stand in for it.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The six toxicity dimensions scored by the classifier.
///
/// Declaration order matches the model's output order, and `Ord` follows it,
/// so a `BTreeMap<Category, _>` serializes in model order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Toxic,
    SevereToxic,
    Obscene,
    Threat,
    Insult,
    IdentityHate,
}

impl Category {
    /// All categories, in model output order.
    pub const ALL: [Category; 6] = [
        Category::Toxic,
        Category::SevereToxic,
        Category::Obscene,
        Category::Threat,
        Category::Insult,
        Category::IdentityHate,
    ];

    /// Wire id, as used in JSON responses and by the browser client.
    pub fn id(self) -> &'static str {
        match self {
            Category::Toxic => "toxic",
            Category::SevereToxic => "severe_toxic",
            Category::Obscene => "obscene",
            Category::Threat => "threat",
            Category::Insult => "insult",
            Category::IdentityHate => "identity_hate",
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            Category::Toxic => "General Toxicity",
            Category::SevereToxic => "Severe Toxicity",
            Category::Obscene => "Obscene Language",
            Category::Threat => "Threats",
            Category::Insult => "Insults",
            Category::IdentityHate => "Identity Hate",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Per-category probabilities for one piece of text, each in [0, 1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawScores(BTreeMap<Category, f64>);

impl RawScores {
    /// Build a score map from the model's output row (one probability per
    /// category, in `Category::ALL` order). Extra trailing values are ignored.
    pub fn from_model_row(row: &[f64]) -> Self {
        Self(Category::ALL.iter().copied().zip(row.iter().copied()).collect())
    }

    /// Every category at 0.0: used for responses that never reach the classifier.
    pub fn zeroed() -> Self {
        Self(Category::ALL.iter().map(|&c| (c, 0.0)).collect())
    }

    pub fn get(&self, category: Category) -> Option<f64> {
        self.0.get(&category).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        self.0.iter().map(|(&c, &s)| (c, s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Category, f64)> for RawScores {
    fn from_iter<I: IntoIterator<Item = (Category, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Trait for classifying text toxicity. Async because inference is offloaded
/// to a blocking thread (or, for remote backends, an HTTP call).
#[async_trait]
pub trait ToxicityClassifier: Send + Sync {
    /// Score a single text across all six categories.
    async fn classify(&self, text: &str) -> Result<RawScores>;
}

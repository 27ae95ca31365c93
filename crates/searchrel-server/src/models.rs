//! API request and response models.

use serde::{Deserialize, Serialize};

use searchrel_core::{ClassificationResult, Region, RelevanceLabel};

/// Request body for POST /classify.
#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    /// The search term to classify.
    pub input: String,
    /// Market code: "pt", "es" or "latam" (default: "pt").
    #[serde(default)]
    pub region: Option<String>,
}

/// Response body for POST /classify.
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    /// The trimmed search term.
    pub search_term: String,
    /// Market the term was classified for.
    pub region: Region,
    /// Hypothesis template used for the market.
    pub hypothesis_template: String,
    /// Best-matching relevance label.
    pub label: RelevanceLabel,
    /// Probability of the label, four decimals.
    pub score: f64,
}

impl From<ClassificationResult> for ClassifyResponse {
    fn from(result: ClassificationResult) -> Self {
        Self {
            search_term: result.search_term,
            region: result.region,
            hypothesis_template: result.hypothesis_template,
            label: result.label,
            score: result.score,
        }
    }
}

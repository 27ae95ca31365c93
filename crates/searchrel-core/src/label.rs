//! Relevance labels the classifier chooses among.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Candidate relevance labels, in the order they are offered to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelevanceLabel {
    /// Strongly related to the product.
    #[serde(rename = "Muito Relevante")]
    MuitoRelevante,
    /// Loosely related to the product.
    #[serde(rename = "Pouco Relevante")]
    PoucoRelevante,
    /// Unrelated, or potentially harmful to show.
    #[serde(rename = "Irrelevante ou Perigoso")]
    IrrelevanteOuPerigoso,
}

impl RelevanceLabel {
    /// Returns the candidate label set in order.
    pub fn all() -> &'static [RelevanceLabel] {
        &[
            RelevanceLabel::MuitoRelevante,
            RelevanceLabel::PoucoRelevante,
            RelevanceLabel::IrrelevanteOuPerigoso,
        ]
    }

    /// Returns the label text sent to the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelevanceLabel::MuitoRelevante => "Muito Relevante",
            RelevanceLabel::PoucoRelevante => "Pouco Relevante",
            RelevanceLabel::IrrelevanteOuPerigoso => "Irrelevante ou Perigoso",
        }
    }

    /// Maps label text returned by a classifier back into the set.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::all().iter().copied().find(|l| l.as_str() == label)
    }

    /// Returns the label texts in order.
    pub fn candidate_texts() -> Vec<&'static str> {
        Self::all().iter().map(|l| l.as_str()).collect()
    }
}

impl fmt::Display for RelevanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Zero-shot text classification.
//!
//! The model is an external collaborator behind the [`ZeroShotClassifier`]
//! trait. [`NliClassifier`] is the ONNX-backed implementation; tests and
//! embedders can supply their own.

mod nli;

use std::time::Duration;

pub use nli::{NliClassifier, NliConfig};

/// A candidate label with its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    /// Candidate label text.
    pub label: String,
    /// Probability in `[0, 1]`.
    pub score: f32,
}

impl LabelScore {
    /// Creates a new label score.
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Error types for classifier invocation.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// Model file not found.
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    /// Tokenizer file not found.
    #[error("Tokenizer file not found: {0}")]
    TokenizerNotFound(String),

    /// ONNX runtime error.
    #[error("ONNX runtime error: {0}")]
    #[cfg(feature = "ml")]
    Runtime(#[from] ort::Error),

    /// Tokenizer error.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Inference error.
    #[error("Inference error: {0}")]
    Inference(String),

    /// The classifier returned something other than a ranked label list.
    #[error("Malformed classifier output: {0}")]
    MalformedOutput(String),

    /// The classifier did not answer in time.
    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),

    /// ML feature not enabled.
    #[error("ML feature not enabled - rebuild with --features ml")]
    MlNotEnabled,
}

#[cfg(feature = "ml")]
impl From<tokenizers::Error> for ClassifierError {
    fn from(e: tokenizers::Error) -> Self {
        ClassifierError::Tokenizer(e.to_string())
    }
}

/// A zero-shot classifier.
///
/// Given a text, the candidate labels and a hypothesis template with one
/// `{}` slot, returns every label with its score, sorted by descending
/// score. Implementations are shared read-only across requests.
pub trait ZeroShotClassifier: Send + Sync {
    /// Ranks `labels` for `text` under `hypothesis_template`.
    fn classify(
        &self,
        text: &str,
        labels: &[&str],
        hypothesis_template: &str,
    ) -> Result<Vec<LabelScore>, ClassifierError>;
}

/// Turns one entailment logit per label into a ranked distribution.
///
/// Softmax across labels, then a stable sort by descending score so equal
/// scores keep candidate order.
pub fn rank_entailment(labels: &[&str], entailment_logits: &[f32]) -> Vec<LabelScore> {
    let max = entailment_logits
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = entailment_logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    let mut ranked: Vec<LabelScore> = labels
        .iter()
        .zip(exps)
        .map(|(label, e)| LabelScore::new(*label, e / sum))
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

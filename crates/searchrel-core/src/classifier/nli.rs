//! NLI-backed zero-shot classifier.
//!
//! Runs a sequence-pair entailment model (an MNLI checkpoint exported to
//! ONNX) once per candidate label, with the rendered hypothesis as the
//! second sequence, and normalises the entailment logits across labels.

use std::path::{Path, PathBuf};

#[cfg(feature = "ml")]
use std::sync::Mutex;
#[cfg(feature = "ml")]
use std::time::Instant;

use super::{ClassifierError, LabelScore, ZeroShotClassifier};
#[cfg(feature = "ml")]
use crate::region::fill_slot;

/// Entailment class index of the default MNLI checkpoint.
pub const DEFAULT_ENTAILMENT_INDEX: usize = 0;

/// Configuration for the NLI classifier.
#[derive(Debug, Clone)]
pub struct NliConfig {
    /// Path to the ONNX model file.
    pub model_path: PathBuf,
    /// Path to the tokenizer.json file.
    pub tokenizer_path: PathBuf,
    /// Path to the checkpoint's config.json (label2id lookup).
    pub config_path: Option<PathBuf>,
    /// Maximum sequence length (tokens) for premise plus hypothesis.
    pub max_length: usize,
    /// Whether the model expects a `token_type_ids` input.
    pub token_type_ids: bool,
}

impl Default for NliConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/model.onnx"),
            tokenizer_path: PathBuf::from("models/tokenizer.json"),
            config_path: Some(PathBuf::from("models/config.json")),
            max_length: 512,
            token_type_ids: false,
        }
    }
}

impl NliConfig {
    /// Creates a config pointing at a checkpoint directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model_path: dir.join("model.onnx"),
            tokenizer_path: dir.join("tokenizer.json"),
            config_path: Some(dir.join("config.json")),
            ..Default::default()
        }
    }

    /// Sets the maximum sequence length.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Sets whether `token_type_ids` is fed to the model.
    pub fn with_token_type_ids(mut self, enabled: bool) -> Self {
        self.token_type_ids = enabled;
        self
    }
}

/// Finds the entailment class in a checkpoint `config.json`.
///
/// Looks for a `label2id` key starting with "entail" (any case). Returns
/// `None` when the file has no such entry.
pub fn entailment_index(config_json: &str) -> Option<usize> {
    let value: serde_json::Value = serde_json::from_str(config_json).ok()?;
    value
        .get("label2id")?
        .as_object()?
        .iter()
        .find(|(name, _)| name.to_lowercase().starts_with("entail"))
        .and_then(|(_, id)| id.as_u64())
        .map(|id| id as usize)
}

#[cfg(feature = "ml")]
fn resolve_entailment_index(config: &NliConfig) -> usize {
    let Some(path) = config.config_path.as_ref() else {
        return DEFAULT_ENTAILMENT_INDEX;
    };

    match std::fs::read_to_string(path) {
        Ok(json) => entailment_index(&json).unwrap_or_else(|| {
            tracing::warn!(
                "No entailment label in {:?}, using index {}",
                path,
                DEFAULT_ENTAILMENT_INDEX
            );
            DEFAULT_ENTAILMENT_INDEX
        }),
        Err(e) => {
            tracing::warn!("Could not read {:?}: {}", path, e);
            DEFAULT_ENTAILMENT_INDEX
        }
    }
}

/// Zero-shot classifier over an ONNX NLI model.
///
/// The session needs exclusive access while running, so it sits behind a
/// mutex; everything else is read-only.
#[cfg(feature = "ml")]
pub struct NliClassifier {
    session: Mutex<ort::session::Session>,
    tokenizer: tokenizers::Tokenizer,
    entailment_index: usize,
    config: NliConfig,
}

#[cfg(feature = "ml")]
impl NliClassifier {
    /// Loads the ONNX model and tokenizer.
    ///
    /// Returns an error if the model or tokenizer files are not found.
    pub fn new(config: NliConfig) -> Result<Self, ClassifierError> {
        use ort::session::{builder::GraphOptimizationLevel, Session};
        use tokenizers::{TruncationParams, TruncationStrategy};

        if !config.model_path.exists() {
            return Err(ClassifierError::ModelNotFound(
                config.model_path.display().to_string(),
            ));
        }
        if !config.tokenizer_path.exists() {
            return Err(ClassifierError::TokenizerNotFound(
                config.tokenizer_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.model_path)?;

        // Truncate the premise only, so the hypothesis always survives intact
        let mut tokenizer = tokenizers::Tokenizer::from_file(&config.tokenizer_path)?;
        tokenizer.with_truncation(Some(TruncationParams {
            max_length: config.max_length,
            strategy: TruncationStrategy::OnlyFirst,
            ..Default::default()
        }))?;

        let entailment_index = resolve_entailment_index(&config);
        tracing::info!(
            model = %config.model_path.display(),
            entailment_index,
            "Loaded NLI model"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            entailment_index,
            config,
        })
    }

    /// Attempts to load the classifier, returning None on any failure.
    pub fn try_load(config: NliConfig) -> Option<Self> {
        Self::new(config).ok()
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &NliConfig {
        &self.config
    }

    /// Runs the model on one premise/hypothesis pair and returns the
    /// entailment logit.
    fn entailment_logit(&self, premise: &str, hypothesis: &str) -> Result<f32, ClassifierError> {
        use ort::value::Tensor;

        let encoding = self.tokenizer.encode((premise, hypothesis), true)?;

        let to_i64 = |v: &[u32]| -> Vec<i64> { v.iter().map(|&x| x as i64).collect() };
        let input_ids = to_i64(encoding.get_ids());
        let attention_mask = to_i64(encoding.get_attention_mask());
        let seq_len = input_ids.len();

        let input_ids = Tensor::from_array(([1, seq_len], input_ids.into_boxed_slice()))?;
        let attention_mask =
            Tensor::from_array(([1, seq_len], attention_mask.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ClassifierError::Inference("session lock poisoned".to_string()))?;

        let outputs = if self.config.token_type_ids {
            let type_ids = to_i64(encoding.get_type_ids());
            let type_ids = Tensor::from_array(([1, seq_len], type_ids.into_boxed_slice()))?;
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => type_ids
            ])?
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ])?
        };

        let (shape, logits) = outputs["logits"].try_extract_tensor::<f32>().map_err(|e| {
            ClassifierError::Inference(format!("Failed to extract logits: {}", e))
        })?;

        // Expect [1, num_nli_classes]
        let dims: Vec<i64> = shape.iter().copied().collect();
        if dims.len() != 2 || dims[0] != 1 || dims[1] as usize <= self.entailment_index {
            return Err(ClassifierError::MalformedOutput(format!(
                "unexpected logits shape {:?}",
                dims
            )));
        }

        Ok(logits[self.entailment_index])
    }
}

#[cfg(feature = "ml")]
impl ZeroShotClassifier for NliClassifier {
    fn classify(
        &self,
        text: &str,
        labels: &[&str],
        hypothesis_template: &str,
    ) -> Result<Vec<LabelScore>, ClassifierError> {
        if labels.is_empty() {
            return Err(ClassifierError::Inference(
                "no candidate labels given".to_string(),
            ));
        }

        let start = Instant::now();
        let logits = labels
            .iter()
            .map(|label| {
                let hypothesis = fill_slot(hypothesis_template, label);
                self.entailment_logit(text, &hypothesis)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ranked = super::rank_entailment(labels, &logits);
        tracing::debug!(
            labels = labels.len(),
            duration_us = start.elapsed().as_micros() as u64,
            "NLI inference complete"
        );
        Ok(ranked)
    }
}

/// Stub classifier when ML feature is not enabled.
///
/// Construction always fails with [`ClassifierError::MlNotEnabled`].
#[cfg(not(feature = "ml"))]
pub struct NliClassifier {
    _config: NliConfig,
}

#[cfg(not(feature = "ml"))]
impl NliClassifier {
    /// Creates a stub classifier (ML feature not enabled).
    pub fn new(_config: NliConfig) -> Result<Self, ClassifierError> {
        Err(ClassifierError::MlNotEnabled)
    }

    /// Attempts to load the classifier (always returns None when ML is disabled).
    pub fn try_load(_config: NliConfig) -> Option<Self> {
        None
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &NliConfig {
        &self._config
    }
}

#[cfg(not(feature = "ml"))]
impl ZeroShotClassifier for NliClassifier {
    fn classify(
        &self,
        _text: &str,
        _labels: &[&str],
        _hypothesis_template: &str,
    ) -> Result<Vec<LabelScore>, ClassifierError> {
        Err(ClassifierError::MlNotEnabled)
    }
}

//! Classification gateway.
//!
//! Picks the hypothesis template for the request's region, asks the
//! classifier to rank the fixed candidate labels, and keeps the top one.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::classifier::{ClassifierError, LabelScore, ZeroShotClassifier};
use crate::label::RelevanceLabel;
use crate::region::{HypothesisTemplateTable, Region};
use crate::request::{ClassificationRequest, ValidationError};

/// Decimal places kept in the reported score.
pub const SCORE_DECIMALS: i32 = 4;

/// Rounds a score to [`SCORE_DECIMALS`] places, half away from zero.
pub fn round_score(score: f32) -> f64 {
    let factor = 10f64.powi(SCORE_DECIMALS);
    (f64::from(score) * factor).round() / factor
}

/// Outcome of classifying one search term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// The trimmed search term.
    pub search_term: String,
    /// Region the term was classified for.
    pub region: Region,
    /// Template used to build the hypotheses, slot included.
    pub hypothesis_template: String,
    /// Top-ranked candidate label.
    pub label: RelevanceLabel,
    /// Probability of the top label, rounded to four decimals.
    pub score: f64,
}

/// Errors returned by the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The payload failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The classifier call failed.
    #[error("Classifier failure: {0}")]
    Classifier(#[from] ClassifierError),
}

/// Routes validated requests to a zero-shot classifier.
#[derive(Clone)]
pub struct ClassificationGateway {
    classifier: Arc<dyn ZeroShotClassifier>,
    templates: Arc<HypothesisTemplateTable>,
}

impl ClassificationGateway {
    /// Creates a gateway with the standard template table.
    pub fn new(classifier: Arc<dyn ZeroShotClassifier>) -> Self {
        Self::with_templates(classifier, HypothesisTemplateTable::standard())
    }

    /// Creates a gateway with a custom template table.
    pub fn with_templates(
        classifier: Arc<dyn ZeroShotClassifier>,
        templates: HypothesisTemplateTable,
    ) -> Self {
        Self {
            classifier,
            templates: Arc::new(templates),
        }
    }

    /// Returns the template table.
    pub fn templates(&self) -> &HypothesisTemplateTable {
        &self.templates
    }

    /// Validates a raw payload and classifies it.
    ///
    /// The classifier is not called when validation fails.
    pub fn classify_raw(
        &self,
        input: &str,
        region: Option<&str>,
    ) -> Result<ClassificationResult, GatewayError> {
        let request = ClassificationRequest::validate(input, region)?;
        Ok(self.classify(&request)?)
    }

    /// Classifies a validated request.
    pub fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationResult, ClassifierError> {
        let start = Instant::now();
        let region = request.region();
        let template = self.templates.get(region);
        let labels = RelevanceLabel::candidate_texts();

        let ranked = self
            .classifier
            .classify(request.input(), &labels, template.as_str())
            .inspect_err(|e| warn!(%region, "Classifier call failed: {}", e))?;

        let (label, score) = top_prediction(&ranked)?;
        let score = round_score(score);

        debug!(
            %region,
            %label,
            score,
            duration_us = start.elapsed().as_micros() as u64,
            "Classified search term"
        );

        Ok(ClassificationResult {
            search_term: request.input().to_string(),
            region,
            hypothesis_template: template.as_str().to_string(),
            label,
            score,
        })
    }
}

/// Takes the first entry of a ranking, checking it is well-formed.
fn top_prediction(ranked: &[LabelScore]) -> Result<(RelevanceLabel, f32), ClassifierError> {
    let top = ranked
        .first()
        .ok_or_else(|| ClassifierError::MalformedOutput("empty ranking".to_string()))?;

    let label = RelevanceLabel::from_label(&top.label).ok_or_else(|| {
        ClassifierError::MalformedOutput(format!("unknown label '{}'", top.label))
    })?;

    if !top.score.is_finite() || !(0.0..=1.0).contains(&top.score) {
        return Err(ClassifierError::MalformedOutput(format!(
            "score {} outside [0, 1]",
            top.score
        )));
    }

    Ok((label, top.score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns a fixed ranking and records what it was asked.
    struct FixedClassifier {
        ranking: Vec<LabelScore>,
        calls: AtomicUsize,
        last_template: Mutex<Option<String>>,
    }

    impl FixedClassifier {
        fn new(ranking: Vec<LabelScore>) -> Arc<Self> {
            Arc::new(Self {
                ranking,
                calls: AtomicUsize::new(0),
                last_template: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ZeroShotClassifier for FixedClassifier {
        fn classify(
            &self,
            _text: &str,
            labels: &[&str],
            hypothesis_template: &str,
        ) -> Result<Vec<LabelScore>, ClassifierError> {
            assert_eq!(labels, RelevanceLabel::candidate_texts().as_slice());
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_template.lock().unwrap() = Some(hypothesis_template.to_string());
            Ok(self.ranking.clone())
        }
    }

    struct FailingClassifier;

    impl ZeroShotClassifier for FailingClassifier {
        fn classify(
            &self,
            _text: &str,
            _labels: &[&str],
            _hypothesis_template: &str,
        ) -> Result<Vec<LabelScore>, ClassifierError> {
            Err(ClassifierError::Inference("model exploded".to_string()))
        }
    }

    fn default_ranking() -> Vec<LabelScore> {
        vec![
            LabelScore::new("Muito Relevante", 0.873_12),
            LabelScore::new("Pouco Relevante", 0.1),
            LabelScore::new("Irrelevante ou Perigoso", 0.026_88),
        ]
    }

    #[test]
    fn round_score_keeps_four_decimals() {
        assert_eq!(round_score(0.873_12), 0.8731);
        assert_eq!(round_score(1.0), 1.0);
        assert_eq!(round_score(0.0), 0.0);
        assert_eq!(round_score(0.999_99), 1.0);
    }

    #[test]
    fn classify_returns_top_label_and_pt_template() {
        let classifier = FixedClassifier::new(default_ranking());
        let gateway = ClassificationGateway::new(classifier.clone());

        let result = gateway.classify_raw("gestão de stocks", Some("pt")).unwrap();

        assert_eq!(result.search_term, "gestão de stocks");
        assert_eq!(result.region, Region::Pt);
        assert_eq!(
            result.hypothesis_template,
            HypothesisTemplateTable::standard().get(Region::Pt).as_str()
        );
        assert_eq!(result.label, RelevanceLabel::MuitoRelevante);
        assert_eq!(result.score, 0.8731);
        assert_eq!(
            classifier.last_template.lock().unwrap().as_deref(),
            Some(result.hypothesis_template.as_str())
        );
    }

    #[test]
    fn omitted_region_uses_pt_template() {
        let gateway = ClassificationGateway::new(FixedClassifier::new(default_ranking()));
        let result = gateway.classify_raw("stocks", None).unwrap();
        assert_eq!(result.region, Region::Pt);
        assert!(result.hypothesis_template.contains("Portugal"));
    }

    #[test]
    fn template_selection_is_deterministic() {
        let gateway = ClassificationGateway::new(FixedClassifier::new(default_ranking()));
        for region in Region::all() {
            let first = gateway.classify_raw("stocks", Some(region.code())).unwrap();
            let second = gateway.classify_raw("stocks", Some(region.code())).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.region, *region);
            assert_eq!(
                first.hypothesis_template,
                gateway.templates().get(*region).as_str()
            );
        }
    }

    #[test]
    fn whitespace_input_never_calls_classifier() {
        let classifier = FixedClassifier::new(default_ranking());
        let gateway = ClassificationGateway::new(classifier.clone());

        let err = gateway.classify_raw("   ", Some("es")).unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Invalid(ValidationError::EmptyInput)
        ));
        assert_eq!(classifier.calls(), 0);
    }

    #[test]
    fn unknown_region_is_invalid_input() {
        let classifier = FixedClassifier::new(default_ranking());
        let gateway = ClassificationGateway::new(classifier.clone());

        let err = gateway.classify_raw("stocks", Some("xx")).unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Invalid(ValidationError::UnknownRegion(_))
        ));
        assert_eq!(classifier.calls(), 0);
    }

    #[test]
    fn classifier_failure_is_surfaced() {
        let gateway = ClassificationGateway::new(Arc::new(FailingClassifier));
        let err = gateway.classify_raw("stocks", Some("latam")).unwrap_err();
        match err {
            GatewayError::Classifier(e) => assert!(e.to_string().contains("model exploded")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn empty_ranking_is_malformed() {
        let gateway = ClassificationGateway::new(FixedClassifier::new(vec![]));
        let err = gateway.classify_raw("stocks", None).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Classifier(ClassifierError::MalformedOutput(_))
        ));
    }

    #[test]
    fn label_outside_candidate_set_is_malformed() {
        let gateway = ClassificationGateway::new(FixedClassifier::new(vec![LabelScore::new(
            "Spam", 0.9,
        )]));
        let err = gateway.classify_raw("stocks", None).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Classifier(ClassifierError::MalformedOutput(_))
        ));
    }

    #[test]
    fn out_of_range_score_is_malformed() {
        for score in [1.5, -0.1, f32::NAN] {
            let gateway = ClassificationGateway::new(FixedClassifier::new(vec![
                LabelScore::new("Pouco Relevante", score),
            ]));
            let err = gateway.classify_raw("stocks", None).unwrap_err();
            assert!(matches!(
                err,
                GatewayError::Classifier(ClassifierError::MalformedOutput(_))
            ));
        }
    }

    #[test]
    fn result_serializes_to_wire_shape() {
        let gateway = ClassificationGateway::new(FixedClassifier::new(default_ranking()));
        let result = gateway.classify_raw("stocks", Some("es")).unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["search_term"], "stocks");
        assert_eq!(json["region"], "es");
        assert_eq!(json["label"], "Muito Relevante");
        assert_eq!(json["score"], 0.8731);
        assert!(json["hypothesis_template"].as_str().unwrap().contains("España"));
    }
}

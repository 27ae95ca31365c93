//! Searchrel Core - search term relevance classification.
//!
//! Validates classification requests, picks the hypothesis template for a
//! market region, and asks a zero-shot classifier which relevance label
//! fits best.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use searchrel_core::classifier::{NliClassifier, NliConfig};
//! use searchrel_core::gateway::ClassificationGateway;
//!
//! let classifier = NliClassifier::new(NliConfig::from_dir("models/mnli")).unwrap();
//! let gateway = ClassificationGateway::new(Arc::new(classifier));
//! let result = gateway.classify_raw("gestão de stocks", Some("pt")).unwrap();
//! println!("{} ({})", result.label, result.score);
//! ```

pub mod classifier;
pub mod gateway;
pub mod label;
pub mod model_store;
pub mod region;
pub mod request;

pub use classifier::{ClassifierError, LabelScore, ZeroShotClassifier};
pub use gateway::{ClassificationGateway, ClassificationResult, GatewayError};
pub use label::RelevanceLabel;
pub use region::{HypothesisTemplate, HypothesisTemplateTable, Region};
pub use request::{ClassificationRequest, ValidationError};

//! Request validation.
//!
//! Turns a raw search term and optional region code into a
//! [`ClassificationRequest`]. Validation is pure: nothing here touches the
//! classifier.

use thiserror::Error;

use crate::region::Region;

/// Errors for payloads that cannot be classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Input is empty or whitespace only.
    #[error("Input cannot be empty.")]
    EmptyInput,

    /// Region code is not one of the supported markets.
    #[error("Unknown region '{0}': expected one of 'pt', 'es' or 'latam'.")]
    UnknownRegion(String),
}

/// A validated classification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRequest {
    input: String,
    region: Region,
}

impl ClassificationRequest {
    /// Validates a raw payload.
    ///
    /// The input is trimmed and must not be empty afterwards. A missing
    /// region defaults to [`Region::Pt`]; an unrecognised one is rejected.
    pub fn validate(input: &str, region: Option<&str>) -> Result<Self, ValidationError> {
        let region = match region {
            Some(code) => code.parse()?,
            None => Region::default(),
        };
        Self::new(input, region)
    }

    /// Builds a request for an already-typed region.
    pub fn new(input: &str, region: Region) -> Result<Self, ValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ValidationError::EmptyInput);
        }

        Ok(Self {
            input: input.to_string(),
            region,
        })
    }

    /// The trimmed search term.
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn region(&self) -> Region {
        self.region
    }
}

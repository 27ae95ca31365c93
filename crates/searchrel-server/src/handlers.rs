//! API route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::{debug, info};

use searchrel_core::{ClassificationRequest, ClassifierError};

use crate::error::{ApiError, Result};
use crate::models::{ClassifyRequest, ClassifyResponse};
use crate::state::AppState;

/// POST /classify - Classify a search term for a market region.
pub async fn classify(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Json<ClassifyResponse>> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let request = ClassificationRequest::validate(&req.input, req.region.as_deref())?;
    debug!(
        input_len = request.input().len(),
        region = %request.region(),
        "Classifying search term"
    );

    // Inference is CPU-bound and can take seconds
    let gateway = state.gateway.clone();
    let task = tokio::task::spawn_blocking(move || gateway.classify(&request));

    let joined = match state.classify_timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| ApiError::Classifier(ClassifierError::Timeout(limit)))?,
        None => task.await,
    };

    let result = joined
        .map_err(|e| ApiError::Internal(format!("classification task failed: {}", e)))??;

    info!(
        region = %result.region,
        label = %result.label,
        score = result.score,
        "Search term classified"
    );

    Ok(Json(result.into()))
}

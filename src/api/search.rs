use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use std::sync::Arc;
use tracing::debug;

use crate::models::{SearchPayload, SearchResponse};

use super::{ApiError, AppState};

/// Searches MedlinePlus health topics for a symptom phrase or keyword list.
///
/// # Endpoint
/// `POST /api/search`
///
/// Body: `{"searchType": "1", "symptom": "Cough"}` or
/// `{"searchType": "2", "symptom": ["Fever", "Cough"]}`.
pub async fn search_symptoms(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchPayload>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::validation(e.body_text()))?;
    debug!(payload = ?payload, "Search request received");

    let response = state.search_service().search(&payload).await?;
    Ok(Json(SearchResponse::clone(&response)))
}

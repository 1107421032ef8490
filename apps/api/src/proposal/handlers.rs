//! Axum route handlers for the Proposal API.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::errors::AppError;
use crate::proposal::models::{ProposalRequest, ProposalResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct GenerateProposalResponse {
    pub proposal: ProposalResponse,
    /// True when the proposal was served from the response cache.
    pub cached: bool,
}

/// POST /api/v1/proposals/generate
///
/// Runs the full pipeline: validate → cache → rate limit → prompt build →
/// LLM generate → normalize. Validation failures map to 400, rate-limit
/// rejections to 429 with a Retry-After header, everything else to 5xx.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<ProposalRequest>,
) -> Result<Json<GenerateProposalResponse>, AppError> {
    let generated = state.service.generate(request).await?;

    Ok(Json(GenerateProposalResponse {
        proposal: generated.proposal,
        cached: generated.cached,
    }))
}

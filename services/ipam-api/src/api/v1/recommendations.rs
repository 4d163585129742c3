//! Allocation recommendations.

use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use ipscope_engine::{
    recommend, AllocationRequest, Candidate, GroupBy, RecommendationScore, Scope,
    UTILIZATION_DECIMALS,
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

const MAX_LIMIT: usize = 50;

pub fn routes() -> Router<AppState> {
    Router::new().route("/recommendations", post(recommendations))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    #[serde(flatten)]
    pub request: AllocationRequest,
    /// Restrict candidates to one section.
    #[serde(default)]
    pub section: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub items: Vec<RecommendationScore>,
    pub candidates_considered: usize,
    pub utilization_decimals: u32,
}

/// Rank catalog subnets for an allocation request.
///
/// POST /v1/recommendations
async fn recommendations(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<RecommendationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut request = req.request;
    if request.required_count == 0 {
        return Err(ctx.bad_request("invalid_required_count", "required_count must be at least 1"));
    }
    request.limit = request.limit.clamp(1, MAX_LIMIT);
    let section = req.section.as_deref().map(Scope::new);

    let mut subnets = state
        .store()
        .subnets()
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;
    if let Some(section) = &section {
        subnets.retain(|s| &s.section == section);
    }
    let records = state
        .store()
        .records(section.as_ref())
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;

    let report = state.aggregator().aggregate(&subnets, &records, GroupBy::None);
    let candidates: Vec<Candidate> = report.subnets().map(Candidate::from).collect();
    let items = recommend(&candidates, &request);

    tracing::debug!(
        request_id = %ctx.request_id,
        required = request.required_count,
        considered = candidates.len(),
        returned = items.len(),
        "Ranked allocation candidates"
    );

    Ok(Json(RecommendationResponse {
        items,
        candidates_considered: candidates.len(),
        utilization_decimals: UTILIZATION_DECIMALS,
    }))
}

//! Utilization statistics.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use ipscope_engine::{AggregationReport, GroupBy, Scope, UTILIZATION_DECIMALS};
use serde::{Deserialize, Serialize};

use super::VRF_OVERCOUNT_NOTE;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/statistics", get(statistics))
}

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub group_by: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    #[serde(flatten)]
    pub report: AggregationReport,
    pub utilization_decimals: u32,
    pub note: &'static str,
}

/// Aggregate utilization over the catalog.
///
/// GET /v1/statistics?group_by=vrf|section|network_type|none
async fn statistics(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<StatisticsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let group_by: GroupBy = query
        .group_by
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|e: String| ctx.bad_request("invalid_group_by", e))?;
    let section = query.section.as_deref().map(Scope::new);

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

    let report = state.aggregator().aggregate(&subnets, &records, group_by);
    if !report.errors.is_empty() {
        tracing::warn!(
            request_id = %ctx.request_id,
            skipped = report.errors.len(),
            "Aggregation skipped unparseable subnets"
        );
    }

    Ok(Json(StatisticsResponse {
        report,
        utilization_decimals: UTILIZATION_DECIMALS,
        note: VRF_OVERCOUNT_NOTE,
    }))
}

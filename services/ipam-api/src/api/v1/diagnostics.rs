//! Status calculation comparison.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use ipscope_engine::{compare_methods, Scope, StatusComparison};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/diagnostics/status-comparison", get(status_comparison))
}

#[derive(Debug, Deserialize)]
pub struct ComparisonQuery {
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonResponse {
    /// Method every other endpoint reports with.
    pub canonical: &'static str,
    #[serde(flatten)]
    pub comparison: StatusComparison,
}

/// Canonical (hostname/marker) versus stored-column status counts.
///
/// GET /v1/diagnostics/status-comparison
async fn status_comparison(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ComparisonQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = query.scope.as_deref().map(Scope::new);
    let records = state
        .store()
        .records(scope.as_ref())
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;

    Ok(Json(ComparisonResponse {
        canonical: "inferred",
        comparison: compare_methods(&records),
    }))
}

//! Duplicate-address diagnostics.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use ipscope_engine::{find_conflicts, Conflict, Scope};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

pub fn routes() -> Router<AppState> {
    Router::new().route("/conflicts", get(list_conflicts))
}

#[derive(Debug, Deserialize)]
pub struct ConflictsQuery {
    pub scope: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ConflictsResponse {
    pub items: Vec<Conflict>,
    pub count: usize,
}

/// Addresses held by more than one record.
///
/// GET /v1/conflicts?scope=Gi&limit=50
async fn list_conflicts(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ConflictsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = query.scope.as_deref().map(Scope::new);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let records = state
        .store()
        .records(scope.as_ref())
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;

    let items = find_conflicts(&records, scope.as_ref(), Some(limit));
    Ok(Json(ConflictsResponse {
        count: items.len(),
        items,
    }))
}

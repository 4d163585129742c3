//! Per-subnet analysis: snapshot plus a window of the enumerated hosts.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ipscope_engine::{
    NetworkType, Page, Scope, SubnetDescriptor, UtilizationSnapshot, UTILIZATION_DECIMALS,
};
use serde::{Deserialize, Serialize};

use super::scope_param;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Page size when the caller does not pass `limit`.
const DEFAULT_PAGE_LIMIT: u64 = 256;

pub fn routes() -> Router<AppState> {
    Router::new().route("/subnet-analysis", get(analyze_subnet))
}

#[derive(Debug, Deserialize)]
pub struct AnalysisQuery {
    pub subnet: String,
    pub scope: Option<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    /// Materialize every host instead of one page.
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse<'a> {
    pub subnet: SubnetDescriptor,
    pub scope: Scope,
    pub network_type: NetworkType,
    pub network: String,
    pub broadcast: String,
    pub netmask: String,
    pub address_count: u64,
    #[serde(flatten)]
    pub snapshot: UtilizationSnapshot,
    pub utilization_decimals: u32,
    pub page: Page<'a>,
}

/// Analyze one subnet.
///
/// GET /v1/subnet-analysis?subnet=10.0.0.0/24&scope=default&offset=0&limit=256
async fn analyze_subnet(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<AnalysisQuery>,
) -> Result<Response, ApiError> {
    let subnet = SubnetDescriptor::parse(&query.subnet).map_err(|e| ctx.engine_error(e))?;
    let scope = scope_param(query.scope.as_deref());

    let records = state
        .store()
        .records_in_subnet(&subnet, &scope)
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;

    let enumerator = state.enumerator();
    let counts = enumerator.tally(&subnet, &records);
    let capacity = subnet.capacity();

    let page = if query.full {
        let items = enumerator
            .enumerate_all(&subnet, &records)
            .map_err(|e| ctx.engine_error(e))?;
        Page {
            offset: 0,
            limit: capacity,
            total: capacity,
            has_more: false,
            items,
        }
    } else {
        let limit = query
            .limit
            .unwrap_or_else(|| DEFAULT_PAGE_LIMIT.min(state.engine().max_page_size));
        enumerator
            .page(&subnet, &records, query.offset.unwrap_or(0), limit)
            .map_err(|e| ctx.engine_error(e))?
    };

    let response = AnalysisResponse {
        subnet,
        network_type: state.classifier().classify(&subnet),
        network: subnet.network().to_string(),
        broadcast: subnet.broadcast().to_string(),
        netmask: subnet.netmask().to_string(),
        address_count: subnet.address_count(),
        snapshot: UtilizationSnapshot::from_counts(capacity, &counts),
        utilization_decimals: UTILIZATION_DECIMALS,
        scope,
        page,
    };

    // Items borrow the loaded records, so serialize before they go out of scope.
    Ok(Json(response).into_response())
}

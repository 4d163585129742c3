//! Reservation endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use ipscope_engine::{ReservationReport, ReservationTags, SubnetDescriptor};
use serde::{Deserialize, Serialize};

use super::scope_param;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Largest address list accepted by one bulk call.
const MAX_BULK_ADDRESSES: usize = 1024;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reservations/next", post(reserve_next))
        .route("/reservations/bulk", post(reserve_bulk))
}

#[derive(Debug, Deserialize)]
pub struct ReserveNextRequest {
    pub subnet: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub tags: ReservationTags,
}

#[derive(Debug, Deserialize)]
pub struct BulkReserveRequest {
    pub subnet: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub addresses: Vec<String>,
    #[serde(flatten)]
    pub tags: ReservationTags,
}

#[derive(Debug, Serialize)]
pub struct BulkReserveResponse {
    #[serde(flatten)]
    pub report: ReservationReport,
    pub reserved_count: usize,
    pub failed_count: usize,
}

/// Reserve the lowest free host address of a subnet.
///
/// POST /v1/reservations/next
async fn reserve_next(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<ReserveNextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subnet = SubnetDescriptor::parse(&req.subnet).map_err(|e| ctx.engine_error(e))?;
    let scope = scope_param(req.scope.as_deref());

    let record = state
        .reservations()
        .reserve_next(&subnet, &scope, &req.tags)
        .await
        .map_err(|e| ctx.engine_error(e))?;

    tracing::info!(
        request_id = %ctx.request_id,
        subnet = %subnet,
        scope = %scope,
        address = %record.address,
        "Address reserved"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

/// Reserve an explicit list of addresses; failures are reported per item.
///
/// POST /v1/reservations/bulk
async fn reserve_bulk(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<BulkReserveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subnet = SubnetDescriptor::parse(&req.subnet).map_err(|e| ctx.engine_error(e))?;
    let scope = scope_param(req.scope.as_deref());

    if req.addresses.is_empty() {
        return Err(ctx.bad_request("empty_address_list", "addresses cannot be empty"));
    }
    if req.addresses.len() > MAX_BULK_ADDRESSES {
        return Err(ctx.bad_request(
            "too_many_addresses",
            format!("at most {MAX_BULK_ADDRESSES} addresses per request"),
        ));
    }

    let report = state
        .reservations()
        .reserve_many(&req.addresses, &subnet, &scope, &req.tags)
        .await;

    for failed in &report.failed {
        tracing::warn!(
            request_id = %ctx.request_id,
            subnet = %subnet,
            address = %failed.address,
            reason = %failed.reason,
            "Bulk reservation item failed"
        );
    }

    Ok(Json(BulkReserveResponse {
        reserved_count: report.reserved.len(),
        failed_count: report.failed.len(),
        report,
    }))
}

//! Subnet catalog endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use ipscope_engine::{
    GroupBy, NetworkType, Scope, SoftError, SubnetDescriptor, SubnetEntry, SubnetUtilization,
    UtilizationSnapshot, UTILIZATION_DECIMALS,
};
use serde::{Deserialize, Serialize};

use super::scope_param;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

/// Subnet routes.
///
/// /v1/subnets
pub fn routes() -> Router<AppState> {
    Router::new().route("/subnets", get(list_subnets).post(create_subnet))
}

#[derive(Debug, Deserialize)]
pub struct ListSubnetsQuery {
    pub section: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubnetRequest {
    pub cidr: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub vrf: Option<String>,
    #[serde(default)]
    pub vlan: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Catalog row with its utilization, when the CIDR parses.
#[derive(Debug, Serialize)]
pub struct SubnetView {
    #[serde(flatten)]
    pub entry: SubnetEntry,
    pub network_type: NetworkType,
    pub vrfs: Vec<String>,
    #[serde(flatten)]
    pub snapshot: Option<UtilizationSnapshot>,
}

impl SubnetView {
    fn new(entry: SubnetEntry, utilization: Option<&SubnetUtilization>) -> Self {
        match utilization {
            Some(u) => Self {
                entry,
                network_type: u.network_type,
                vrfs: u.vrfs.clone(),
                snapshot: Some(u.snapshot),
            },
            None => Self {
                entry,
                network_type: NetworkType::Global,
                vrfs: Vec::new(),
                snapshot: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListSubnetsResponse {
    pub items: Vec<SubnetView>,
    pub total: UtilizationSnapshot,
    pub errors: Vec<SoftError>,
    pub utilization_decimals: u32,
}

/// List catalog subnets with their utilization.
///
/// GET /v1/subnets
async fn list_subnets(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListSubnetsQuery>,
) -> Result<impl IntoResponse, ApiError> {
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

    let report = state.aggregator().aggregate(&subnets, &records, GroupBy::None);
    let by_id: HashMap<_, _> = report.subnets().map(|u| (u.subnet_id, u)).collect();

    let items = subnets
        .into_iter()
        .map(|entry| {
            let utilization = by_id.get(&entry.id).copied();
            SubnetView::new(entry, utilization)
        })
        .collect();

    Ok(Json(ListSubnetsResponse {
        items,
        total: report.total,
        errors: report.errors.clone(),
        utilization_decimals: UTILIZATION_DECIMALS,
    }))
}

/// Add a catalog subnet. The CIDR is validated and stored normalized.
///
/// POST /v1/subnets
async fn create_subnet(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<CreateSubnetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subnet = SubnetDescriptor::parse(&req.cidr).map_err(|e| ctx.engine_error(e))?;
    let section = scope_param(req.section.as_deref());

    let mut entry = SubnetEntry::new(subnet.to_string(), section.clone());
    entry.vrf = req.vrf.filter(|v| !v.trim().is_empty());
    entry.vlan = req.vlan.filter(|v| !v.trim().is_empty());
    entry.description = req.description.filter(|v| !v.trim().is_empty());

    let entry = state
        .store()
        .add_subnet(entry)
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;

    let records = state
        .store()
        .records_in_subnet(&subnet, &section)
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;
    let utilization = state.aggregator().analyze(&entry, subnet, &records);

    tracing::info!(
        request_id = %ctx.request_id,
        subnet_id = %entry.id,
        subnet = %subnet,
        section = %section,
        "Subnet added"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubnetView::new(entry, Some(&utilization))),
    ))
}

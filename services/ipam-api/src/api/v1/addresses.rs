//! Address inventory endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use ipscope_engine::{
    parse_address, AddressKey, AddressPatch, AddressRecord, AddressTags, EffectiveStatus,
    EngineError, InsertOutcome, NewAddressRecord, Scope, SubnetDescriptor, UpdateOutcome,
};
use serde::{Deserialize, Deserializer, Serialize};

use super::scope_param;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::state::AppState;

const DEFAULT_LIMIT: u64 = 100;

/// Address routes.
///
/// /v1/addresses
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/addresses", get(list_addresses).post(create_address))
        .route(
            "/addresses/{scope}/{address}",
            get(get_address).put(update_address).delete(delete_address),
        )
}

#[derive(Debug, Deserialize)]
pub struct ListAddressesQuery {
    pub scope: Option<String>,
    #[serde(default)]
    pub offset: u64,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ListAddressesResponse {
    pub items: Vec<AddressRecord>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub has_more: bool,
}

/// Stored record plus the status every report counts it as. The record's
/// own `status` is the stored column and may disagree.
#[derive(Debug, Serialize)]
pub struct AddressView {
    #[serde(flatten)]
    pub record: AddressRecord,
    pub effective_status: EffectiveStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateAddressRequest {
    pub address: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default)]
    pub vrf: Option<String>,
    #[serde(flatten)]
    pub tags: AddressTags,
}

/// Absent fields stay untouched; explicit `null` clears them.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAddressRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub subnet: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub vrf: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub hostname: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub status: Option<Option<EffectiveStatus>>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl UpdateAddressRequest {
    fn patch(&self) -> AddressPatch {
        AddressPatch {
            subnet: self.subnet.clone(),
            vrf: self.vrf.clone(),
            hostname: self.hostname.clone(),
            description: self.description.clone(),
            status: self.status,
        }
    }
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// List stored records, ordered by address.
///
/// GET /v1/addresses
async fn list_addresses(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListAddressesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let ceiling = state.engine().max_page_size;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT.min(ceiling));
    if limit > ceiling {
        return Err(ctx.engine_error(EngineError::UnboundedEnumerationRequested {
            requested: limit,
            ceiling,
        }));
    }
    let scope = query.scope.as_deref().map(Scope::new);

    let records = state
        .store()
        .records(scope.as_ref())
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;

    let total = records.len() as u64;
    let items: Vec<_> = records
        .into_iter()
        .skip(usize::try_from(query.offset).unwrap_or(usize::MAX))
        .take(limit as usize)
        .collect();
    let has_more = query.offset.saturating_add(items.len() as u64) < total;

    Ok(Json(ListAddressesResponse {
        items,
        total,
        offset: query.offset,
        limit,
        has_more,
    }))
}

/// Record a single address.
///
/// POST /v1/addresses
async fn create_address(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<CreateAddressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&req.address).map_err(|e| ctx.engine_error(e))?;
    let scope = scope_param(req.scope.as_deref());

    let mut record = NewAddressRecord::new(address, scope.clone()).with_tags(req.tags);
    if let Some(subnet) = req.subnet.as_deref().filter(|s| !s.trim().is_empty()) {
        let subnet = SubnetDescriptor::parse(subnet).map_err(|e| ctx.engine_error(e))?;
        if !subnet.contains(address) {
            return Err(ctx.bad_request(
                "address_outside_subnet",
                format!("{address} is not inside {subnet}"),
            ));
        }
        record = record.with_subnet(subnet.to_string());
    }
    if let Some(vrf) = req.vrf.filter(|v| !v.trim().is_empty()) {
        record = record.with_vrf(vrf);
    }

    let outcome = state
        .store()
        .insert_if_absent(record)
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;
    match outcome {
        InsertOutcome::Inserted(record) => {
            tracing::info!(
                request_id = %ctx.request_id,
                address = %record.address,
                scope = %record.scope,
                "Address recorded"
            );
            Ok((StatusCode::CREATED, Json(record)))
        }
        InsertOutcome::AlreadyExists => Err(ctx.engine_error(EngineError::AddressAlreadyClaimed {
            address,
            scope: scope.to_string(),
        })),
    }
}

/// Fetch one record with its inferred status.
///
/// GET /v1/addresses/{scope}/{address}
async fn get_address(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((scope, address)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&address).map_err(|e| ctx.engine_error(e))?;
    let key = AddressKey::new(address, Scope::new(scope));

    let record = state
        .store()
        .get(&key)
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;
    let Some(record) = record else {
        return Err(
            ApiError::not_found("address_not_found", format!("no record for {key}"))
                .with_request_id(ctx.request_id),
        );
    };

    let effective_status = state.enumerator().inferencer().infer_record(&record);
    Ok(Json(AddressView {
        record,
        effective_status,
    }))
}

/// Patch tags on a record, optionally guarded by its version.
///
/// PUT /v1/addresses/{scope}/{address}
async fn update_address(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((scope, address)): Path<(String, String)>,
    Json(req): Json<UpdateAddressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&address).map_err(|e| ctx.engine_error(e))?;
    let key = AddressKey::new(address, Scope::new(scope));

    let patch = req.patch();
    if patch.is_empty() {
        return Err(ctx.bad_request("empty_update", "no fields to update"));
    }

    let outcome = state
        .store()
        .update(&key, &patch, req.expected_version)
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;
    match outcome {
        UpdateOutcome::Updated(record) => Ok(Json(record)),
        UpdateOutcome::NotFound => Err(ApiError::not_found(
            "address_not_found",
            format!("no record for {key}"),
        )
        .with_request_id(ctx.request_id)),
        UpdateOutcome::VersionMismatch { current } => Err(ApiError::conflict(
            "version_conflict",
            format!("record {key} is at version {current}"),
        )
        .with_request_id(ctx.request_id)),
    }
}

/// Remove a record.
///
/// DELETE /v1/addresses/{scope}/{address}
async fn delete_address(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((scope, address)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&address).map_err(|e| ctx.engine_error(e))?;
    let key = AddressKey::new(address, Scope::new(scope));

    let deleted = state
        .store()
        .delete(&key)
        .await
        .map_err(|e| ctx.engine_error(e.into()))?;
    if !deleted {
        return Err(
            ApiError::not_found("address_not_found", format!("no record for {key}"))
                .with_request_id(ctx.request_id),
        );
    }

    tracing::info!(request_id = %ctx.request_id, key = %key, "Address deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_request_distinguishes_null_from_absent() {
        let req: UpdateAddressRequest =
            serde_json::from_str(r#"{"hostname": null, "vrf": "Gi"}"#).unwrap();
        assert_eq!(req.hostname, Some(None));
        assert_eq!(req.vrf, Some(Some("Gi".to_string())));
        assert_eq!(req.description, None);
        assert!(!req.patch().is_empty());
    }

    #[test]
    fn empty_update_yields_empty_patch() {
        let req: UpdateAddressRequest = serde_json::from_str(r#"{"expected_version": 3}"#).unwrap();
        assert!(req.patch().is_empty());
        assert_eq!(req.expected_version, Some(3));
    }
}

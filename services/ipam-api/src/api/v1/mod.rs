//! Version 1 of the HTTP API.

mod addresses;
mod analysis;
mod conflicts;
mod diagnostics;
mod recommendations;
mod reservations;
mod statistics;
mod subnets;

use axum::Router;
use ipscope_engine::Scope;

use crate::state::AppState;

/// Attached to grouped statistics: a subnet tagged with several VRFs is
/// counted once per VRF group.
pub(super) const VRF_OVERCOUNT_NOTE: &str =
    "subnets carrying several VRF tags are counted in each VRF group; group sums may exceed the total";

/// Create the v1 API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(subnets::routes())
        .merge(analysis::routes())
        .merge(addresses::routes())
        .merge(reservations::routes())
        .merge(statistics::routes())
        .merge(conflicts::routes())
        .merge(recommendations::routes())
        .merge(diagnostics::routes())
}

/// Resolve an optional scope parameter, defaulting blank or missing input.
pub(super) fn scope_param(raw: Option<&str>) -> Scope {
    raw.map(Scope::new).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use ipscope_engine::{
        AddressTags, EngineConfig, MemoryStore, NewAddressRecord, Scope, SubnetEntry,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::scope_param;
    use crate::api::create_router;
    use crate::api::error::ProblemDetails;
    use crate::state::AppState;

    fn router(store: MemoryStore) -> Router {
        create_router(AppState::with_store(Arc::new(store), EngineConfig::default()))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    fn used(addr: [u8; 4], scope: &str) -> NewAddressRecord {
        NewAddressRecord::new(Ipv4Addr::from(addr), Scope::new(scope)).with_tags(AddressTags {
            hostname: Some("srv".into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_scope_param_defaults() {
        assert_eq!(scope_param(None), Scope::default());
        assert_eq!(scope_param(Some("  ")), Scope::default());
        assert_eq!(scope_param(Some("Gi")).as_str(), "Gi");
    }

    #[tokio::test]
    async fn test_create_and_list_subnets() {
        let app = router(MemoryStore::new().with_records([used([10, 1, 0, 5], "Gi")]));

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/subnets",
            Some(json!({ "cidr": "10.1.0.7/24", "section": "Gi", "vrf": "CORE" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created = json_body(&body);
        assert_eq!(created["cidr"], "10.1.0.0/24");
        assert_eq!(created["capacity"], 254);
        assert_eq!(created["used"], 1);
        assert_eq!(created["network_type"], "private");

        let (status, body) = send(&app, Method::GET, "/v1/subnets", None).await;
        assert_eq!(status, StatusCode::OK);
        let list = json_body(&body);
        assert_eq!(list["items"].as_array().unwrap().len(), 1);
        assert_eq!(list["total"]["available"], 253);
    }

    #[tokio::test]
    async fn test_create_subnet_rejects_bad_cidr() {
        let app = router(MemoryStore::new());
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/subnets",
            Some(json!({ "cidr": "10.1.0.0/33" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let problem: ProblemDetails = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem.code, "invalid_subnet_format");
    }

    #[tokio::test]
    async fn test_subnet_analysis_pages_and_ceiling() {
        let app = router(MemoryStore::new().with_records([used([192, 168, 0, 2], "default")]));

        let (status, body) = send(
            &app,
            Method::GET,
            "/v1/subnet-analysis?subnet=192.168.0.0/29&limit=3",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let analysis = json_body(&body);
        assert_eq!(analysis["capacity"], 6);
        assert_eq!(analysis["used"], 1);
        assert_eq!(analysis["broadcast"], "192.168.0.7");
        assert_eq!(analysis["page"]["items"].as_array().unwrap().len(), 3);
        assert_eq!(analysis["page"]["has_more"], true);

        let (status, _) = send(
            &app,
            Method::GET,
            "/v1/subnet-analysis?subnet=10.0.0.0/8&full=true",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_reserve_next_until_exhausted() {
        let app = router(MemoryStore::new());
        let request = json!({ "subnet": "10.9.0.0/30", "scope": "Gi", "description": "uplink" });

        for expected in ["10.9.0.1", "10.9.0.2"] {
            let (status, body) =
                send(&app, Method::POST, "/v1/reservations/next", Some(request.clone())).await;
            assert_eq!(status, StatusCode::CREATED);
            let record = json_body(&body);
            assert_eq!(record["address"], expected);
            assert_eq!(record["description"], "Reserved: uplink");
        }

        let (status, body) =
            send(&app, Method::POST, "/v1/reservations/next", Some(request)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let problem: ProblemDetails = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem.code, "no_capacity_available");
    }

    #[tokio::test]
    async fn test_bulk_reservation_reports_failures() {
        let app = router(MemoryStore::new().with_records([used([10, 2, 0, 9], "default")]));

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/reservations/bulk",
            Some(json!({
                "subnet": "10.2.0.0/24",
                "addresses": ["10.2.0.8", "10.2.0.9", "10.3.0.1", "bogus"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let report = json_body(&body);
        assert_eq!(report["reserved_count"], 1);
        assert_eq!(report["failed_count"], 3);

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/reservations/bulk",
            Some(json!({ "subnet": "10.2.0.0/24", "addresses": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bulk_reservation_store_failures_are_per_item() {
        let app = router(MemoryStore::unavailable());

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/reservations/bulk",
            Some(json!({ "subnet": "10.2.0.0/24", "addresses": ["10.2.0.8", "10.2.0.10"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let report = json_body(&body);
        assert_eq!(report["reserved_count"], 0);
        assert_eq!(report["failed"][0]["reason"], "store error");
        assert_eq!(report["failed"][1]["address"], "10.2.0.10");
    }

    #[tokio::test]
    async fn test_address_lifecycle() {
        let app = router(MemoryStore::new());

        let create = json!({ "address": "172.16.0.10", "scope": "RAN", "hostname": "bts-1" });
        let (status, body) = send(&app, Method::POST, "/v1/addresses", Some(create.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json_body(&body)["version"], 1);

        let (status, _) = send(&app, Method::POST, "/v1/addresses", Some(create)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            Method::PUT,
            "/v1/addresses/RAN/172.16.0.10",
            Some(json!({ "hostname": null, "expected_version": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let updated = json_body(&body);
        assert_eq!(updated["version"], 2);
        assert!(updated.get("hostname").is_none());

        let (status, body) = send(&app, Method::GET, "/v1/addresses/RAN/172.16.0.10", None).await;
        assert_eq!(status, StatusCode::OK);
        let fetched = json_body(&body);
        assert_eq!(fetched["version"], 2);
        assert_eq!(fetched["effective_status"], "available");

        let (status, body) = send(
            &app,
            Method::PUT,
            "/v1/addresses/RAN/172.16.0.10",
            Some(json!({ "vrf": "LAB", "expected_version": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        let problem: ProblemDetails = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem.code, "version_conflict");

        let (status, _) = send(
            &app,
            Method::PUT,
            "/v1/addresses/RAN/172.16.0.10",
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::DELETE, "/v1/addresses/RAN/172.16.0.10", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, "/v1/addresses/RAN/172.16.0.10", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(&app, Method::GET, "/v1/addresses/RAN/172.16.0.10", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let problem: ProblemDetails = serde_json::from_slice(&body).unwrap();
        assert_eq!(problem.code, "address_not_found");
    }

    #[tokio::test]
    async fn test_statistics_grouping() {
        let store = MemoryStore::new()
            .with_subnet(SubnetEntry::new("10.0.0.0/24", Scope::new("Gi")))
            .with_subnet(SubnetEntry::new("203.0.113.0/24", Scope::new("Gi")))
            .with_subnet(SubnetEntry::new("not-a-cidr", Scope::new("Gi")))
            .with_records([used([10, 0, 0, 1], "Gi")]);
        let app = router(store);

        let (status, body) =
            send(&app, Method::GET, "/v1/statistics?group_by=network_type", None).await;
        assert_eq!(status, StatusCode::OK);
        let stats = json_body(&body);
        assert_eq!(stats["groups"]["private"]["used"], 1);
        assert_eq!(stats["groups"]["public"]["capacity"], 254);
        assert_eq!(stats["total"]["capacity"], 508);
        assert_eq!(stats["errors"].as_array().unwrap().len(), 1);
        assert_eq!(stats["utilization_decimals"], 2);

        let (status, _) = send(&app, Method::GET, "/v1/statistics?group_by=color", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_conflicts_and_diagnostics() {
        let store = MemoryStore::new().with_records([
            used([10, 5, 0, 1], "Gi"),
            used([10, 5, 0, 1], "RAN"),
            used([10, 5, 0, 2], "Gi"),
        ]);
        let app = router(store);

        let (status, body) = send(&app, Method::GET, "/v1/conflicts", None).await;
        assert_eq!(status, StatusCode::OK);
        let conflicts = json_body(&body);
        assert_eq!(conflicts["count"], 1);
        assert_eq!(conflicts["items"][0]["address"], "10.5.0.1");

        let (status, body) =
            send(&app, Method::GET, "/v1/diagnostics/status-comparison", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["canonical"], "inferred");
    }

    #[tokio::test]
    async fn test_recommendations_rank_candidates() {
        let store = MemoryStore::new()
            .with_subnet(SubnetEntry::new("10.0.0.0/24", Scope::default()))
            .with_subnet(SubnetEntry::new("10.1.0.0/29", Scope::default()));
        let app = router(store);

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/recommendations",
            Some(json!({ "required_count": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let recs = json_body(&body);
        assert_eq!(recs["candidates_considered"], 2);
        let items = recs["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["subnet"], "10.0.0.0/24");

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/recommendations",
            Some(json!({ "required_count": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

//! Reservation concurrency tests.
//!
//! N callers racing `reserve_next` on a subnet with N free hosts must each
//! receive a distinct address under the default configuration, and the
//! subnet must report exhaustion once every free host is claimed.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use ipscope_engine::{
    AddressRecord, AddressStore, AddressTags, Aggregator, EngineConfig, EngineError, GroupBy,
    MemoryStore, NewAddressRecord, ReservationCoordinator, ReservationTags, Scope,
    SubnetDescriptor, SubnetEntry,
};

fn used(addr: Ipv4Addr, scope: &Scope) -> NewAddressRecord {
    NewAddressRecord::new(addr, scope.clone()).with_tags(AddressTags {
        hostname: Some(format!("host-{addr}")),
        ..Default::default()
    })
}

/// Race `callers` reservations against one subnet and collect the results.
async fn race(
    coordinator: &ReservationCoordinator<MemoryStore>,
    subnet: SubnetDescriptor,
    scope: &Scope,
    callers: usize,
) -> Vec<Result<AddressRecord, EngineError>> {
    let mut tasks = Vec::with_capacity(callers);
    for _ in 0..callers {
        let coordinator = coordinator.clone();
        let scope = scope.clone();
        tasks.push(tokio::spawn(async move {
            coordinator
                .reserve_next(&subnet, &scope, &ReservationTags::default())
                .await
        }));
    }

    let mut results = Vec::with_capacity(callers);
    for task in tasks {
        results.push(task.await.unwrap());
    }
    results
}

fn assert_distinct_hosts(subnet: &SubnetDescriptor, results: Vec<Result<AddressRecord, EngineError>>) {
    let expected = results.len();
    let mut addresses = HashSet::new();
    for result in results {
        let record = result.expect("every caller should get an address");
        assert!(subnet.is_host(record.address));
        assert!(addresses.insert(record.address), "duplicate {}", record.address);
    }
    assert_eq!(addresses.len(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reserve_next_hands_out_distinct_addresses() {
    let scope = Scope::new("Gi");
    let subnet = SubnetDescriptor::parse("10.20.0.0/26").unwrap();

    // 62 usable hosts, 13 taken up front, 49 free: more callers than the
    // default retry budget.
    let taken: Vec<_> = subnet.hosts().step_by(5).map(|a| used(a, &scope)).collect();
    assert_eq!(taken.len(), 13);
    let free = subnet.capacity() as usize - taken.len();
    let config = EngineConfig::default();
    assert!(free > config.reserve_max_attempts as usize);

    let store = Arc::new(MemoryStore::new().with_records(taken));
    let coordinator = ReservationCoordinator::new(Arc::clone(&store), &config);

    let results = race(&coordinator, subnet, &scope, free).await;
    assert_distinct_hosts(&subnet, results);

    let err = coordinator
        .reserve_next(&subnet, &scope, &ReservationTags::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoCapacityAvailable(_)));

    let rows = store.records(Some(&scope)).await.unwrap();
    assert_eq!(rows.len(), subnet.capacity() as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn reserve_next_fills_an_empty_slash_24() {
    let scope = Scope::default();
    let subnet = SubnetDescriptor::parse("10.50.0.0/24").unwrap();
    let store = Arc::new(MemoryStore::new());
    let coordinator = ReservationCoordinator::new(Arc::clone(&store), &EngineConfig::default());

    let results = race(&coordinator, subnet, &scope, subnet.capacity() as usize).await;
    assert_distinct_hosts(&subnet, results);

    let err = coordinator
        .reserve_next(&subnet, &scope, &ReservationTags::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoCapacityAvailable(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn reserve_next_claims_spare_rows_under_contention() {
    let scope = Scope::new("RAN");
    let subnet = SubnetDescriptor::parse("172.30.0.0/26").unwrap();

    // Every host already has a row that reads as available, so each claim
    // goes through the version compare-and-swap.
    let spares: Vec<_> = subnet
        .hosts()
        .map(|a| {
            NewAddressRecord::new(a, scope.clone()).with_tags(AddressTags {
                description: Some("spare".into()),
                ..Default::default()
            })
        })
        .collect();
    let store = Arc::new(MemoryStore::new().with_records(spares));
    let coordinator = ReservationCoordinator::new(Arc::clone(&store), &EngineConfig::default());

    let results = race(&coordinator, subnet, &scope, subnet.capacity() as usize).await;
    for record in results.iter().flatten() {
        assert_eq!(record.version, 2);
    }
    assert_distinct_hosts(&subnet, results);
}

#[tokio::test]
async fn reserve_many_commits_valid_entries_despite_failures() {
    let scope = Scope::default();
    let subnet = SubnetDescriptor::parse("1.2.3.0/24").unwrap();
    let store = Arc::new(MemoryStore::new());
    let coordinator = ReservationCoordinator::new(Arc::clone(&store), &EngineConfig::default());

    let report = coordinator
        .reserve_many(
            &["1.2.3.4".to_string(), "not-an-ip".to_string()],
            &subnet,
            &scope,
            &ReservationTags {
                description: Some("lab gear".into()),
                vrf: Some("LAB".into()),
            },
        )
        .await;

    assert_eq!(report.reserved.len(), 1);
    assert_eq!(report.reserved[0].address, Ipv4Addr::new(1, 2, 3, 4));
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].address, "not-an-ip");
    assert_eq!(report.failed[0].reason, "invalid address format");

    let rows = store.records(None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].vrf.as_deref(), Some("LAB"));
}

#[tokio::test]
async fn reservations_show_up_in_aggregation() {
    let scope = Scope::new("RAN");
    let subnet = SubnetDescriptor::parse("172.16.5.0/29").unwrap();
    let store = Arc::new(
        MemoryStore::new().with_subnet(SubnetEntry::new(subnet.to_string(), scope.clone())),
    );
    let coordinator = ReservationCoordinator::new(Arc::clone(&store), &EngineConfig::default());

    for _ in 0..3 {
        coordinator
            .reserve_next(&subnet, &scope, &ReservationTags::default())
            .await
            .unwrap();
    }

    let subnets = store.subnets().await.unwrap();
    let records = store.records(None).await.unwrap();
    let report = Aggregator::default().aggregate(&subnets, &records, GroupBy::Section);
    let group = &report.groups["RAN"];
    assert_eq!(group.snapshot.capacity, 6);
    assert_eq!(group.snapshot.reserved, 3);
    assert_eq!(group.snapshot.used, 0);
    assert_eq!(group.snapshot.available, 3);
}

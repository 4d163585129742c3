//! Address reservation under concurrent access.
//!
//! A reservation scan is never trusted on its own: the chosen address is
//! claimed through the store's atomic insert-if-absent (or a version
//! compare-and-swap for an existing row that reads as available), and a lost
//! race sends `reserve_next` back to scan again.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::enumerate::Enumerator;
use crate::error::{parse_address, EngineError};
use crate::record::{AddressKey, AddressPatch, AddressRecord, AddressTags, NewAddressRecord, Scope};
use crate::status::{EffectiveStatus, RESERVED_MARKER};
use crate::store::{AddressStore, InsertOutcome, UpdateOutcome};
use crate::subnet::SubnetDescriptor;

pub const REASON_INVALID_FORMAT: &str = "invalid address format";
pub const REASON_OUTSIDE_SUBNET: &str = "address outside subnet";
pub const REASON_NOT_HOST: &str = "not a usable host address";
pub const REASON_EXISTS: &str = "address already exists in scope";
pub const REASON_STORE: &str = "store error";

/// Tags written onto a reserved row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationTags {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub vrf: Option<String>,
}

impl ReservationTags {
    /// Description guaranteed to carry the reservation marker.
    pub fn marked_description(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            None | Some("") => "Reserved".to_string(),
            Some(d) if d.to_ascii_lowercase().contains(RESERVED_MARKER) => d.to_string(),
            Some(d) => format!("Reserved: {d}"),
        }
    }
}

/// One address `reserve_many` could not claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedReservation {
    pub address: String,
    pub reason: String,
}

/// Outcome of a bulk reservation. Both lists keep input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReservationReport {
    pub reserved: Vec<AddressRecord>,
    pub failed: Vec<FailedReservation>,
}

enum ItemOutcome {
    Reserved(AddressRecord),
    Failed(FailedReservation),
}

/// Claims addresses through an [`AddressStore`].
pub struct ReservationCoordinator<S: ?Sized> {
    store: Arc<S>,
    enumerator: Enumerator,
    max_attempts: u32,
    concurrency: usize,
}

impl<S: ?Sized> Clone for ReservationCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            enumerator: self.enumerator.clone(),
            max_attempts: self.max_attempts,
            concurrency: self.concurrency,
        }
    }
}

impl<S: AddressStore + ?Sized> ReservationCoordinator<S> {
    pub fn new(store: Arc<S>, config: &EngineConfig) -> Self {
        Self {
            store,
            enumerator: Enumerator::new(config),
            max_attempts: config.reserve_max_attempts.max(1),
            concurrency: config.reserve_concurrency.max(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Claim the lowest available host address of `subnet` in `scope`.
    ///
    /// Losing an insert race means another caller took the address, so the
    /// scan simply moves past it. Only a version conflict on a row that
    /// still reads as available on the next scan spends the retry budget.
    pub async fn reserve_next(
        &self,
        subnet: &SubnetDescriptor,
        scope: &Scope,
        tags: &ReservationTags,
    ) -> Result<AddressRecord, EngineError> {
        let mut lost: HashSet<Ipv4Addr> = HashSet::new();
        let mut contested: Option<Ipv4Addr> = None;
        let mut stalled: u32 = 0;

        loop {
            let records = self.store.records_in_subnet(subnet, scope).await?;
            let candidate = self
                .enumerator
                .stream(subnet, &records)
                .find(|e| e.status.is_available() && !lost.contains(&e.address))
                .map(|e| (e.address, e.record.map(|r| r.version)));

            let Some((address, version)) = candidate else {
                return Err(EngineError::NoCapacityAvailable(subnet.to_string()));
            };

            if contested.take() == Some(address) {
                stalled += 1;
                if stalled >= self.max_attempts {
                    warn!(%subnet, %scope, %address, attempts = stalled, "Reservation still contended");
                    return Err(EngineError::ReservationContention {
                        subnet: subnet.to_string(),
                        attempts: stalled,
                    });
                }
            }

            match self.claim(subnet, scope, address, version, tags).await {
                Ok(record) => {
                    info!(%subnet, %scope, %address, skipped = lost.len(), "Reserved next address");
                    return Ok(record);
                }
                Err(EngineError::AddressAlreadyClaimed { .. }) if version.is_none() => {
                    debug!(%subnet, %scope, %address, "Lost insert race, rescanning");
                    lost.insert(address);
                }
                Err(EngineError::AddressAlreadyClaimed { .. }) => {
                    debug!(%subnet, %scope, %address, "Row changed before claim, rescanning");
                    contested = Some(address);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reserve an explicit address list.
    ///
    /// Every entry is attempted and lands in exactly one of the report's
    /// lists, store failures included, so the caller always learns which
    /// addresses were committed.
    pub async fn reserve_many(
        &self,
        addresses: &[String],
        subnet: &SubnetDescriptor,
        scope: &Scope,
        tags: &ReservationTags,
    ) -> ReservationReport {
        let pending: Vec<_> = addresses
            .iter()
            .map(|raw| self.reserve_one(raw, subnet, scope, tags))
            .collect();
        let outcomes: Vec<ItemOutcome> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = ReservationReport::default();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Reserved(record) => report.reserved.push(record),
                ItemOutcome::Failed(failed) => report.failed.push(failed),
            }
        }

        info!(
            %subnet,
            %scope,
            reserved = report.reserved.len(),
            failed = report.failed.len(),
            "Bulk reservation finished"
        );
        report
    }

    async fn reserve_one(
        &self,
        raw: &str,
        subnet: &SubnetDescriptor,
        scope: &Scope,
        tags: &ReservationTags,
    ) -> ItemOutcome {
        let failed = |reason: &str| {
            ItemOutcome::Failed(FailedReservation {
                address: raw.to_string(),
                reason: reason.to_string(),
            })
        };

        let Ok(address) = parse_address(raw) else {
            return failed(REASON_INVALID_FORMAT);
        };
        if !subnet.contains(address) {
            return failed(REASON_OUTSIDE_SUBNET);
        }
        if !subnet.is_host(address) {
            return failed(REASON_NOT_HOST);
        }

        match self.claim(subnet, scope, address, None, tags).await {
            Ok(record) => ItemOutcome::Reserved(record),
            Err(EngineError::AddressAlreadyClaimed { .. }) => failed(REASON_EXISTS),
            Err(e) => {
                error!(%subnet, %scope, %address, error = %e, "Bulk reservation item hit a store failure");
                failed(REASON_STORE)
            }
        }
    }

    /// Claim one address. `version` is the version of an existing row that
    /// read as available; `None` means no row was seen.
    async fn claim(
        &self,
        subnet: &SubnetDescriptor,
        scope: &Scope,
        address: Ipv4Addr,
        version: Option<i64>,
        tags: &ReservationTags,
    ) -> Result<AddressRecord, EngineError> {
        let claimed = || EngineError::AddressAlreadyClaimed {
            address,
            scope: scope.to_string(),
        };

        match version {
            None => {
                let mut record = NewAddressRecord::new(address, scope.clone())
                    .with_subnet(subnet.to_string())
                    .with_tags(AddressTags {
                        hostname: None,
                        description: Some(tags.marked_description()),
                        status: Some(EffectiveStatus::Reserved),
                    });
                if let Some(vrf) = &tags.vrf {
                    record = record.with_vrf(vrf.clone());
                }
                match self.store.insert_if_absent(record).await? {
                    InsertOutcome::Inserted(record) => Ok(record),
                    InsertOutcome::AlreadyExists => Err(claimed()),
                }
            }
            Some(version) => {
                let patch = AddressPatch {
                    subnet: Some(Some(subnet.to_string())),
                    vrf: tags.vrf.clone().map(Some),
                    hostname: Some(None),
                    description: Some(Some(tags.marked_description())),
                    status: Some(Some(EffectiveStatus::Reserved)),
                };
                let key = AddressKey::new(address, scope.clone());
                match self.store.update(&key, &patch, Some(version)).await? {
                    UpdateOutcome::Updated(record) => Ok(record),
                    UpdateOutcome::VersionMismatch { .. } | UpdateOutcome::NotFound => Err(claimed()),
                }
            }
        }
    }
}

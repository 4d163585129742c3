//! Inventory store boundary.
//!
//! The engine reads and writes address records only through [`AddressStore`].
//! The one write primitive reservations depend on is
//! [`AddressStore::insert_if_absent`], which must be atomic on
//! `(address, scope)`; [`AddressStore::update`] with an expected version is
//! the compare-and-swap used to claim an existing row.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::id::RecordId;
use crate::record::{AddressKey, AddressPatch, AddressRecord, NewAddressRecord, Scope, SubnetEntry};
use crate::subnet::SubnetDescriptor;

/// Store failures. These are fatal to the calling operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected or failed a query.
    #[error("store query failed: {0}")]
    Query(#[source] Box<dyn StdError + Send + Sync>),

    /// A persisted row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn query(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Query(err.into())
    }
}

/// Result of an atomic insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(AddressRecord),
    /// The key already had a row; nothing was written.
    AlreadyExists,
}

/// Result of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(AddressRecord),
    /// The row exists but its version no longer matches.
    VersionMismatch { current: i64 },
    NotFound,
}

/// Shared inventory of address records and catalog subnets.
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Records of `scope` whose address lies inside `subnet`, including the
    /// network and broadcast addresses, ordered by address.
    async fn records_in_subnet(
        &self,
        subnet: &SubnetDescriptor,
        scope: &Scope,
    ) -> Result<Vec<AddressRecord>, StoreError>;

    /// All records, optionally restricted to one scope, ordered by address.
    async fn records(&self, scope: Option<&Scope>) -> Result<Vec<AddressRecord>, StoreError>;

    /// The row at `key`, if any.
    async fn get(&self, key: &AddressKey) -> Result<Option<AddressRecord>, StoreError>;

    /// Insert unless a row with the same `(address, scope)` exists.
    async fn insert_if_absent(&self, record: NewAddressRecord) -> Result<InsertOutcome, StoreError>;

    /// Apply `patch` to the row at `key`. With `expected_version` set the
    /// write only happens if the stored version still matches.
    async fn update(
        &self,
        key: &AddressKey,
        patch: &AddressPatch,
        expected_version: Option<i64>,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Remove the row at `key`. Returns whether a row was removed.
    async fn delete(&self, key: &AddressKey) -> Result<bool, StoreError>;

    /// Every catalog subnet with its tags.
    async fn subnets(&self) -> Result<Vec<SubnetEntry>, StoreError>;

    async fn add_subnet(&self, entry: SubnetEntry) -> Result<SubnetEntry, StoreError>;
}

#[derive(Debug, Default)]
struct Inventory {
    records: BTreeMap<AddressKey, AddressRecord>,
    subnets: Vec<SubnetEntry>,
}

/// In-process store for tests and embedding.
///
/// A single lock guards the inventory, so the check and the write of
/// `insert_if_absent` and versioned `update` happen under one write guard.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inventory>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails with [`StoreError::Unavailable`].
    pub fn unavailable() -> Self {
        Self {
            inner: RwLock::default(),
            unavailable: true,
        }
    }

    /// Seed a catalog subnet.
    pub fn with_subnet(mut self, entry: SubnetEntry) -> Self {
        self.inner.get_mut().subnets.push(entry);
        self
    }

    /// Seed records, replacing any row with the same key.
    pub fn with_records(mut self, records: impl IntoIterator<Item = NewAddressRecord>) -> Self {
        let now = Utc::now();
        let inv = self.inner.get_mut();
        for record in records {
            inv.records
                .insert(record.key(), record.into_record(RecordId::new(), now));
        }
        self
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn records_in_subnet(
        &self,
        subnet: &SubnetDescriptor,
        scope: &Scope,
    ) -> Result<Vec<AddressRecord>, StoreError> {
        self.check()?;
        let inv = self.inner.read().await;
        let mut rows: Vec<_> = inv
            .records
            .values()
            .filter(|r| &r.scope == scope && subnet.contains(r.address))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.address);
        Ok(rows)
    }

    async fn records(&self, scope: Option<&Scope>) -> Result<Vec<AddressRecord>, StoreError> {
        self.check()?;
        let inv = self.inner.read().await;
        let mut rows: Vec<_> = inv
            .records
            .values()
            .filter(|r| scope.is_none_or(|s| s == &r.scope))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.address, &a.scope).cmp(&(b.address, &b.scope)));
        Ok(rows)
    }

    async fn get(&self, key: &AddressKey) -> Result<Option<AddressRecord>, StoreError> {
        self.check()?;
        Ok(self.inner.read().await.records.get(key).cloned())
    }

    async fn insert_if_absent(&self, record: NewAddressRecord) -> Result<InsertOutcome, StoreError> {
        self.check()?;
        let mut inv = self.inner.write().await;
        let key = record.key();
        if inv.records.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let stored = record.into_record(RecordId::new(), Utc::now());
        inv.records.insert(key, stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn update(
        &self,
        key: &AddressKey,
        patch: &AddressPatch,
        expected_version: Option<i64>,
    ) -> Result<UpdateOutcome, StoreError> {
        self.check()?;
        let mut inv = self.inner.write().await;
        let Some(record) = inv.records.get_mut(key) else {
            return Ok(UpdateOutcome::NotFound);
        };
        if let Some(expected) = expected_version {
            if record.version != expected {
                return Ok(UpdateOutcome::VersionMismatch {
                    current: record.version,
                });
            }
        }
        patch.apply(record, Utc::now());
        Ok(UpdateOutcome::Updated(record.clone()))
    }

    async fn delete(&self, key: &AddressKey) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.inner.write().await.records.remove(key).is_some())
    }

    async fn subnets(&self) -> Result<Vec<SubnetEntry>, StoreError> {
        self.check()?;
        Ok(self.inner.read().await.subnets.clone())
    }

    async fn add_subnet(&self, entry: SubnetEntry) -> Result<SubnetEntry, StoreError> {
        self.check()?;
        self.inner.write().await.subnets.push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn new_record(last: u8, scope: &str) -> NewAddressRecord {
        NewAddressRecord::new(Ipv4Addr::new(10, 0, 0, last), Scope::new(scope))
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_keyed_on_address_and_scope() {
        let store = MemoryStore::new();

        let first = store.insert_if_absent(new_record(5, "Gi")).await.unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(ref r) if r.version == 1));

        let again = store.insert_if_absent(new_record(5, "Gi")).await.unwrap();
        assert_eq!(again, InsertOutcome::AlreadyExists);

        let other_scope = store.insert_if_absent(new_record(5, "RAN")).await.unwrap();
        assert!(matches!(other_scope, InsertOutcome::Inserted(_)));

        assert_eq!(store.records(None).await.unwrap().len(), 2);
        assert_eq!(store.records(Some(&Scope::new("Gi"))).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_versioned_update() {
        let store = MemoryStore::new().with_records([new_record(7, "default")]);
        let key = AddressKey::new(Ipv4Addr::new(10, 0, 0, 7), Scope::default());
        let patch = AddressPatch {
            description: Some(Some("Reserved".into())),
            ..Default::default()
        };

        let stale = store.update(&key, &patch, Some(9)).await.unwrap();
        assert_eq!(stale, UpdateOutcome::VersionMismatch { current: 1 });

        let updated = store.update(&key, &patch, Some(1)).await.unwrap();
        assert!(matches!(updated, UpdateOutcome::Updated(ref r) if r.version == 2));

        let missing = AddressKey::new(Ipv4Addr::new(10, 0, 0, 8), Scope::default());
        assert_eq!(
            store.update(&missing, &patch, None).await.unwrap(),
            UpdateOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_records_in_subnet_filters_scope_and_range() {
        let store = MemoryStore::new().with_records([
            new_record(0, "default"),
            new_record(3, "default"),
            new_record(3, "other"),
            NewAddressRecord::new(Ipv4Addr::new(10, 0, 1, 3), Scope::default()),
        ]);
        let subnet = SubnetDescriptor::parse("10.0.0.0/24").unwrap();
        let rows = store
            .records_in_subnet(&subnet, &Scope::default())
            .await
            .unwrap();
        let addrs: Vec<_> = rows.iter().map(|r| r.address.octets()[3]).collect();
        assert_eq!(addrs, vec![0, 3]);
    }

    #[tokio::test]
    async fn test_get_delete_and_subnets() {
        let store = MemoryStore::new()
            .with_subnet(SubnetEntry::new("10.0.0.0/24", Scope::default()))
            .with_records([new_record(1, "default")]);
        let key = AddressKey::new(Ipv4Addr::new(10, 0, 0, 1), Scope::default());

        let found = store.get(&key).await.unwrap().expect("seeded row");
        assert_eq!(found.key(), key);
        let elsewhere = AddressKey::new(key.address, Scope::new("Gi"));
        assert_eq!(store.get(&elsewhere).await.unwrap(), None);

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert_eq!(store.subnets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::unavailable();
        let err = store.records(None).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}

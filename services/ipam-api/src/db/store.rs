//! Postgres-backed address store.
//!
//! `(ip_address, scope)` uniqueness is enforced by the table constraint, so
//! `insert_if_absent` is a single `INSERT .. ON CONFLICT DO NOTHING`.
//! Versioned updates lock the row for the read-check-write.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipscope_engine::{
    AddressKey, AddressPatch, AddressRecord, AddressStore, AddressTags, EffectiveStatus,
    InsertOutcome, NewAddressRecord, RecordId, Scope, SectionId, StoreError, SubnetDescriptor,
    SubnetEntry, SubnetId, UpdateOutcome,
};
use sqlx::{postgres::PgPool, postgres::PgRow, Row};
use tracing::error;

use super::error::store_error;

const RECORD_COLUMNS: &str = r#"
    id,
    host(ip_address) AS ip_address,
    scope,
    subnet,
    vrf,
    hostname,
    description,
    status,
    version,
    created_at,
    updated_at
"#;

/// Raw `ip_inventory` row, decoded into an [`AddressRecord`] afterwards.
#[derive(Debug)]
struct RecordRow {
    id: String,
    ip_address: String,
    scope: String,
    subnet: Option<String>,
    vrf: Option<String>,
    hostname: Option<String>,
    description: Option<String>,
    status: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for RecordRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            ip_address: row.try_get("ip_address")?,
            scope: row.try_get("scope")?,
            subnet: row.try_get("subnet")?,
            vrf: row.try_get("vrf")?,
            hostname: row.try_get("hostname")?,
            description: row.try_get("description")?,
            status: row.try_get("status")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<RecordRow> for AddressRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let id = RecordId::parse(&row.id)
            .map_err(|e| StoreError::Corrupt(format!("record id {}: {e}", row.id)))?;
        let address = row
            .ip_address
            .parse::<Ipv4Addr>()
            .map_err(|_| StoreError::Corrupt(format!("record {id}: address {}", row.ip_address)))?;
        let status = row
            .status
            .as_deref()
            .map(str::parse::<EffectiveStatus>)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("record {id}: {e}")))?;

        Ok(AddressRecord {
            id,
            address,
            scope: Scope::new(row.scope),
            subnet: row.subnet,
            vrf: row.vrf,
            tags: AddressTags {
                hostname: row.hostname,
                description: row.description,
                status,
            },
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct SubnetRow {
    id: String,
    cidr: String,
    section: String,
    vrf: Option<String>,
    vlan: Option<String>,
    description: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for SubnetRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            cidr: row.try_get("cidr")?,
            section: row.try_get("section")?,
            vrf: row.try_get("vrf")?,
            vlan: row.try_get("vlan")?,
            description: row.try_get("description")?,
        })
    }
}

impl TryFrom<SubnetRow> for SubnetEntry {
    type Error = StoreError;

    fn try_from(row: SubnetRow) -> Result<Self, Self::Error> {
        let id = SubnetId::parse(&row.id)
            .map_err(|e| StoreError::Corrupt(format!("subnet id {}: {e}", row.id)))?;
        Ok(SubnetEntry {
            id,
            cidr: row.cidr,
            section: Scope::new(row.section),
            vrf: row.vrf,
            vlan: row.vlan,
            description: row.description,
        })
    }
}

fn decode_all(rows: Vec<RecordRow>) -> Result<Vec<AddressRecord>, StoreError> {
    rows.into_iter().map(AddressRecord::try_from).collect()
}

/// Store for the `ip_inventory`, `subnets` and `sections` tables.
#[derive(Clone)]
pub struct PgAddressStore {
    pool: PgPool,
}

impl PgAddressStore {
    /// Create a new address store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AddressStore for PgAddressStore {
    async fn records_in_subnet(
        &self,
        subnet: &SubnetDescriptor,
        scope: &Scope,
    ) -> Result<Vec<AddressRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM ip_inventory \
             WHERE scope = $1 AND ip_address <<= $2::inet \
             ORDER BY ip_address"
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(scope.as_str())
            .bind(subnet.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, subnet = %subnet, scope = %scope, "Failed to load subnet records");
                store_error(e)
            })?;
        decode_all(rows)
    }

    async fn records(&self, scope: Option<&Scope>) -> Result<Vec<AddressRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM ip_inventory \
             WHERE ($1::TEXT IS NULL OR scope = $1) \
             ORDER BY ip_address, scope"
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(scope.map(Scope::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load address records");
                store_error(e)
            })?;
        decode_all(rows)
    }

    async fn get(&self, key: &AddressKey) -> Result<Option<AddressRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM ip_inventory \
             WHERE ip_address = $1::inet AND scope = $2"
        );
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(key.address.to_string())
            .bind(key.scope.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.map(AddressRecord::try_from).transpose()
    }

    async fn insert_if_absent(&self, record: NewAddressRecord) -> Result<InsertOutcome, StoreError> {
        let sql = format!(
            "INSERT INTO ip_inventory \
                 (id, ip_address, scope, subnet, vrf, hostname, description, status, version, created_at, updated_at) \
             VALUES ($1, $2::inet, $3, $4, $5, $6, $7, $8, 1, $9, $9) \
             ON CONFLICT (ip_address, scope) DO NOTHING \
             RETURNING {RECORD_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(RecordId::new().to_string())
            .bind(record.address.to_string())
            .bind(record.scope.as_str())
            .bind(record.subnet.as_deref())
            .bind(record.vrf.as_deref())
            .bind(record.tags.hostname.as_deref())
            .bind(record.tags.description.as_deref())
            .bind(record.tags.status.map(|s| s.as_str()))
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, address = %record.address, scope = %record.scope, "Failed to insert address record");
                store_error(e)
            })?;

        match row {
            Some(row) => Ok(InsertOutcome::Inserted(row.try_into()?)),
            None => Ok(InsertOutcome::AlreadyExists),
        }
    }

    async fn update(
        &self,
        key: &AddressKey,
        patch: &AddressPatch,
        expected_version: Option<i64>,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM ip_inventory \
             WHERE ip_address = $1::inet AND scope = $2 \
             FOR UPDATE"
        );
        let current = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(key.address.to_string())
            .bind(key.scope.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;

        let Some(current) = current else {
            return Ok(UpdateOutcome::NotFound);
        };
        let mut record = AddressRecord::try_from(current)?;
        if let Some(expected) = expected_version {
            if record.version != expected {
                return Ok(UpdateOutcome::VersionMismatch {
                    current: record.version,
                });
            }
        }

        patch.apply(&mut record, Utc::now());
        sqlx::query(
            r#"
            UPDATE ip_inventory
            SET subnet = $2,
                vrf = $3,
                hostname = $4,
                description = $5,
                status = $6,
                version = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.subnet.as_deref())
        .bind(record.vrf.as_deref())
        .bind(record.tags.hostname.as_deref())
        .bind(record.tags.description.as_deref())
        .bind(record.tags.status.map(|s| s.as_str()))
        .bind(record.version)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, key = %key, "Failed to update address record");
            store_error(e)
        })?;

        tx.commit().await.map_err(store_error)?;
        Ok(UpdateOutcome::Updated(record))
    }

    async fn delete(&self, key: &AddressKey) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM ip_inventory WHERE ip_address = $1::inet AND scope = $2")
            .bind(key.address.to_string())
            .bind(key.scope.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn subnets(&self) -> Result<Vec<SubnetEntry>, StoreError> {
        let rows = sqlx::query_as::<_, SubnetRow>(
            r#"
            SELECT id, cidr, section, vrf, vlan, description
            FROM subnets
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load subnets");
            store_error(e)
        })?;
        rows.into_iter().map(SubnetEntry::try_from).collect()
    }

    async fn add_subnet(&self, entry: SubnetEntry) -> Result<SubnetEntry, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query("INSERT INTO sections (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
            .bind(SectionId::new().to_string())
            .bind(entry.section.as_str())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        sqlx::query(
            r#"
            INSERT INTO subnets (id, cidr, section, vrf, vlan, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.cidr)
        .bind(entry.section.as_str())
        .bind(entry.vrf.as_deref())
        .bind(entry.vlan.as_deref())
        .bind(entry.description.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(error = %e, subnet = %entry.cidr, "Failed to insert subnet");
            store_error(e)
        })?;

        tx.commit().await.map_err(store_error)?;
        Ok(entry)
    }
}

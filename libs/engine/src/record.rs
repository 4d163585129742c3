//! Inventory data model: address records, scopes and catalog subnets.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{RecordId, SubnetId};
use crate::status::EffectiveStatus;

/// Scope used when a record or subnet carries none.
pub const DEFAULT_SCOPE: &str = "default";

/// Section/tenant boundary within which an address is unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Build a scope; blank names collapse to [`DEFAULT_SCOPE`].
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            Self::default()
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self(DEFAULT_SCOPE.to_string())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Free-form tags attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Explicit status column, when the row has one. Not authoritative under
    /// the canonical inference rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EffectiveStatus>,
}

impl AddressTags {
    pub fn hostname(&self) -> Option<&str> {
        non_blank(self.hostname.as_deref())
    }

    pub fn description(&self) -> Option<&str> {
        non_blank(self.description.as_deref())
    }
}

/// Uniqueness key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AddressKey {
    pub address: Ipv4Addr,
    pub scope: Scope,
}

impl AddressKey {
    pub fn new(address: Ipv4Addr, scope: Scope) -> Self {
        Self { address, scope }
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.scope)
    }
}

/// One persisted inventory row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressRecord {
    pub id: RecordId,
    pub address: Ipv4Addr,
    pub scope: Scope,

    /// Subnet hint stored with the row; may be inferred and is not trusted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,

    #[serde(flatten)]
    pub tags: AddressTags,

    /// Bumped on every update; used for compare-and-swap claims.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AddressRecord {
    pub fn key(&self) -> AddressKey {
        AddressKey::new(self.address, self.scope.clone())
    }

    /// VRF tag with blank and literal `None` values filtered out.
    pub fn vrf_tag(&self) -> Option<&str> {
        vrf_tag(self.vrf.as_deref())
    }
}

/// Insert payload for a new record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAddressRecord {
    pub address: Ipv4Addr,
    pub scope: Scope,
    pub subnet: Option<String>,
    pub vrf: Option<String>,
    pub tags: AddressTags,
}

impl NewAddressRecord {
    pub fn new(address: Ipv4Addr, scope: Scope) -> Self {
        Self {
            address,
            scope,
            subnet: None,
            vrf: None,
            tags: AddressTags::default(),
        }
    }

    pub fn with_subnet(mut self, subnet: impl Into<String>) -> Self {
        self.subnet = Some(subnet.into());
        self
    }

    pub fn with_vrf(mut self, vrf: impl Into<String>) -> Self {
        self.vrf = Some(vrf.into());
        self
    }

    pub fn with_tags(mut self, tags: AddressTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn key(&self) -> AddressKey {
        AddressKey::new(self.address, self.scope.clone())
    }

    /// Materialize as a stored record (used by stores).
    pub fn into_record(self, id: RecordId, now: DateTime<Utc>) -> AddressRecord {
        AddressRecord {
            id,
            address: self.address,
            scope: self.scope,
            subnet: self.subnet,
            vrf: self.vrf,
            tags: self.tags,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressPatch {
    pub subnet: Option<Option<String>>,
    pub vrf: Option<Option<String>>,
    pub hostname: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub status: Option<Option<EffectiveStatus>>,
}

impl AddressPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply to a record in place, bumping its version.
    pub fn apply(&self, record: &mut AddressRecord, now: DateTime<Utc>) {
        if let Some(subnet) = &self.subnet {
            record.subnet = subnet.clone();
        }
        if let Some(vrf) = &self.vrf {
            record.vrf = vrf.clone();
        }
        if let Some(hostname) = &self.hostname {
            record.tags.hostname = hostname.clone();
        }
        if let Some(description) = &self.description {
            record.tags.description = description.clone();
        }
        if let Some(status) = self.status {
            record.tags.status = status;
        }
        record.version += 1;
        record.updated_at = now;
    }
}

/// Catalog subnet row with its reporting tags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetEntry {
    pub id: SubnetId,

    /// Raw CIDR text; may be malformed legacy data.
    pub cidr: String,

    /// Section the subnet belongs to; also the scope of its addresses.
    pub section: Scope,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SubnetEntry {
    pub fn new(cidr: impl Into<String>, section: Scope) -> Self {
        Self {
            id: SubnetId::new(),
            cidr: cidr.into(),
            section,
            vrf: None,
            vlan: None,
            description: None,
        }
    }

    pub fn with_vrf(mut self, vrf: impl Into<String>) -> Self {
        self.vrf = Some(vrf.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn vrf_tag(&self) -> Option<&str> {
        vrf_tag(self.vrf.as_deref())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Normalize a VRF tag; legacy rows store the literal text `None`.
pub fn vrf_tag(vrf: Option<&str>) -> Option<&str> {
    non_blank(vrf).filter(|v| *v != "None")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_normalization() {
        assert_eq!(Scope::new("  ").as_str(), DEFAULT_SCOPE);
        assert_eq!(Scope::new(" RAN ").as_str(), "RAN");
        assert_eq!(Scope::from("Gi"), Scope::new("Gi"));
    }

    #[test]
    fn test_vrf_tag_filters_legacy_values() {
        assert_eq!(vrf_tag(Some("None")), None);
        assert_eq!(vrf_tag(Some("  ")), None);
        assert_eq!(vrf_tag(Some(" GI-VRF ")), Some("GI-VRF"));
        assert_eq!(vrf_tag(None), None);
    }

    #[test]
    fn test_patch_apply_bumps_version() {
        let now = Utc::now();
        let mut record = NewAddressRecord::new(Ipv4Addr::new(10, 0, 0, 1), Scope::default())
            .with_vrf("A")
            .into_record(RecordId::new(), now);

        let patch = AddressPatch {
            vrf: Some(None),
            hostname: Some(Some("edge-01".into())),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut record, now);

        assert_eq!(record.vrf, None);
        assert_eq!(record.tags.hostname(), Some("edge-01"));
        assert_eq!(record.version, 2);
    }

    #[test]
    fn test_record_serializes_flat_tags() {
        let record = NewAddressRecord::new(Ipv4Addr::new(10, 0, 0, 9), Scope::new("Gi"))
            .with_tags(AddressTags {
                hostname: Some("gw".into()),
                ..Default::default()
            })
            .into_record(RecordId::new(), Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["address"], "10.0.0.9");
        assert_eq!(json["scope"], "Gi");
        assert_eq!(json["hostname"], "gw");
        assert!(json.get("description").is_none());
    }
}

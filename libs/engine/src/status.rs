//! Effective status inference.
//!
//! The canonical rule set ignores the stored status column:
//! non-empty hostname => `used`, description containing `reserved` => `reserved`,
//! anything else => `available`. The stored column is consulted only by
//! [`StatusMode::TrustStored`], which exists for the comparison diagnostic.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::{AddressRecord, AddressTags, Scope};

/// Case-insensitive marker that flags a description as a reservation.
pub const RESERVED_MARKER: &str = "reserved";

/// Tri-state status of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveStatus {
    Used,
    Reserved,
    Available,
}

impl EffectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Used => "used",
            Self::Reserved => "reserved",
            Self::Available => "available",
        }
    }

    /// Precedence when several records claim one address.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Used => 2,
            Self::Reserved => 1,
            Self::Available => 0,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl fmt::Display for EffectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "used" => Ok(Self::Used),
            "reserved" => Ok(Self::Reserved),
            "available" => Ok(Self::Available),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Which signals the inferencer trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusMode {
    /// Hostname/marker rules only. Used by every production path.
    #[default]
    Inferred,
    /// Stored column first, then the hostname/marker rules.
    TrustStored,
}

/// Maps raw record tags to an [`EffectiveStatus`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusInferencer {
    mode: StatusMode,
}

impl StatusInferencer {
    /// The canonical inferencer.
    pub fn canonical() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: StatusMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> StatusMode {
        self.mode
    }

    pub fn infer(&self, tags: &AddressTags) -> EffectiveStatus {
        if self.mode == StatusMode::TrustStored {
            if let Some(status) = tags.status {
                return status;
            }
        }

        if tags.hostname().is_some() {
            return EffectiveStatus::Used;
        }

        if tags
            .description()
            .is_some_and(|d| d.to_ascii_lowercase().contains(RESERVED_MARKER))
        {
            return EffectiveStatus::Reserved;
        }

        EffectiveStatus::Available
    }

    pub fn infer_record(&self, record: &AddressRecord) -> EffectiveStatus {
        self.infer(&record.tags)
    }
}

/// Used/reserved/available tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub used: u64,
    pub reserved: u64,
    pub available: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: EffectiveStatus) {
        match status {
            EffectiveStatus::Used => self.used += 1,
            EffectiveStatus::Reserved => self.reserved += 1,
            EffectiveStatus::Available => self.available += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.used + self.reserved + self.available
    }
}

/// A row where the two methods disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDisagreement {
    pub address: Ipv4Addr,
    pub scope: Scope,
    pub stored: EffectiveStatus,
    pub inferred: EffectiveStatus,
}

/// Side-by-side result of both status methods over the same rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusComparison {
    pub inferred: StatusCounts,
    pub stored: StatusCounts,
    pub disagreements: Vec<StatusDisagreement>,
}

/// Diagnostic: run the canonical and stored-column methods over `records`.
pub fn compare_methods<'a, I>(records: I) -> StatusComparison
where
    I: IntoIterator<Item = &'a AddressRecord>,
{
    let canonical = StatusInferencer::canonical();
    let stored = StatusInferencer::with_mode(StatusMode::TrustStored);
    let mut comparison = StatusComparison::default();

    for record in records {
        let a = canonical.infer_record(record);
        let b = stored.infer_record(record);
        comparison.inferred.add(a);
        comparison.stored.add(b);
        if a != b {
            comparison.disagreements.push(StatusDisagreement {
                address: record.address,
                scope: record.scope.clone(),
                stored: b,
                inferred: a,
            });
        }
    }

    comparison
        .disagreements
        .sort_by(|x, y| (x.address, &x.scope).cmp(&(y.address, &y.scope)));
    comparison
}

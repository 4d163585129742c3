//! Utilization roll-ups.
//!
//! Every catalog subnet is tallied against the records of its section, tagged
//! by the classifier, and folded into one or more group snapshots.
//!
//! A subnet whose records carry several VRF tags is counted in full under
//! every one of those VRF groups. VRF group totals can therefore exceed the
//! grand total; the grand total counts each subnet exactly once.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classify::{Classifier, NetworkType};
use crate::config::EngineConfig;
use crate::enumerate::Enumerator;
use crate::id::SubnetId;
use crate::record::{vrf_tag, AddressRecord, Scope, SubnetEntry};
use crate::status::StatusCounts;
use crate::subnet::SubnetDescriptor;

/// Decimal places kept in utilization percentages.
pub const UTILIZATION_DECIMALS: u32 = 2;

/// Group key for subnets without any VRF tag.
pub const UNASSIGNED_GROUP: &str = "unassigned";

/// Group key used by [`GroupBy::None`].
pub const ALL_GROUP: &str = "all";

/// Round half away from zero to [`UTILIZATION_DECIMALS`] places.
pub fn round_percent(value: f64) -> f64 {
    let factor = 10f64.powi(UTILIZATION_DECIMALS as i32);
    (value * factor).round() / factor
}

/// Grouping dimension for [`Aggregator::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Vrf,
    Section,
    NetworkType,
    #[default]
    None,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vrf => "vrf",
            Self::Section => "section",
            Self::NetworkType => "network_type",
            Self::None => "none",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vrf" => Ok(Self::Vrf),
            "section" => Ok(Self::Section),
            "network_type" => Ok(Self::NetworkType),
            "none" | "" => Ok(Self::None),
            other => Err(format!("unknown grouping: {other}")),
        }
    }
}

/// Read-time projection of utilization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UtilizationSnapshot {
    pub capacity: u64,
    pub used: u64,
    pub reserved: u64,
    /// `capacity - used - reserved`, floored at zero.
    pub available: u64,
    /// `used / capacity * 100`, see [`UTILIZATION_DECIMALS`].
    pub utilization_percent: f64,
}

impl UtilizationSnapshot {
    pub fn new(capacity: u64, used: u64, reserved: u64) -> Self {
        Self {
            capacity,
            used,
            reserved,
            available: capacity.saturating_sub(used.saturating_add(reserved)),
            utilization_percent: percent(used, capacity),
        }
    }

    pub fn from_counts(capacity: u64, counts: &StatusCounts) -> Self {
        Self::new(capacity, counts.used, counts.reserved)
    }

    /// Fold another snapshot into this one.
    pub fn absorb(&mut self, other: &Self) {
        self.capacity += other.capacity;
        self.used += other.used;
        self.reserved += other.reserved;
        self.available += other.available;
        self.utilization_percent = percent(self.used, self.capacity);
    }

    pub fn is_oversubscribed(&self) -> bool {
        self.used.saturating_add(self.reserved) > self.capacity
    }
}

fn percent(used: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    round_percent(used as f64 / capacity as f64 * 100.0)
}

/// Utilization of one catalog subnet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetUtilization {
    pub subnet_id: SubnetId,
    pub subnet: SubnetDescriptor,
    pub section: Scope,
    pub vrfs: Vec<String>,
    pub network_type: NetworkType,
    #[serde(flatten)]
    pub snapshot: UtilizationSnapshot,
}

/// One group of the report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupSummary {
    pub subnet_count: usize,
    #[serde(flatten)]
    pub snapshot: UtilizationSnapshot,
    pub subnets: Vec<SubnetUtilization>,
}

/// Per-subnet failure that did not abort the aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftError {
    pub subnet_id: SubnetId,
    pub subnet: String,
    pub reason: String,
}

/// Result of [`Aggregator::aggregate`].
#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub group_by: GroupBy,
    pub groups: BTreeMap<String, GroupSummary>,
    /// Every parsed subnet counted once.
    pub total: UtilizationSnapshot,
    pub public_available: u64,
    pub private_available: u64,
    pub errors: Vec<SoftError>,
}

impl AggregationReport {
    /// Per-subnet rows, each subnet once, in catalog order.
    pub fn subnets(&self) -> impl Iterator<Item = &SubnetUtilization> {
        let mut seen = BTreeSet::new();
        self.groups
            .values()
            .flat_map(|g| g.subnets.iter())
            .filter(move |s| seen.insert(s.subnet_id))
    }
}

/// Records of one scope, sorted by address for range slicing.
struct ScopeIndex<'a> {
    by_scope: HashMap<&'a Scope, Vec<&'a AddressRecord>>,
}

impl<'a> ScopeIndex<'a> {
    fn build(records: &'a [AddressRecord]) -> Self {
        let mut by_scope: HashMap<&'a Scope, Vec<&'a AddressRecord>> = HashMap::new();
        for record in records {
            by_scope.entry(&record.scope).or_default().push(record);
        }
        for rows in by_scope.values_mut() {
            rows.sort_by_key(|r| u32::from(r.address));
        }
        Self { by_scope }
    }

    fn within(&self, scope: &Scope, subnet: &SubnetDescriptor) -> &[&'a AddressRecord] {
        let Some(rows) = self.by_scope.get(scope) else {
            return &[];
        };
        let lo = u32::from(subnet.network());
        let hi = u32::from(subnet.broadcast());
        let start = rows.partition_point(|r| u32::from(r.address) < lo);
        let end = rows.partition_point(|r| u32::from(r.address) <= hi);
        &rows[start..end]
    }
}

/// Rolls enumeration tallies up across a subnet set.
#[derive(Debug, Clone)]
pub struct Aggregator {
    enumerator: Enumerator,
    classifier: Classifier,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Aggregator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            enumerator: Enumerator::new(config),
            classifier: config.classifier(),
        }
    }

    /// Utilization of a single parsed subnet against pre-filtered records.
    pub fn analyze<'a, I>(
        &self,
        entry: &SubnetEntry,
        subnet: SubnetDescriptor,
        records: I,
    ) -> SubnetUtilization
    where
        I: IntoIterator<Item = &'a AddressRecord> + Clone,
    {
        let counts = self.enumerator.tally(&subnet, records.clone());

        let mut vrfs: BTreeSet<String> = BTreeSet::new();
        if let Some(vrf) = entry.vrf_tag() {
            vrfs.insert(vrf.to_string());
        }
        for record in records {
            if subnet.is_host(record.address) {
                if let Some(vrf) = vrf_tag(record.vrf.as_deref()) {
                    vrfs.insert(vrf.to_string());
                }
            }
        }

        SubnetUtilization {
            subnet_id: entry.id,
            subnet,
            section: entry.section.clone(),
            vrfs: vrfs.into_iter().collect(),
            network_type: self.classifier.classify(&subnet),
            snapshot: UtilizationSnapshot::from_counts(subnet.capacity(), &counts),
        }
    }

    /// Aggregate `subnets` against `records`, grouped by `group_by`.
    ///
    /// Records are matched to a subnet by scope (the subnet's section) and
    /// address containment; the record's own subnet hint is ignored.
    pub fn aggregate(
        &self,
        subnets: &[SubnetEntry],
        records: &[AddressRecord],
        group_by: GroupBy,
    ) -> AggregationReport {
        let index = ScopeIndex::build(records);
        let mut report = AggregationReport {
            group_by,
            groups: BTreeMap::new(),
            total: UtilizationSnapshot::default(),
            public_available: 0,
            private_available: 0,
            errors: Vec::new(),
        };

        for entry in subnets {
            let subnet = match SubnetDescriptor::parse(&entry.cidr) {
                Ok(subnet) => subnet,
                Err(e) => {
                    warn!(subnet = %entry.cidr, subnet_id = %entry.id, error = %e, "Skipping subnet in aggregation");
                    report.errors.push(SoftError {
                        subnet_id: entry.id,
                        subnet: entry.cidr.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let rows = index.within(&entry.section, &subnet);
            let utilization = self.analyze(entry, subnet, rows.iter().copied());

            report.total.absorb(&utilization.snapshot);
            if self.classifier.is_private(&subnet) {
                report.private_available += utilization.snapshot.available;
            } else {
                report.public_available += utilization.snapshot.available;
            }

            for key in group_keys(&utilization, group_by) {
                let group = report.groups.entry(key).or_default();
                group.subnet_count += 1;
                group.snapshot.absorb(&utilization.snapshot);
                group.subnets.push(utilization.clone());
            }
        }

        report
    }
}

fn group_keys(utilization: &SubnetUtilization, group_by: GroupBy) -> Vec<String> {
    match group_by {
        GroupBy::None => vec![ALL_GROUP.to_string()],
        GroupBy::Section => vec![utilization.section.to_string()],
        GroupBy::NetworkType => vec![utilization.network_type.to_string()],
        GroupBy::Vrf if utilization.vrfs.is_empty() => vec![UNASSIGNED_GROUP.to_string()],
        GroupBy::Vrf => utilization.vrfs.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::RecordId;
    use crate::record::{AddressTags, NewAddressRecord};
    use chrono::Utc;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    fn record(addr: [u8; 4], scope: &str, vrf: Option<&str>, host: bool) -> AddressRecord {
        let mut new = NewAddressRecord::new(Ipv4Addr::from(addr), Scope::new(scope)).with_tags(
            AddressTags {
                hostname: host.then(|| "h".to_string()),
                description: (!host).then(|| "Reserved".to_string()),
                status: None,
            },
        );
        if let Some(vrf) = vrf {
            new = new.with_vrf(vrf);
        }
        new.into_record(RecordId::new(), Utc::now())
    }

    #[test]
    fn test_snapshot_scenario() {
        let snapshot = UtilizationSnapshot::new(100, 60, 10);
        assert_eq!(snapshot.available, 30);
        assert_eq!(snapshot.utilization_percent, 60.0);
    }

    #[test]
    fn test_snapshot_clamps_oversubscription() {
        let snapshot = UtilizationSnapshot::new(2, 3, 1);
        assert_eq!(snapshot.available, 0);
        assert!(snapshot.is_oversubscribed());
        assert_eq!(UtilizationSnapshot::new(0, 0, 0).utilization_percent, 0.0);
    }

    #[test]
    fn test_round_percent() {
        assert_eq!(round_percent(33.333_333), 33.33);
        assert_eq!(round_percent(66.666_666), 66.67);
        assert_eq!(round_percent(0.125), 0.13);
    }

    #[test]
    fn test_group_by_parse() {
        assert_eq!("vrf".parse::<GroupBy>(), Ok(GroupBy::Vrf));
        assert_eq!("".parse::<GroupBy>(), Ok(GroupBy::None));
        assert!("site".parse::<GroupBy>().is_err());
    }

    #[test]
    fn test_multi_vrf_subnet_counts_in_each_group() {
        let subnets = vec![SubnetEntry::new("10.1.0.0/24", Scope::new("Gi")).with_vrf("GI-VRF")];
        let records = vec![
            record([10, 1, 0, 1], "Gi", Some("GI-VRF"), true),
            record([10, 1, 0, 2], "Gi", Some("OAM"), true),
            record([10, 1, 0, 3], "Gi", Some("None"), false),
        ];

        let report = Aggregator::default().aggregate(&subnets, &records, GroupBy::Vrf);
        assert_eq!(report.groups.len(), 2);
        for key in ["GI-VRF", "OAM"] {
            let group = &report.groups[key];
            assert_eq!(group.snapshot.capacity, 254);
            assert_eq!(group.snapshot.used, 2);
            assert_eq!(group.snapshot.reserved, 1);
        }
        assert_eq!(report.total.capacity, 254);
        assert_eq!(report.subnets().count(), 1);
    }

    #[test]
    fn test_records_scoped_to_section() {
        let subnets = vec![
            SubnetEntry::new("192.168.1.0/24", Scope::new("True")),
            SubnetEntry::new("192.168.1.0/24", Scope::new("TESTBED")),
        ];
        let records = vec![record([192, 168, 1, 10], "True", None, true)];

        let report = Aggregator::default().aggregate(&subnets, &records, GroupBy::Section);
        assert_eq!(report.groups["True"].snapshot.used, 1);
        assert_eq!(report.groups["TESTBED"].snapshot.used, 0);
        assert_eq!(report.groups["TESTBED"].snapshot.available, 254);
    }

    #[test]
    fn test_unparseable_subnet_is_soft_error() {
        let subnets = vec![
            SubnetEntry::new("10.0.0.0/24", Scope::default()),
            SubnetEntry::new("10.0.0.0/99", Scope::default()),
        ];
        let report = Aggregator::default().aggregate(&subnets, &[], GroupBy::None);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].subnet, "10.0.0.0/99");
        assert_eq!(report.groups[ALL_GROUP].subnet_count, 1);
    }

    #[test]
    fn test_network_type_groups_and_public_private_split() {
        let subnets = vec![
            SubnetEntry::new("10.0.0.0/30", Scope::default()),
            SubnetEntry::new("10.2.0.0/24", Scope::default()),
            SubnetEntry::new("203.154.0.0/24", Scope::default()),
        ];
        let report = Aggregator::default().aggregate(&subnets, &[], GroupBy::NetworkType);
        assert_eq!(report.groups["wan"].snapshot.capacity, 2);
        assert_eq!(report.groups["private"].snapshot.capacity, 254);
        assert_eq!(report.groups["public"].snapshot.capacity, 254);
        assert_eq!(report.private_available, 256);
        assert_eq!(report.public_available, 254);
    }

    #[test]
    fn test_vrf_unassigned_group() {
        let subnets = vec![SubnetEntry::new("10.9.0.0/29", Scope::default())];
        let report = Aggregator::default().aggregate(&subnets, &[], GroupBy::Vrf);
        assert_eq!(report.groups[UNASSIGNED_GROUP].snapshot.capacity, 6);
    }

    proptest! {
        #[test]
        fn prop_none_grouping_equals_sum_of_subnets(
            blocks in proptest::collection::vec((any::<u8>(), 24u8..=32), 1..8),
            hosts in proptest::collection::vec((any::<u8>(), any::<u8>(), any::<bool>()), 0..60),
        ) {
            let subnets: Vec<_> = blocks
                .iter()
                .map(|(b, p)| SubnetEntry::new(format!("10.{b}.0.0/{p}"), Scope::default()))
                .collect();
            let records: Vec<_> = hosts
                .iter()
                .map(|(b, h, used)| record([10, *b, 0, *h], "default", None, *used))
                .collect();

            let report = Aggregator::default().aggregate(&subnets, &records, GroupBy::None);
            let all = &report.groups[ALL_GROUP];

            let mut sum = UtilizationSnapshot::default();
            for s in &all.subnets {
                sum.absorb(&s.snapshot);
            }
            prop_assert_eq!(all.snapshot, sum);
            prop_assert_eq!(all.snapshot, report.total);
            prop_assert_eq!(all.subnet_count, subnets.len());
        }
    }
}

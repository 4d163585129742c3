//! Duplicate-address detection.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::record::{AddressRecord, Scope};

/// One row taking part in a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub scope: Scope,
    pub hostname: Option<String>,
    pub vrf: Option<String>,
}

/// An address held by more than one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub address: Ipv4Addr,
    pub count: usize,
    pub occurrences: Vec<Occurrence>,
}

/// Find addresses that appear in more than one record.
///
/// With `scope` set only that scope's records are considered, so the result
/// reports rows that violate `(address, scope)` uniqueness. Without it the
/// same address living in different scopes is reported too. Results are
/// ordered by occurrence count (highest first), then by address.
pub fn find_conflicts<'a, I>(records: I, scope: Option<&Scope>, limit: Option<usize>) -> Vec<Conflict>
where
    I: IntoIterator<Item = &'a AddressRecord>,
{
    let mut by_address: BTreeMap<Ipv4Addr, Vec<Occurrence>> = BTreeMap::new();
    for record in records {
        if scope.is_some_and(|s| s != &record.scope) {
            continue;
        }
        by_address.entry(record.address).or_default().push(Occurrence {
            scope: record.scope.clone(),
            hostname: record.tags.hostname().map(String::from),
            vrf: record.vrf_tag().map(String::from),
        });
    }

    let mut conflicts: Vec<Conflict> = by_address
        .into_iter()
        .filter(|(_, occurrences)| occurrences.len() > 1)
        .map(|(address, occurrences)| Conflict {
            address,
            count: occurrences.len(),
            occurrences,
        })
        .collect();

    // stable sort keeps address order within equal counts
    conflicts.sort_by(|a, b| b.count.cmp(&a.count));
    if let Some(limit) = limit {
        conflicts.truncate(limit);
    }
    conflicts
}

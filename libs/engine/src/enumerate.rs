//! Address enumeration.
//!
//! Merges the recorded rows of a subnet with synthesized `available`
//! placeholders into one ascending host sequence. The sequence is lazy; the
//! record lookup is built once, so a walk costs O(capacity + |records|) and a
//! page costs O(limit + |records|).

use std::collections::HashMap;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::record::AddressRecord;
use crate::status::{EffectiveStatus, StatusCounts, StatusInferencer};
use crate::subnet::{Hosts, SubnetDescriptor};

/// One position of the host sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumeratedAddress<'a> {
    pub address: Ipv4Addr,
    pub status: EffectiveStatus,
    /// Backing row, absent for placeholders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<&'a AddressRecord>,
}

/// Bounded window over the host sequence.
#[derive(Debug, Clone, Serialize)]
pub struct Page<'a> {
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
    pub has_more: bool,
    pub items: Vec<EnumeratedAddress<'a>>,
}

type Lookup<'a> = HashMap<u32, (&'a AddressRecord, EffectiveStatus)>;

/// Stateless enumerator bound to an inferencer and safety limits.
#[derive(Debug, Clone)]
pub struct Enumerator {
    inferencer: StatusInferencer,
    ceiling: u64,
    max_page_size: u64,
}

impl Default for Enumerator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Enumerator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            inferencer: StatusInferencer::canonical(),
            ceiling: config.enumeration_ceiling,
            max_page_size: config.max_page_size,
        }
    }

    pub fn inferencer(&self) -> StatusInferencer {
        self.inferencer
    }

    /// Unbounded lazy stream; the caller decides how much to consume.
    pub fn stream<'a, I>(&self, subnet: &SubnetDescriptor, records: I) -> Enumeration<'a>
    where
        I: IntoIterator<Item = &'a AddressRecord>,
    {
        Enumeration {
            hosts: subnet.hosts(),
            lookup: self.lookup(subnet, records),
        }
    }

    /// Explicit offset/limit window, without materializing skipped hosts.
    pub fn page<'a, I>(
        &self,
        subnet: &SubnetDescriptor,
        records: I,
        offset: u64,
        limit: u64,
    ) -> Result<Page<'a>, EngineError>
    where
        I: IntoIterator<Item = &'a AddressRecord>,
    {
        if limit > self.max_page_size {
            return Err(EngineError::UnboundedEnumerationRequested {
                requested: limit,
                ceiling: self.max_page_size,
            });
        }

        let total = subnet.capacity();
        let mut stream = self.stream(subnet, records);
        let items = match usize::try_from(offset) {
            Ok(skip) if offset < total => {
                stream.skip_to(skip);
                stream.by_ref().take(limit as usize).collect()
            }
            _ => Vec::new(),
        };

        Ok(Page {
            offset,
            limit,
            total,
            has_more: offset.saturating_add(items.len() as u64) < total,
            items,
        })
    }

    /// Full materialization, refused above the configured ceiling.
    pub fn enumerate_all<'a, I>(
        &self,
        subnet: &SubnetDescriptor,
        records: I,
    ) -> Result<Vec<EnumeratedAddress<'a>>, EngineError>
    where
        I: IntoIterator<Item = &'a AddressRecord>,
    {
        let capacity = subnet.capacity();
        if capacity > self.ceiling {
            return Err(EngineError::UnboundedEnumerationRequested {
                requested: capacity,
                ceiling: self.ceiling,
            });
        }
        Ok(self.stream(subnet, records).collect())
    }

    /// Status counts equal to folding [`Self::stream`], in O(|records|).
    pub fn tally<'a, I>(&self, subnet: &SubnetDescriptor, records: I) -> StatusCounts
    where
        I: IntoIterator<Item = &'a AddressRecord>,
    {
        let mut counts = StatusCounts::default();
        for (_, status) in self.lookup(subnet, records).values() {
            match status {
                EffectiveStatus::Used => counts.used += 1,
                EffectiveStatus::Reserved => counts.reserved += 1,
                EffectiveStatus::Available => {}
            }
        }
        counts.available = subnet
            .capacity()
            .saturating_sub(counts.used + counts.reserved);
        counts
    }

    /// Host-address lookup; on duplicates the strongest status wins.
    fn lookup<'a, I>(&self, subnet: &SubnetDescriptor, records: I) -> Lookup<'a>
    where
        I: IntoIterator<Item = &'a AddressRecord>,
    {
        let records = records.into_iter();
        let mut lookup: Lookup<'a> = HashMap::with_capacity(records.size_hint().0);
        for record in records {
            if !subnet.is_host(record.address) {
                continue;
            }
            let status = self.inferencer.infer_record(record);
            lookup
                .entry(u32::from(record.address))
                .and_modify(|slot| {
                    if status.rank() > slot.1.rank() {
                        *slot = (record, status);
                    }
                })
                .or_insert((record, status));
        }
        lookup
    }
}

/// Lazy merged host sequence.
#[derive(Debug, Clone)]
pub struct Enumeration<'a> {
    hosts: Hosts,
    lookup: Lookup<'a>,
}

impl<'a> Enumeration<'a> {
    /// Advance past the first `n` hosts in O(1).
    pub fn skip_to(&mut self, n: usize) {
        if n > 0 {
            self.hosts.nth(n - 1);
        }
    }

    fn resolve(&self, address: Ipv4Addr) -> EnumeratedAddress<'a> {
        match self.lookup.get(&u32::from(address)) {
            Some((record, status)) => EnumeratedAddress {
                address,
                status: *status,
                record: Some(*record),
            },
            None => EnumeratedAddress {
                address,
                status: EffectiveStatus::Available,
                record: None,
            },
        }
    }
}

impl<'a> Iterator for Enumeration<'a> {
    type Item = EnumeratedAddress<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.hosts.next()?;
        Some(self.resolve(address))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        let address = self.hosts.nth(n)?;
        Some(self.resolve(address))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.hosts.size_hint()
    }
}

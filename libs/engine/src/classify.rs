//! Network-type classification.
//!
//! Rules are explicit tables so each can be tested in isolation:
//! 1. overlaps a WAN-designated range and is point-to-point sized => `wan`
//! 2. inside an RFC 1918 block => `private`
//! 3. otherwise => `public`
//!
//! Text that does not parse falls back to `global`.

use std::fmt;

use ipnet::Ipv4Net;
use serde::Serialize;

use crate::subnet::SubnetDescriptor;

/// Network-type tag used for reporting and allocation fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Private,
    Public,
    Wan,
    Global,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Wan => "wan",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default WAN-designated ranges.
pub const DEFAULT_WAN_RANGES: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "203.0.0.0/8",
    "202.0.0.0/8",
    "61.0.0.0/8",
];

/// RFC 1918 private blocks.
pub const RFC1918_RANGES: &[&str] = &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"];

/// Largest block (in total addresses) still considered a WAN link.
pub const WAN_MAX_ADDRESSES: u64 = 4;

/// Smallest prefix length considered a WAN link.
pub const WAN_MIN_PREFIX: u8 = 30;

/// Pure classifier over a configured WAN rule table.
#[derive(Debug, Clone)]
pub struct Classifier {
    wan_ranges: Vec<Ipv4Net>,
    private_ranges: Vec<Ipv4Net>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(parse_ranges(DEFAULT_WAN_RANGES))
    }
}

impl Classifier {
    pub fn new(wan_ranges: Vec<Ipv4Net>) -> Self {
        Self {
            wan_ranges,
            private_ranges: parse_ranges(RFC1918_RANGES),
        }
    }

    pub fn wan_ranges(&self) -> &[Ipv4Net] {
        &self.wan_ranges
    }

    /// Classify a parsed subnet.
    pub fn classify(&self, subnet: &SubnetDescriptor) -> NetworkType {
        if self.is_wan(subnet) {
            NetworkType::Wan
        } else if self.is_private(subnet) {
            NetworkType::Private
        } else {
            NetworkType::Public
        }
    }

    /// Classify raw CIDR text; unparseable input is `global`.
    pub fn classify_cidr(&self, cidr: &str) -> NetworkType {
        match SubnetDescriptor::parse(cidr) {
            Ok(subnet) => self.classify(&subnet),
            Err(_) => NetworkType::Global,
        }
    }

    /// WAN rule: overlaps a designated range and is link sized.
    pub fn is_wan(&self, subnet: &SubnetDescriptor) -> bool {
        let link_sized =
            subnet.prefix_len() >= WAN_MIN_PREFIX || subnet.address_count() <= WAN_MAX_ADDRESSES;
        link_sized
            && self
                .wan_ranges
                .iter()
                .any(|range| overlaps(range, subnet.as_net()))
    }

    /// Private rule: the whole block sits inside an RFC 1918 range.
    pub fn is_private(&self, subnet: &SubnetDescriptor) -> bool {
        self.private_ranges
            .iter()
            .any(|range| range.contains(subnet.as_net()))
    }
}

fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(b) || b.contains(a)
}

/// Parse a static range table; entries that do not parse are dropped.
pub fn parse_ranges(ranges: &[&str]) -> Vec<Ipv4Net> {
    ranges.iter().filter_map(|r| r.parse().ok()).collect()
}

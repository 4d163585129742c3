//! IPv4 subnet descriptor.
//!
//! A [`SubnetDescriptor`] is an immutable, normalized CIDR block. It knows its
//! usable capacity and can lazily walk its host addresses in ascending order.

use std::fmt;
use std::iter::FusedIterator;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use serde::{Serialize, Serializer};

use crate::error::EngineError;

/// Normalized IPv4 CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubnetDescriptor {
    net: Ipv4Net,
}

impl SubnetDescriptor {
    /// Build from an address and prefix length, zeroing host bits.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, EngineError> {
        let net = Ipv4Net::new(address, prefix_len).map_err(|_| {
            EngineError::InvalidSubnetFormat(format!("{address}/{prefix_len}"))
        })?;
        Ok(Self { net: net.trunc() })
    }

    /// Parse CIDR text such as `192.168.1.10/24`.
    ///
    /// Parsing is non-strict: host bits are accepted and cleared. A bare
    /// address without a prefix is treated as a /32 host route.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let s = s.trim();
        let invalid = || EngineError::InvalidSubnetFormat(s.to_string());

        let (addr_str, prefix_len) = match s.split_once('/') {
            Some((addr, prefix)) => {
                // Only plain decimal prefixes; no signs or whitespace.
                if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                (addr, prefix.parse::<u8>().map_err(|_| invalid())?)
            }
            None => (s, 32),
        };

        let address = Ipv4Addr::from_str(addr_str).map_err(|_| invalid())?;
        if prefix_len > 32 {
            return Err(invalid());
        }
        Self::new(address, prefix_len)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.net.network()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.net.broadcast()
    }

    pub fn netmask(&self) -> Ipv4Addr {
        self.net.netmask()
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    /// Underlying [`Ipv4Net`], for range arithmetic such as overlap checks.
    pub fn as_net(&self) -> &Ipv4Net {
        &self.net
    }

    /// Total number of addresses in the block, including network/broadcast.
    pub fn address_count(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len()))
    }

    /// Usable host count.
    ///
    /// `2^(32-p) - 2` for p <= 30; /31 and /32 keep every address.
    pub fn capacity(&self) -> u64 {
        let total = self.address_count();
        if self.prefix_len() >= 31 {
            total
        } else {
            total - 2
        }
    }

    /// Whether `ip` falls anywhere inside the block.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.net.contains(&ip)
    }

    /// Whether `ip` is one of the addresses yielded by [`Self::hosts`].
    pub fn is_host(&self, ip: Ipv4Addr) -> bool {
        let v = u32::from(ip);
        v >= self.first_host_u32() && v <= self.last_host_u32()
    }

    pub fn first_host(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.first_host_u32())
    }

    pub fn last_host(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.last_host_u32())
    }

    /// Zero-based position of `ip` in the host sequence.
    pub fn host_offset(&self, ip: Ipv4Addr) -> Option<u64> {
        self.is_host(ip)
            .then(|| u64::from(u32::from(ip) - self.first_host_u32()))
    }

    /// Lazy, restartable walk over usable host addresses, ascending.
    pub fn hosts(&self) -> Hosts {
        Hosts {
            next: u64::from(self.first_host_u32()),
            end: u64::from(self.last_host_u32()) + 1,
        }
    }

    fn first_host_u32(&self) -> u32 {
        let network = u32::from(self.network());
        if self.prefix_len() >= 31 {
            network
        } else {
            network + 1
        }
    }

    fn last_host_u32(&self) -> u32 {
        let broadcast = u32::from(self.broadcast());
        if self.prefix_len() >= 31 {
            broadcast
        } else {
            broadcast - 1
        }
    }
}

impl fmt::Display for SubnetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix_len())
    }
}

impl FromStr for SubnetDescriptor {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SubnetDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Iterator over the host addresses of a subnet.
///
/// `nth` jumps in O(1), so offset/limit paging never walks skipped hosts.
#[derive(Debug, Clone)]
pub struct Hosts {
    next: u64,
    end: u64,
}

impl Iterator for Hosts {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let addr = Ipv4Addr::from(self.next as u32);
        self.next += 1;
        Some(addr)
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.next = self.next.saturating_add(n as u64).min(self.end);
        self.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl FusedIterator for Hosts {}

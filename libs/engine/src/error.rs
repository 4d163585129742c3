//! Engine error taxonomy.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed CIDR text.
    #[error("invalid subnet format: {0}")]
    InvalidSubnetFormat(String),

    /// Malformed IPv4 address text.
    #[error("invalid address format: {0}")]
    InvalidAddress(String),

    /// The (address, scope) key already has a record.
    #[error("address {address} already claimed in scope {scope}")]
    AddressAlreadyClaimed { address: Ipv4Addr, scope: String },

    /// Every host address of the subnet is used or reserved.
    #[error("no capacity available in {0}")]
    NoCapacityAvailable(String),

    /// A full materialization (or an oversized page) was requested.
    #[error("enumeration of {requested} addresses exceeds the ceiling of {ceiling}")]
    UnboundedEnumerationRequested { requested: u64, ceiling: u64 },

    /// `reserve_next` lost every race within its retry budget.
    #[error("reservation in {subnet} still contended after {attempts} attempts")]
    ReservationContention { subnet: String, attempts: u32 },

    /// Store failure. Never swallowed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSubnetFormat(_) => "invalid_subnet_format",
            Self::InvalidAddress(_) => "invalid_address_format",
            Self::AddressAlreadyClaimed { .. } => "address_already_claimed",
            Self::NoCapacityAvailable(_) => "no_capacity_available",
            Self::UnboundedEnumerationRequested { .. } => "unbounded_enumeration",
            Self::ReservationContention { .. } => "reservation_contention",
            Self::Store(_) => "internal_error",
        }
    }
}

/// Parse an IPv4 address, mapping failures into the engine taxonomy.
pub fn parse_address(s: &str) -> Result<Ipv4Addr, EngineError> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| EngineError::InvalidAddress(s.to_string()))
}

//! IP-space utilization engine.
//!
//! Given a catalog of IPv4 CIDR blocks and a sparse inventory of address
//! records, this crate:
//!
//! - computes usable capacity per block ([`SubnetDescriptor`]);
//! - tags blocks by network type ([`Classifier`]);
//! - derives a tri-state status per record ([`StatusInferencer`]);
//! - merges records with implied placeholders into the full, lazily
//!   enumerated host sequence ([`Enumerator`]);
//! - rolls utilization up by VRF, section or network type ([`Aggregator`]);
//! - reports duplicate addresses ([`find_conflicts`]);
//! - ranks subnets for an allocation request ([`recommend`]);
//! - claims addresses safely under concurrency ([`ReservationCoordinator`]).
//!
//! Everything except reservation is a pure function over data read from an
//! [`AddressStore`].

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod conflict;
pub mod enumerate;
pub mod error;
pub mod id;
pub mod record;
pub mod reservation;
pub mod scoring;
pub mod status;
pub mod store;
pub mod subnet;

pub use aggregate::{
    AggregationReport, Aggregator, GroupBy, GroupSummary, SoftError, SubnetUtilization,
    UtilizationSnapshot, UTILIZATION_DECIMALS,
};
pub use classify::{Classifier, NetworkType};
pub use config::EngineConfig;
pub use conflict::{find_conflicts, Conflict, Occurrence};
pub use enumerate::{EnumeratedAddress, Enumeration, Enumerator, Page};
pub use error::{parse_address, EngineError};
pub use id::{IdError, RecordId, SectionId, SubnetId};
pub use record::{
    AddressKey, AddressPatch, AddressRecord, AddressTags, NewAddressRecord, Scope, SubnetEntry,
};
pub use reservation::{FailedReservation, ReservationCoordinator, ReservationReport, ReservationTags};
pub use scoring::{recommend, AllocationRequest, Candidate, RecommendationScore, ServiceClass};
pub use status::{compare_methods, EffectiveStatus, StatusComparison, StatusInferencer, StatusMode};
pub use store::{AddressStore, InsertOutcome, MemoryStore, StoreError, UpdateOutcome};
pub use subnet::{Hosts, SubnetDescriptor};

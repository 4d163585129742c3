//! Allocation scoring.
//!
//! A candidate's score is the weighted sum of four 0-100 sub-scores:
//!
//! | factor          | weight |
//! |-----------------|--------|
//! | availability    | 40%    |
//! | capacity margin | 25%    |
//! | VRF match       | 20%    |
//! | network fit     | 15%    |
//!
//! Each sub-score comes from a fixed band table below.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::aggregate::{round_percent, SubnetUtilization};
use crate::classify::NetworkType;
use crate::subnet::SubnetDescriptor;

pub const AVAILABILITY_WEIGHT: f64 = 0.40;
pub const CAPACITY_MARGIN_WEIGHT: f64 = 0.25;
pub const VRF_MATCH_WEIGHT: f64 = 0.20;
pub const NETWORK_FIT_WEIGHT: f64 = 0.15;

/// Recommendations returned when the request does not say.
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 5;

/// `(minimum available/capacity ratio, score)`, first match wins.
const AVAILABILITY_BANDS: &[(f64, f64)] = &[(0.75, 100.0), (0.50, 80.0), (0.25, 60.0), (0.10, 40.0)];

/// `(minimum available/required ratio, score)`, first match wins.
const MARGIN_BANDS: &[(f64, f64)] = &[(4.0, 100.0), (2.0, 80.0), (1.5, 60.0), (1.0, 40.0)];

/// What the requested addresses will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceClass {
    PublicFacing,
    Internal,
    PointToPoint,
    #[default]
    Any,
}

impl ServiceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicFacing => "public_facing",
            Self::Internal => "internal",
            Self::PointToPoint => "point_to_point",
            Self::Any => "any",
        }
    }

    /// Network-type fit table.
    pub fn fit(&self, network_type: NetworkType) -> f64 {
        use NetworkType::*;
        match (self, network_type) {
            (Self::Any, _) => 70.0,
            (Self::PublicFacing, Public) => 100.0,
            (Self::PublicFacing, Global) => 50.0,
            (Self::PublicFacing, Wan) => 30.0,
            (Self::PublicFacing, Private) => 10.0,
            (Self::Internal, Private) => 100.0,
            (Self::Internal, Global) => 50.0,
            (Self::Internal, Wan) => 40.0,
            (Self::Internal, Public) => 30.0,
            (Self::PointToPoint, Wan) => 100.0,
            (Self::PointToPoint, Private) => 60.0,
            (Self::PointToPoint, Global) => 50.0,
            (Self::PointToPoint, Public) => 40.0,
        }
    }
}

impl fmt::Display for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public_facing" => Ok(Self::PublicFacing),
            "internal" => Ok(Self::Internal),
            "point_to_point" => Ok(Self::PointToPoint),
            "any" | "" => Ok(Self::Any),
            other => Err(format!("unknown service class: {other}")),
        }
    }
}

/// Request-scoped allocation ask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub required_count: u64,

    #[serde(default)]
    pub vrf: Option<String>,

    #[serde(default)]
    pub service_class: ServiceClass,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_RECOMMENDATION_LIMIT
}

impl AllocationRequest {
    pub fn new(required_count: u64) -> Self {
        Self {
            required_count,
            vrf: None,
            service_class: ServiceClass::Any,
            limit: DEFAULT_RECOMMENDATION_LIMIT,
        }
    }

    pub fn with_vrf(mut self, vrf: impl Into<String>) -> Self {
        self.vrf = Some(vrf.into());
        self
    }

    pub fn with_service_class(mut self, service_class: ServiceClass) -> Self {
        self.service_class = service_class;
        self
    }

    fn requested_vrf(&self) -> Option<&str> {
        crate::record::vrf_tag(self.vrf.as_deref())
    }
}

/// Scoring input for one subnet.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub subnet: SubnetDescriptor,
    pub capacity: u64,
    pub used: u64,
    pub available: u64,
    pub vrfs: Vec<String>,
    pub network_type: NetworkType,
}

impl From<&SubnetUtilization> for Candidate {
    fn from(u: &SubnetUtilization) -> Self {
        Self {
            subnet: u.subnet,
            capacity: u.snapshot.capacity,
            used: u.snapshot.used,
            available: u.snapshot.available,
            vrfs: u.vrfs.clone(),
            network_type: u.network_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub availability: f64,
    pub capacity_margin: f64,
    pub vrf_match: f64,
    pub network_fit: f64,
}

impl ScoreBreakdown {
    pub fn weighted(&self) -> f64 {
        self.availability * AVAILABILITY_WEIGHT
            + self.capacity_margin * CAPACITY_MARGIN_WEIGHT
            + self.vrf_match * VRF_MATCH_WEIGHT
            + self.network_fit * NETWORK_FIT_WEIGHT
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationScore {
    pub subnet: SubnetDescriptor,
    pub network_type: NetworkType,
    pub used: u64,
    pub available: u64,
    pub capacity: u64,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reason: String,
}

fn band(ratio: f64, bands: &[(f64, f64)]) -> f64 {
    bands
        .iter()
        .find(|(min, _)| ratio >= *min)
        .map(|(_, score)| *score)
        .unwrap_or(0.0)
}

fn availability_score(available: u64, capacity: u64) -> f64 {
    if capacity == 0 || available == 0 {
        return 0.0;
    }
    // any free address beats a full subnet
    band(available as f64 / capacity as f64, AVAILABILITY_BANDS).max(20.0)
}

fn capacity_margin_score(available: u64, required: u64) -> f64 {
    if required == 0 {
        return if available > 0 { 100.0 } else { 0.0 };
    }
    band(available as f64 / required as f64, MARGIN_BANDS)
}

fn vrf_match_score(requested: Option<&str>, vrfs: &[String]) -> f64 {
    match requested {
        None => 50.0,
        Some(_) if vrfs.is_empty() => 40.0,
        Some(vrf) if vrfs.iter().any(|v| v == vrf) => 100.0,
        Some(_) => 0.0,
    }
}

/// Score one candidate against a request.
pub fn score(candidate: &Candidate, request: &AllocationRequest) -> RecommendationScore {
    let requested_vrf = request.requested_vrf();
    let breakdown = ScoreBreakdown {
        availability: availability_score(candidate.available, candidate.capacity),
        capacity_margin: capacity_margin_score(candidate.available, request.required_count),
        vrf_match: vrf_match_score(requested_vrf, &candidate.vrfs),
        network_fit: request.service_class.fit(candidate.network_type),
    };

    RecommendationScore {
        subnet: candidate.subnet,
        network_type: candidate.network_type,
        used: candidate.used,
        available: candidate.available,
        capacity: candidate.capacity,
        score: round_percent(breakdown.weighted()),
        breakdown,
        reason: reason(candidate, request, requested_vrf, &breakdown),
    }
}

fn reason(
    candidate: &Candidate,
    request: &AllocationRequest,
    requested_vrf: Option<&str>,
    breakdown: &ScoreBreakdown,
) -> String {
    let mut parts = vec![format!(
        "{} of {} addresses available ({} used) for {} requested",
        candidate.available, candidate.capacity, candidate.used, request.required_count
    )];
    match requested_vrf {
        Some(vrf) if breakdown.vrf_match >= 100.0 => parts.push(format!("in VRF {vrf}")),
        Some(vrf) if breakdown.vrf_match > 0.0 => parts.push(format!("no VRF tag, {vrf} requested")),
        Some(vrf) => parts.push(format!("outside VRF {vrf}")),
        None => {}
    }
    parts.push(format!(
        "{} network for {} service",
        candidate.network_type, request.service_class
    ));
    parts.join("; ")
}

/// Rank candidates and keep the best `request.limit`.
///
/// Subnets that cannot hold `required_count` addresses are excluded. Ties on
/// score prefer more available addresses, then the lower subnet.
pub fn recommend<'a, I>(candidates: I, request: &AllocationRequest) -> Vec<RecommendationScore>
where
    I: IntoIterator<Item = &'a Candidate>,
{
    let mut scored: Vec<RecommendationScore> = candidates
        .into_iter()
        .filter(|c| c.available >= request.required_count)
        .map(|c| score(c, request))
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.available.cmp(&a.available))
            .then_with(|| a.subnet.cmp(&b.subnet))
    });
    scored.truncate(request.limit);
    scored
}

//! Engine tuning knobs.

use ipnet::Ipv4Net;

use crate::classify::{parse_ranges, Classifier, DEFAULT_WAN_RANGES};

/// Engine configuration, passed explicitly to each component.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Largest subnet capacity that may be fully materialized.
    pub enumeration_ceiling: u64,

    /// Largest page a caller may request.
    pub max_page_size: u64,

    /// Rescans `reserve_next` spends on one address whose row keeps changing
    /// while still reading as available. Lost insert races are free.
    pub reserve_max_attempts: u32,

    /// Concurrent claims inside one `reserve_many` batch.
    pub reserve_concurrency: usize,

    /// WAN-designated ranges for classification.
    pub wan_ranges: Vec<Ipv4Net>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enumeration_ceiling: 65_536,
            max_page_size: 1_024,
            reserve_max_attempts: 32,
            reserve_concurrency: 8,
            wan_ranges: parse_ranges(DEFAULT_WAN_RANGES),
        }
    }
}

impl EngineConfig {
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.wan_ranges.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.enumeration_ceiling, 65_536);
        assert_eq!(config.max_page_size, 1_024);
        assert_eq!(config.wan_ranges.len(), DEFAULT_WAN_RANGES.len());
        assert!(config.reserve_max_attempts > 0);
    }
}

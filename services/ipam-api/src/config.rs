use std::net::SocketAddr;

use anyhow::{Context, Result};
use ipscope_engine::EngineConfig;

use crate::db::DbConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub database: DbConfig,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("IPSCOPE_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = std::env::var("IPSCOPE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("IPSCOPE_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let database = DbConfig::from_env();
        let engine = engine_from_env()?;

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            database,
            engine,
        })
    }
}

fn engine_from_env() -> Result<EngineConfig> {
    let mut engine = EngineConfig::default();

    if let Some(v) = env_parse("IPSCOPE_ENUMERATION_CEILING")? {
        engine.enumeration_ceiling = v;
    }
    if let Some(v) = env_parse("IPSCOPE_MAX_PAGE_SIZE")? {
        engine.max_page_size = v;
    }
    if let Some(v) = env_parse("IPSCOPE_RESERVE_MAX_ATTEMPTS")? {
        engine.reserve_max_attempts = v;
    }
    if let Some(v) = env_parse("IPSCOPE_RESERVE_CONCURRENCY")? {
        engine.reserve_concurrency = v;
    }
    if let Ok(raw) = std::env::var("IPSCOPE_WAN_RANGES") {
        engine.wan_ranges = parse_wan_ranges(&raw)?;
    }

    Ok(engine)
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {name}: {raw}")),
        Err(_) => Ok(None),
    }
}

/// Comma-separated CIDR list. Unlike catalog data, a bad entry here is fatal.
fn parse_wan_ranges(raw: &str) -> Result<Vec<ipnet::Ipv4Net>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ipnet::Ipv4Net>()
                .map(|net| net.trunc())
                .with_context(|| format!("invalid IPSCOPE_WAN_RANGES entry: {s}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wan_ranges() {
        let ranges = parse_wan_ranges("10.0.0.0/8, 203.0.0.5/8,,").unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].to_string(), "203.0.0.0/8");
        assert!(parse_wan_ranges("10.0.0.0/8,bogus").is_err());
    }
}

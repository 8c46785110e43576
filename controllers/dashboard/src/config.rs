//! Server configuration read from environment variables.

use crate::error::ServerError;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use watch_engine::EngineConfig;

/// Everything the server needs at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket the HTTP listener binds
    pub listen_addr: SocketAddr,
    /// YAML file listing the tenants to connect
    pub tenants_file: PathBuf,
    /// Engine tunables
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let defaults = EngineConfig::default();
        let engine = EngineConfig::default()
            .with_sync_timeout(Duration::from_secs(parse(
                &lookup,
                "SYNC_TIMEOUT_SECS",
                defaults.sync_timeout.as_secs(),
            )?))
            .with_ticks(
                Duration::from_millis(parse(&lookup, "FAST_TICK_MS", 250)?),
                Duration::from_millis(parse(&lookup, "SLOW_TICK_MS", 1000)?),
            )
            .with_coalescer_capacity(parse(
                &lookup,
                "COALESCER_CAPACITY",
                defaults.coalescer_capacity,
            )?)
            .with_subscriber_buffer(parse(
                &lookup,
                "SUBSCRIBER_BUFFER",
                defaults.subscriber_buffer,
            )?)
            .with_discovery_ttl(Duration::from_secs(parse(
                &lookup,
                "DISCOVERY_TTL_SECS",
                defaults.discovery_ttl.as_secs(),
            )?));

        if engine.fast_tick.is_zero() || engine.slow_tick.is_zero() {
            return Err(ServerError::InvalidConfig(
                "tick intervals must be greater than zero".to_string(),
            ));
        }
        if engine.coalescer_capacity == 0 || engine.subscriber_buffer == 0 {
            return Err(ServerError::InvalidConfig(
                "COALESCER_CAPACITY and SUBSCRIBER_BUFFER must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            listen_addr: parse(&lookup, "LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            tenants_file: lookup("TENANTS_FILE")
                .map_or_else(|| PathBuf::from("tenants.yaml"), PathBuf::from),
            engine,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T, ServerError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| ServerError::InvalidConfig(format!("{name}={raw}: {err}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ServerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.tenants_file, PathBuf::from("tenants.yaml"));
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("SYNC_TIMEOUT_SECS", "3"),
            ("FAST_TICK_MS", "100"),
            ("SUBSCRIBER_BUFFER", "4"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.engine.sync_timeout, Duration::from_secs(3));
        assert_eq!(config.engine.fast_tick, Duration::from_millis(100));
        assert_eq!(config.engine.slow_tick, Duration::from_secs(1));
        assert_eq!(config.engine.subscriber_buffer, 4);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = config(&[("FAST_TICK_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("FAST_TICK_MS=soon"));

        assert!(matches!(
            config(&[("SUBSCRIBER_BUFFER", "0")]),
            Err(ServerError::InvalidConfig(_))
        ));
    }
}

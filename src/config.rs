//! Runtime configuration from CLI flags and environment variables.
//!
//! Only malformed configuration is fatal at startup; an unreachable switcher
//! is a steady-state condition handled by the transport.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

use crate::atem::protocol::ATEM_PORT;

/// ATEM Exporter - Prometheus metrics for Blackmagic ATEM switchers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// ATEM switcher IP address
    #[arg(long, env = "ATEM_IP", default_value = "192.168.1.100")]
    pub atem_ip: String,

    /// HTTP listen port for the metrics endpoint
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Clear last-known values on disconnect instead of retaining them
    #[arg(long, env = "CLEAR_ON_DISCONNECT", default_value_t = false)]
    pub clear_on_disconnect: bool,

    /// Seconds between best-effort full state refreshes while connected
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value_t = 5)]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid ATEM address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("refresh interval must be at least 1 second")]
    ZeroRefreshInterval,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub atem_addr: SocketAddr,
    pub port: u16,
    pub clear_on_disconnect: bool,
    pub refresh_interval: Duration,
}

impl Args {
    pub fn into_config(self) -> Result<AppConfig, ConfigError> {
        let ip: IpAddr = self
            .atem_ip
            .parse()
            .map_err(|source| ConfigError::InvalidAddress {
                addr: self.atem_ip.clone(),
                source,
            })?;
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroRefreshInterval);
        }

        Ok(AppConfig {
            atem_addr: SocketAddr::new(ip, ATEM_PORT),
            port: self.port,
            clear_on_disconnect: self.clear_on_disconnect,
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Args::parse_from(["atem-exporter"]).into_config().unwrap();

        assert_eq!(config.atem_addr.to_string(), "192.168.1.100:9910");
        assert_eq!(config.port, 8000);
        assert!(!config.clear_on_disconnect);
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
    }

    #[test]
    fn flags_override_defaults() {
        let config = Args::parse_from([
            "atem-exporter",
            "--atem-ip",
            "10.0.0.7",
            "--port",
            "9100",
            "--clear-on-disconnect",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.atem_addr.to_string(), "10.0.0.7:9910");
        assert_eq!(config.port, 9100);
        assert!(config.clear_on_disconnect);
    }

    #[test]
    fn invalid_address_is_a_startup_error() {
        let result = Args::parse_from(["atem-exporter", "--atem-ip", "not-an-ip"]).into_config();
        assert!(matches!(result, Err(ConfigError::InvalidAddress { .. })));
    }

    #[test]
    fn zero_refresh_interval_is_rejected() {
        let result =
            Args::parse_from(["atem-exporter", "--refresh-interval-secs", "0"]).into_config();
        assert!(matches!(result, Err(ConfigError::ZeroRefreshInterval)));
    }

    #[test]
    fn malformed_port_fails_to_parse() {
        assert!(Args::try_parse_from(["atem-exporter", "--port", "99999"]).is_err());
    }
}

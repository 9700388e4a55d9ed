use log::{debug, info};
use std::env;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::SolarBasis;

const DEFAULT_GATEWAY_PORT: u16 = 45000;
const DEFAULT_STATE_FILE: &str = "observations.json";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const AUTO_DISCOVER: &str = "auto discover";

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// None means the gateway is found by broadcast discovery
    pub gateway_ip: Option<Ipv4Addr>,
    pub gateway_port: u16,
    pub state_file: PathBuf,
    pub poll_interval: Duration,
    pub solar_basis: SolarBasis,
    /// Finalized daily metrics are only logged when unset
    pub database_url: Option<String>,
}

impl GatewayConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let gateway_ip = match value("GATEWAY_IP") {
            None => None,
            Some(ip) if ip.eq_ignore_ascii_case(AUTO_DISCOVER) => None,
            Some(ip) => Some(ip.parse().map_err(|_| ConfigError::InvalidValue {
                key: "GATEWAY_IP",
                value: ip.clone(),
            })?),
        };

        let gateway_port = match value("GATEWAY_PORT") {
            None => DEFAULT_GATEWAY_PORT,
            Some(port) => port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "GATEWAY_PORT",
                value: port.clone(),
            })?,
        };

        let poll_interval_secs = match value("POLL_INTERVAL_SECS") {
            None => DEFAULT_POLL_INTERVAL_SECS,
            Some(secs) => secs
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: "POLL_INTERVAL_SECS",
                    value: secs.clone(),
                })?,
        };

        let solar_basis = match value("SOLAR_BASIS") {
            None => SolarBasis::default(),
            Some(basis) => basis.parse()?,
        };

        let config = GatewayConfig {
            gateway_ip,
            gateway_port,
            state_file: value("STATE_FILE")
                .unwrap_or_else(|| DEFAULT_STATE_FILE.to_string())
                .into(),
            poll_interval: Duration::from_secs(poll_interval_secs),
            solar_basis,
            database_url: value("DATABASE_URL"),
        };

        match config.gateway_addr() {
            Some(addr) => info!("Gateway configured at {}", addr),
            None => info!("No gateway address configured, using auto discovery"),
        }
        debug!(
            "State file: {}, poll interval: {}s, solar basis: {:?}",
            config.state_file.display(),
            poll_interval_secs,
            config.solar_basis
        );

        Ok(config)
    }

    pub fn gateway_addr(&self) -> Option<SocketAddr> {
        self.gateway_ip
            .map(|ip| SocketAddr::V4(SocketAddrV4::new(ip, self.gateway_port)))
    }
}

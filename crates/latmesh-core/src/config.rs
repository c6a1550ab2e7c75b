//! Configuration system for latmesh.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LATMESH_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/latmesh/config.toml
//!   3. ~/.config/latmesh/config.toml
//!
//! A missing file is not an error. The identity section has no usable
//! default: region and app name must come from the file or the environment,
//! otherwise `load` fails and the daemon refuses to start.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Suffix of every private-network name used for discovery and dialing.
pub const INTERNAL_DOMAIN: &str = "internal";

/// Fallback DNS server when /etc/resolv.conf names none (the 6PN resolver).
pub const FALLBACK_RESOLVER: SocketAddr =
    SocketAddr::new(IpAddr::V6(Ipv6Addr::new(0xfdaa, 0, 0, 0, 0, 0, 0, 3)), 53);

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatmeshConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub measurement: MeasurementConfig,
    pub listener: ListenerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Identifier of the region this process runs in, e.g. "iad".
    pub region: String,
    /// Application namespace used to build peer addresses and the
    /// discovery record name.
    pub app_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the ping listener binds. `::` binds dual-stack.
    pub ping_bind: IpAddr,
    /// TCP port for the ping protocol, both listening and dialing.
    pub ping_port: u16,
    /// Address the HTTP endpoints bind.
    pub http_bind: IpAddr,
    pub http_port: u16,
    /// Deadline for establishing an outbound ping connection.
    pub connect_timeout_ms: u64,
    /// Deadline for each line write/read of the handshake.
    pub io_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub interval_secs: u64,
    /// DNS server queried for the region list. None = first nameserver in
    /// /etc/resolv.conf, then FALLBACK_RESOLVER.
    pub resolver: Option<SocketAddr>,
    pub query_timeout_ms: u64,
    /// Remove peers that disappear from a successful, non-empty lookup.
    /// Removing a peer drops its histogram.
    pub prune_missing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub interval_ms: u64,
    /// Max peers pinged in parallel within one cycle.
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// How long the server side holds a connection open after the handshake.
    pub grace_ms: u64,
    /// Max inbound connections handled at once. Extra ones are closed.
    pub max_connections: usize,
    /// Sustained accepted connections per second.
    pub accept_rate: f64,
    /// Burst of connections admitted above the sustained rate.
    pub accept_burst: f64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ping_bind: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            ping_port: 10000,
            http_bind: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            http_port: 9091,
            connect_timeout_ms: 2_000,
            io_timeout_ms: 2_000,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            resolver: None,
            query_timeout_ms: 3_000,
            prune_missing: true,
        }
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            concurrency: 16,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            grace_ms: 250,
            max_connections: 256,
            accept_rate: 200.0,
            accept_burst: 100.0,
        }
    }
}

// ── Durations & derived values ───────────────────────────────────────────────

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn ping_listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ping_bind, self.ping_port)
    }

    pub fn http_listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http_bind, self.http_port)
    }
}

impl DiscoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// The configured resolver, else the system one, else the 6PN default.
    pub fn resolver_addr(&self) -> SocketAddr {
        self.resolver
            .or_else(|| {
                std::fs::read_to_string("/etc/resolv.conf")
                    .ok()
                    .and_then(|text| parse_resolv_conf(&text))
            })
            .unwrap_or(FALLBACK_RESOLVER)
    }
}

impl MeasurementConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ListenerConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl LatmeshConfig {
    /// Dial address of a peer region: `<region>.<app>.internal:<ping_port>`.
    pub fn peer_address(&self, region: &str) -> String {
        format!(
            "{}.{}.{}:{}",
            region, self.identity.app_name, INTERNAL_DOMAIN, self.network.ping_port
        )
    }

    /// DNS name of the TXT record listing every deployed region.
    pub fn regions_record(&self) -> String {
        format!("regions.{}.{}", self.identity.app_name, INTERNAL_DOMAIN)
    }
}

/// First usable `nameserver` line of a resolv.conf body.
pub fn parse_resolv_conf(text: &str) -> Option<SocketAddr> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("nameserver"), Some(addr)) => addr.parse::<IpAddr>().ok(),
                _ => None,
            }
        })
        .map(|ip| SocketAddr::new(ip, 53))
        .next()
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("latmesh")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("local region is unset (set LATMESH_REGION or FLY_REGION)")]
    MissingRegion,
    #[error("application name is unset (set LATMESH_APP_NAME or FLY_APP_NAME)")]
    MissingAppName,
    #[error("{field} {value:?} may only contain ASCII letters, digits, '-' and '_'")]
    InvalidName { field: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

pub const CONFIG_PATH_ENV: &str = "LATMESH_CONFIG";
pub const FLY_REGION_ENV: &str = "FLY_REGION";
pub const FLY_APP_NAME_ENV: &str = "FLY_APP_NAME";
pub const REGION_ENV: &str = "LATMESH_REGION";
pub const APP_NAME_ENV: &str = "LATMESH_APP_NAME";
pub const PING_PORT_ENV: &str = "LATMESH_PING_PORT";
pub const HTTP_PORT_ENV: &str = "LATMESH_HTTP_PORT";
pub const DISCOVERY_INTERVAL_ENV: &str = "LATMESH_DISCOVERY_INTERVAL_SECS";
pub const MEASUREMENT_INTERVAL_ENV: &str = "LATMESH_MEASUREMENT_INTERVAL_MS";
pub const RESOLVER_ENV: &str = "LATMESH_RESOLVER";

impl LatmeshConfig {
    /// Load config: env vars → file → defaults, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path(), |var| std::env::var(var).ok())
    }

    /// Load from an explicit file path with an explicit environment lookup.
    pub fn load_from(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            LatmeshConfig::default()
        };
        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply environment overrides. LATMESH_* wins over FLY_*.
    pub fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        for var in [FLY_REGION_ENV, REGION_ENV] {
            if let Some(v) = env(var) {
                self.identity.region = v;
            }
        }
        for var in [FLY_APP_NAME_ENV, APP_NAME_ENV] {
            if let Some(v) = env(var) {
                self.identity.app_name = v;
            }
        }
        if let Some(v) = env(PING_PORT_ENV) {
            self.network.ping_port = parse_env(PING_PORT_ENV, v)?;
        }
        if let Some(v) = env(HTTP_PORT_ENV) {
            self.network.http_port = parse_env(HTTP_PORT_ENV, v)?;
        }
        if let Some(v) = env(DISCOVERY_INTERVAL_ENV) {
            self.discovery.interval_secs = parse_env(DISCOVERY_INTERVAL_ENV, v)?;
        }
        if let Some(v) = env(MEASUREMENT_INTERVAL_ENV) {
            self.measurement.interval_ms = parse_env(MEASUREMENT_INTERVAL_ENV, v)?;
        }
        if let Some(v) = env(RESOLVER_ENV) {
            self.discovery.resolver = Some(parse_env(RESOLVER_ENV, v)?);
        }
        Ok(())
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.region.trim().is_empty() {
            return Err(ConfigError::MissingRegion);
        }
        if self.identity.app_name.trim().is_empty() {
            return Err(ConfigError::MissingAppName);
        }
        check_label("identity.region", &self.identity.region)?;
        check_label("identity.app_name", &self.identity.app_name)?;
        if self.discovery.interval_secs == 0 {
            return Err(ConfigError::Zero("discovery.interval_secs"));
        }
        if self.measurement.interval_ms == 0 {
            return Err(ConfigError::Zero("measurement.interval_ms"));
        }
        if self.measurement.concurrency == 0 {
            return Err(ConfigError::Zero("measurement.concurrency"));
        }
        if self.listener.max_connections == 0 {
            return Err(ConfigError::Zero("listener.max_connections"));
        }
        Ok(())
    }
}

/// Region and app names end up in DNS labels, wire lines and metric names.
fn check_label(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let ok = value.len() <= 63
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidName {
            field,
            value: value.to_string(),
        })
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

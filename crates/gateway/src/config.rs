//! Bridge configuration
//!
//! Loaded from JSON, every field optional with a sensible default, then
//! optionally overridden from the environment:
//!
//! - `QS_TWS_HOST`
//! - `QS_TWS_PORT`
//! - `QS_TWS_CLIENT_ID`

use crate::error::ConfigError;
use crate::messages::request::{HistoricalWindow, MarketDataType};
use crate::transport::{Endpoint, TWS_PAPER_PORT};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_HOST: &str = "QS_TWS_HOST";
pub const ENV_PORT: &str = "QS_TWS_PORT";
pub const ENV_CLIENT_ID: &str = "QS_TWS_CLIENT_ID";

/// Historical request policy: a fixed lookback and bar size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalConfig {
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default = "default_bar_size")]
    pub bar_size: String,
    #[serde(default = "default_what_to_show")]
    pub what_to_show: String,
    #[serde(default = "default_use_rth")]
    pub use_rth: bool,
}

fn default_duration() -> String {
    "1 D".to_string()
}

fn default_bar_size() -> String {
    "1 min".to_string()
}

fn default_what_to_show() -> String {
    "TRADES".to_string()
}

fn default_use_rth() -> bool {
    true
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            bar_size: default_bar_size(),
            what_to_show: default_what_to_show(),
            use_rth: default_use_rth(),
        }
    }
}

impl HistoricalConfig {
    /// Window ending now
    pub fn window(&self) -> HistoricalWindow {
        HistoricalWindow {
            end: String::new(),
            duration: self.duration.clone(),
            bar_size: self.bar_size.clone(),
            what_to_show: self.what_to_show.clone(),
            use_rth: self.use_rth,
        }
    }
}

/// Root bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// 7497 paper / 7496 live TWS, 4002 / 4001 Gateway
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: i32,

    /// Budget for the broker's acknowledgement after the socket opens
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Requested before every market data subscription session
    #[serde(default = "default_market_data_type")]
    pub market_data_type: MarketDataType,

    #[serde(default)]
    pub historical: HistoricalConfig,

    /// Routing destination when an order names none
    #[serde(default = "default_exchange")]
    pub default_exchange: String,

    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    TWS_PAPER_PORT
}

fn default_client_id() -> i32 {
    1
}

fn default_handshake_timeout_ms() -> u64 {
    30_000
}

fn default_market_data_type() -> MarketDataType {
    MarketDataType::Delayed
}

fn default_exchange() -> String {
    "SMART".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            market_data_type: default_market_data_type(),
            historical: HistoricalConfig::default(),
            default_exchange: default_exchange(),
            currency: default_currency(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config = Self::from_json(&content)?;
        info!("Loaded bridge config from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The configuration shipped with the crate
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(include_str!("../config/bridge.json"))
    }

    /// Apply `QS_TWS_*` environment overrides
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.trim().parse().map_err(|e| {
                ConfigError::Invalid(format!("{}={:?}: {}", ENV_PORT, port, e))
            })?;
        }
        if let Some(client_id) = lookup(ENV_CLIENT_ID) {
            self.client_id = client_id.trim().parse().map_err(|e| {
                ConfigError::Invalid(format!("{}={:?}: {}", ENV_CLIENT_ID, client_id, e))
            })?;
        }
        Ok(self)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_client_id(mut self, client_id: i32) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_market_data_type(mut self, market_data_type: MarketDataType) -> Self {
        self.market_data_type = market_data_type;
        self
    }

    pub fn with_historical(mut self, historical: HistoricalConfig) -> Self {
        self.historical = historical;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Endpoint of the configured broker
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port, self.client_id)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "handshake_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.default_exchange.trim().is_empty() || self.currency.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_exchange and currency are required".to_string(),
            ));
        }
        if matches!(
            self.market_data_type,
            MarketDataType::Frozen | MarketDataType::DelayedFrozen
        ) {
            warn!(
                "Market data type {:?} only delivers the last recorded prices",
                self.market_data_type
            );
        }
        Ok(())
    }
}

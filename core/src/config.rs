//! Typed configuration for the gateway (spec §6 "Configuration"), deserializable from
//! JSON/TOML the way the teacher's `system::config` module shapes `SystemConfig`.
//!
//! Durations are modelled as plain `u64` seconds/millis fields rather than
//! `std::time::Duration` directly, since `serde` has no built-in `Duration` support and
//! this lineage doesn't otherwise reach for a duration-serde shim; each settings struct
//! exposes typed accessors that convert at the point of use.

use gateway_markets::BrokerKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

/// `broker.<kind>.*` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub endpoint: String,
    pub stream_endpoint: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl BrokerConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_reconnect_max_delay_secs() -> u64 {
    30
}

fn default_subscriber_queue_size() -> usize {
    1024
}

/// `streaming.*` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub heartbeat_interval_secs: u64,
    pub reconnect_max_delay_secs: u64,
    pub subscriber_queue_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            reconnect_max_delay_secs: default_reconnect_max_delay_secs(),
            subscriber_queue_size: default_subscriber_queue_size(),
        }
    }
}

impl StreamingConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }
}

fn default_reconciler_interval_secs() -> u64 {
    30
}

fn default_stale_order_threshold_secs() -> u64 {
    60
}

fn default_failures_to_open() -> u32 {
    5
}

fn default_cool_off_secs() -> u64 {
    30
}

/// `engine.*` (spec §6), including the nested `engine.circuit.*` keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub reconciler_interval_secs: u64,
    pub stale_order_threshold_secs: u64,
    pub circuit_failures_to_open: u32,
    pub circuit_cool_off_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reconciler_interval_secs: default_reconciler_interval_secs(),
            stale_order_threshold_secs: default_stale_order_threshold_secs(),
            circuit_failures_to_open: default_failures_to_open(),
            circuit_cool_off_secs: default_cool_off_secs(),
        }
    }
}

impl EngineSettings {
    pub fn reconciler_interval(&self) -> Duration {
        Duration::from_secs(self.reconciler_interval_secs)
    }

    pub fn stale_order_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_order_threshold_secs)
    }

    pub fn circuit_cool_off(&self) -> Duration {
        Duration::from_secs(self.circuit_cool_off_secs)
    }
}

fn default_max_outstanding_orders() -> usize {
    200
}

fn default_price_band_percent() -> rust_decimal::Decimal {
    rust_decimal::Decimal::from(20)
}

/// `risk.*` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    pub max_outstanding_orders_per_user: usize,
    pub price_band_percent: rust_decimal::Decimal,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_outstanding_orders_per_user: default_max_outstanding_orders(),
            price_band_percent: default_price_band_percent(),
        }
    }
}

/// Top-level configuration for a running gateway system: one [`BrokerConfig`] per
/// adapter plus the streaming, engine, and risk settings from spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub brokers: HashMap<BrokerKind, BrokerConfig>,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub risk: RiskSettings,
}

impl GatewayConfig {
    pub fn broker(&self, kind: BrokerKind) -> Option<&BrokerConfig> {
        self.brokers.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_defaults_match_spec_six() {
        let config = StreamingConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.reconnect_max_delay(), Duration::from_secs(30));
        assert_eq!(config.subscriber_queue_size, 1024);
    }

    #[test]
    fn engine_defaults_match_spec_six() {
        let config = EngineSettings::default();
        assert_eq!(config.reconciler_interval(), Duration::from_secs(30));
        assert_eq!(config.stale_order_threshold(), Duration::from_secs(60));
        assert_eq!(config.circuit_failures_to_open, 5);
        assert_eq!(config.circuit_cool_off(), Duration::from_secs(30));
    }

    #[test]
    fn risk_defaults_match_spec_six() {
        let config = RiskSettings::default();
        assert_eq!(config.max_outstanding_orders_per_user, 200);
        assert_eq!(config.price_band_percent, rust_decimal::Decimal::from(20));
    }

    #[test]
    fn gateway_config_deserializes_with_broker_defaults_filled_in() {
        let json = r#"{
            "brokers": {
                "XTS_PRO": {
                    "endpoint": "https://xts.example/pro",
                    "stream_endpoint": "wss://xts.example/pro/stream"
                }
            }
        }"#;
        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        let broker = config.broker(BrokerKind::XtsPro).unwrap();
        assert_eq!(broker.max_retries, 3);
        assert_eq!(config.engine.stale_order_threshold_secs, 60);
    }
}

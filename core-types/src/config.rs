use ::config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

use crate::types::BinnerSpec;

/// Top-level process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub binning: BinningConfig,
    pub replay: ReplayConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinningConfig {
    /// Binner registrations applied before ingestion starts.
    #[serde(default)]
    pub binners: Vec<BinnerSpec>,
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            binners: Vec::new(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

fn default_subscriber_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// JSON-lines recording of `SampleBatch` values fed in file order.
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_collect_interval_s")]
    pub collect_interval_s: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            collect_interval_s: default_collect_interval_s(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_collect_interval_s() -> u64 {
    10
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name("wavecast.toml").required(false))
            .add_source(config::Environment::with_prefix("WAVECAST").separator("__"))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        for spec in &config.binning.binners {
            if spec.source.is_empty() {
                return Err(ConfigError::Message(
                    "binner source name must not be empty".to_string(),
                ));
            }
            if spec.bin_span_s <= 0.0 || spec.window_span_s < spec.bin_span_s {
                return Err(ConfigError::Message(format!(
                    "invalid spans for {}: window {}s, bin {}s",
                    spec.source, spec.window_span_s, spec.bin_span_s
                )));
            }
        }
        Ok(config)
    }
}

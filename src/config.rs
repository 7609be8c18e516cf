//! Application-wide configuration and constants.
//!
//! This module centralizes all configuration values, whether loaded from
//! configuration files, environment variables, or defined as defaults. Health
//! thresholds are deliberately plain configuration values with no semantic
//! weight attached to the shipped defaults.

use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Serde helper for Duration serialization/deserialization as seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helper for Duration serialization/deserialization as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Well-known pipeline step names recorded by the orchestrator.
pub mod steps {
    /// Request preparation and validation step
    pub const PREPARE: &str = "prepare";

    /// The external inference call
    pub const INFERENCE: &str = "inference";

    /// Output post-processing step
    pub const POST_PROCESS: &str = "post_process";
}

// Default value functions for serde defaults
fn default_max_concurrent_jobs() -> usize {
    4
}
fn default_inference_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_sampling_interval() -> Duration {
    Duration::from_millis(5000)
}
fn default_metric_history_size() -> usize {
    1000
}
fn default_session_history_size() -> usize {
    500
}
fn default_ram_threshold_percent() -> f64 {
    85.0
}
fn default_accelerator_threshold_percent() -> f64 {
    80.0
}
fn default_leak_threshold_mb() -> f64 {
    500.0
}
fn default_leak_window() -> usize {
    5
}
fn default_degradation_window() -> usize {
    10
}
fn default_degradation_delta_percent() -> f64 {
    10.0
}
fn default_alert_cooldown() -> Duration {
    Duration::from_secs(300)
}
fn default_auto_recovery_enabled() -> bool {
    true
}
fn default_export_directory() -> PathBuf {
    PathBuf::from("metrics")
}
fn default_server_host() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8070
}

/// Engine configuration loaded from multiple sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server host
    #[serde(default = "default_server_host")]
    pub server_host: String,

    /// HTTP server port
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Maximum number of generation jobs executing concurrently
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Deadline applied to the external inference call
    #[serde(with = "duration_secs", default = "default_inference_timeout")]
    pub inference_timeout: Duration,

    /// Cadence of the background metric sampler
    #[serde(with = "duration_millis", default = "default_sampling_interval")]
    pub sampling_interval: Duration,

    /// Capacity of the metric-sample ring buffer
    #[serde(default = "default_metric_history_size")]
    pub metric_history_size: usize,

    /// Capacity of the completed-session history
    #[serde(default = "default_session_history_size")]
    pub session_history_size: usize,

    /// Host memory percentage above which a hard alert fires
    #[serde(default = "default_ram_threshold_percent")]
    pub ram_threshold_percent: f64,

    /// Accelerator utilization percentage above which a hard alert fires
    #[serde(default = "default_accelerator_threshold_percent")]
    pub accelerator_threshold_percent: f64,

    /// Allocator memory growth (MB over the recent mean) treated as a leak
    #[serde(default = "default_leak_threshold_mb")]
    pub leak_threshold_mb: f64,

    /// Number of recent allocator readings averaged for leak detection
    #[serde(default = "default_leak_window")]
    pub leak_window: usize,

    /// Sliding window size for degradation-trend detection
    #[serde(default = "default_degradation_window")]
    pub degradation_window: usize,

    /// Percentage-point increase between window halves treated as degradation
    #[serde(default = "default_degradation_delta_percent")]
    pub degradation_delta_percent: f64,

    /// Suppression period for repeated alerts of the same kind
    #[serde(with = "duration_secs", default = "default_alert_cooldown")]
    pub alert_cooldown: Duration,

    /// Whether alerts trigger registered recovery actions automatically
    #[serde(default = "default_auto_recovery_enabled")]
    pub auto_recovery_enabled: bool,

    /// Directory for per-session and hardware-metric export artifacts
    #[serde(default = "default_export_directory")]
    pub export_directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: default_server_port(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            inference_timeout: default_inference_timeout(),
            sampling_interval: default_sampling_interval(),
            metric_history_size: default_metric_history_size(),
            session_history_size: default_session_history_size(),
            ram_threshold_percent: default_ram_threshold_percent(),
            accelerator_threshold_percent: default_accelerator_threshold_percent(),
            leak_threshold_mb: default_leak_threshold_mb(),
            leak_window: default_leak_window(),
            degradation_window: default_degradation_window(),
            degradation_delta_percent: default_degradation_delta_percent(),
            alert_cooldown: default_alert_cooldown(),
            auto_recovery_enabled: default_auto_recovery_enabled(),
            export_directory: default_export_directory(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest priority)
    /// 2. config.yaml (if exists)
    /// 3. config.toml (if exists)
    /// 4. Built-in defaults (lowest priority)
    pub fn load() -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Self::default_figment())
            .merge(Toml::file("config.toml"))
            .merge(Yaml::file("config.yaml"))
            .merge(Env::prefixed("AISTUDIO_"))
            .extract()
            .map_err(|e| {
                EngineError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Generate default configuration values
    fn default_figment() -> Figment {
        use figment::providers::Serialized;

        Figment::from(Serialized::defaults(Config::default()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(EngineError::Configuration(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }

        if self.inference_timeout.as_secs() == 0 {
            return Err(EngineError::Configuration(
                "inference_timeout must be at least 1 second".to_string(),
            ));
        }

        if self.sampling_interval.is_zero() {
            return Err(EngineError::Configuration(
                "sampling_interval must be non-zero".to_string(),
            ));
        }

        if self.metric_history_size == 0 || self.session_history_size == 0 {
            return Err(EngineError::Configuration(
                "history sizes must be at least 1".to_string(),
            ));
        }

        for (name, value) in [
            ("ram_threshold_percent", self.ram_threshold_percent),
            (
                "accelerator_threshold_percent",
                self.accelerator_threshold_percent,
            ),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(EngineError::Configuration(format!(
                    "{} must be between 0 and 100",
                    name
                )));
            }
        }

        if self.leak_window == 0 {
            return Err(EngineError::Configuration(
                "leak_window must be at least 1".to_string(),
            ));
        }

        // Half-window comparison needs at least one sample in each half.
        if self.degradation_window < 2 {
            return Err(EngineError::Configuration(
                "degradation_window must be at least 2".to_string(),
            ));
        }

        if self.server_host.is_empty() {
            return Err(EngineError::Configuration(
                "server_host cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Export configuration to TOML format
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::Configuration(format!("Failed to serialize to TOML: {}", e)))
    }

    /// Export configuration to YAML format
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| EngineError::Configuration(format!("Failed to serialize to YAML: {}", e)))
    }
}

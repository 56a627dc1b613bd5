use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::scope::TraceSettings;
use crate::types::{Channel, ChannelSetup};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub psu: PsuConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
}

impl AppConfig {
    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        self.scope.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    /// Start a new log file when the UTC date changes
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log file path; rotated copies get a `.YYYY-MM-DD` suffix
    pub log_file: String,
    #[serde(default)]
    pub rotation: Rotation,
    pub level: String,
    /// Mirror log lines to stdout
    #[serde(default = "default_console")]
    pub console: bool,
}

fn default_console() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: "lab_bench.log".to_string(),
            rotation: Rotation::Daily,
            level: "debug".to_string(),
            console: default_console(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_file.trim().is_empty() {
            return Err(ConfigError::Message(
                "logging.log_file must not be empty".to_string(),
            ));
        }
        crate::logging::parse_level(&self.level)
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(())
    }
}

/// Values reported by the placeholder power supply
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PsuConfig {
    pub placeholder_voltage_v: f64,
    pub placeholder_current_a: f64,
}

impl Default for PsuConfig {
    fn default() -> Self {
        Self {
            placeholder_voltage_v: 1.0,
            placeholder_current_a: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScopeConfig {
    pub default_serial_number: String,
    pub led_flashes: u32,
    pub num_captures: u32,
    pub sample_rate_hz: f64,
    pub recording_duration_s: f64,
    pub trigger_channel: Channel,
    pub trigger_threshold_v: f64,
    #[serde(default = "default_trace_channel_setup")]
    pub channel_setup: ChannelSetup,
}

fn default_trace_channel_setup() -> ChannelSetup {
    ChannelSetup {
        voltage_range_v: 10.0,
        ..ChannelSetup::default()
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            default_serial_number: "JP507/0034".to_string(),
            led_flashes: 5,
            num_captures: 1,
            sample_rate_hz: 1000.0,
            recording_duration_s: 1.0,
            trigger_channel: Channel::A,
            trigger_threshold_v: 0.2,
            channel_setup: default_trace_channel_setup(),
        }
    }
}

impl ScopeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz > 0.0) {
            return Err(ConfigError::Message(format!(
                "scope.sample_rate_hz must be positive, got: {}",
                self.sample_rate_hz
            )));
        }
        if !(self.recording_duration_s > 0.0) {
            return Err(ConfigError::Message(format!(
                "scope.recording_duration_s must be positive, got: {}",
                self.recording_duration_s
            )));
        }
        if self.num_captures == 0 {
            return Err(ConfigError::Message(
                "scope.num_captures must be greater than zero".to_string(),
            ));
        }
        if self.channel_setup.voltage_range_v <= 0.0 {
            return Err(ConfigError::Message(format!(
                "scope.channel_setup.voltage_range_v must be positive, got: {}",
                self.channel_setup.voltage_range_v
            )));
        }
        let settings = TraceSettings::try_from(self)
            .map_err(|e| ConfigError::Message(format!("scope: {}", e)))?;
        settings
            .sample_interval()
            .and_then(|_| settings.capture_timeout())
            .map_err(|e| ConfigError::Message(format!("scope: {}", e)))?;
        Ok(())
    }
}

/// Load configuration from defaults, an optional TOML file and
/// `LAB_BENCH__*` environment overrides, in that order
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path));
    } else if Path::new("lab_bench.toml").exists() {
        builder = builder.add_source(File::with_name("lab_bench.toml"));
    }

    builder = builder.add_source(
        Environment::with_prefix("LAB_BENCH")
            .separator("__")
            .try_parsing(true),
    );

    let app_config = builder.build()?.try_deserialize::<AppConfig>()?;
    app_config.validate()?;

    Ok(app_config)
}

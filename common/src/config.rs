use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub indicator: IndicatorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Mount point of the removable card; also the HTTP document root.
    pub root: String,
    /// Size of the Store Writer's arena. Every write is at most this long.
    #[serde(default = "default_write_chunk_bytes")]
    pub write_chunk_bytes: usize,
    /// Size of each chunk streamed back to HTTP clients.
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamingConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default = "default_digits")]
    pub digits: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    /// "pattern" (built-in test pattern driver) or "http" (snapshot URL).
    #[serde(default = "default_sensor_mode")]
    pub mode: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_frame_buffers")]
    pub frame_buffers: usize,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Snapshot endpoint, required in "http" mode.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Minimum spacing between capture iterations. 0 = back to back.
    #[serde(default)]
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_flash_ms")]
    pub flash_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            suffix: default_suffix(),
            digits: default_digits(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            mode: default_sensor_mode(),
            width: default_width(),
            height: default_height(),
            frame_buffers: default_frame_buffers(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            url: None,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { min_interval_ms: 0 }
    }
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            flash_ms: default_flash_ms(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SensorConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the writer, the sensor or the
    /// resource handler unusable at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.write_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("storage.write_chunk_bytes must be > 0".into()));
        }
        if self.storage.read_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("storage.read_chunk_bytes must be > 0".into()));
        }
        if self.naming.prefix.is_empty() && self.naming.suffix.is_empty() {
            return Err(ConfigError::Invalid(
                "naming.prefix and naming.suffix cannot both be empty".into(),
            ));
        }
        if self.naming.prefix.contains('/') || self.naming.suffix.contains('/') {
            return Err(ConfigError::Invalid("naming prefix/suffix cannot contain '/'".into()));
        }
        if self.sensor.width == 0 || self.sensor.height == 0 {
            return Err(ConfigError::Invalid("sensor.width and sensor.height must be > 0".into()));
        }
        if self.sensor.frame_buffers == 0 {
            return Err(ConfigError::Invalid("sensor.frame_buffers must be > 0".into()));
        }
        match self.sensor.mode.as_str() {
            "pattern" => {}
            "http" => {
                if self.sensor.url.as_deref().map_or(true, str::is_empty) {
                    return Err(ConfigError::Invalid("sensor.url is required in http mode".into()));
                }
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown sensor.mode '{other}', expected 'pattern' or 'http'"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_write_chunk_bytes() -> usize {
    65536
}
fn default_read_chunk_bytes() -> usize {
    32768
}
fn default_prefix() -> String {
    "img_".into()
}
fn default_suffix() -> String {
    ".pgm".into()
}
fn default_digits() -> usize {
    4
}
fn default_sensor_mode() -> String {
    "pattern".into()
}
fn default_width() -> u32 {
    1600
}
fn default_height() -> u32 {
    1200
}
fn default_frame_buffers() -> usize {
    1
}
fn default_acquire_timeout_ms() -> u64 {
    5000
}
fn default_flash_ms() -> u64 {
    200
}
fn default_bind() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    80
}
fn default_log_level() -> String {
    "info".into()
}

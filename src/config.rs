use crate::engine::{MalformedMode, WriteOptions};
use crate::quality::LATENCY_THRESHOLD_MS;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from flywheel.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FlywheelConfig {
    pub engine: EngineConfig,
    pub metrics: MetricsConfig,
    pub quality: QualityConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub app_name: String,
    pub on_malformed: MalformedMode,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub group_by: String,
    pub show_rows: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub max_latency_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub compress: bool,
    pub compression_level: i32,
}

// --- Default implementations ---

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "TraceFlywheel".to_string(),
            on_malformed: MalformedMode::FailFast,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            group_by: "provider".to_string(),
            show_rows: 20,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: LATENCY_THRESHOLD_MS,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("refined_dataset"),
            compress: false,
            compression_level: 3,
        }
    }
}

impl ExportConfig {
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            compress: self.compress,
            compression_level: self.compression_level,
        }
    }
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<FlywheelConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(FlywheelConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Errors from loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;
use crate::metadata::DEFAULT_CLOSE_LOOKAHEAD;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Which tools' results carry which nested metadata tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_grounding_tools")]
    pub grounding_tools: Vec<String>,
    #[serde(default = "default_data_tools")]
    pub query_attempt_tools: Vec<String>,
    #[serde(default = "default_data_tools")]
    pub widget_tools: Vec<String>,
    /// Bytes of whitespace tolerated between a payload and its close marker.
    #[serde(default = "default_close_marker_lookahead")]
    pub close_marker_lookahead: usize,
}

fn default_grounding_tools() -> Vec<String> {
    vec!["web_search".to_string()]
}
fn default_data_tools() -> Vec<String> {
    vec!["data_analyst_agent".to_string()]
}
fn default_close_marker_lookahead() -> usize {
    DEFAULT_CLOSE_LOOKAHEAD
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            grounding_tools: default_grounding_tools(),
            query_attempt_tools: default_data_tools(),
            widget_tools: default_data_tools(),
            close_marker_lookahead: default_close_marker_lookahead(),
        }
    }
}

impl MetadataConfig {
    #[must_use]
    pub fn routes_grounding(&self, tool: &str) -> bool {
        self.grounding_tools.iter().any(|name| name == tool)
    }

    #[must_use]
    pub fn routes_query_attempts(&self, tool: &str) -> bool {
        self.query_attempt_tools.iter().any(|name| name == tool)
    }

    #[must_use]
    pub fn routes_widgets(&self, tool: &str) -> bool {
        self.widget_tools.iter().any(|name| name == tool)
    }

    /// Whether any nested decoder runs on this tool's results.
    #[must_use]
    pub fn routes_any(&self, tool: &str) -> bool {
        self.routes_grounding(tool) || self.routes_query_attempts(tool) || self.routes_widgets(tool)
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails, or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

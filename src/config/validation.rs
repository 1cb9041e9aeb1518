use rustc_hash::FxHashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_log_level(config)?;
    validate_tool_list("metadata.grounding_tools", &config.metadata.grounding_tools)?;
    validate_tool_list(
        "metadata.query_attempt_tools",
        &config.metadata.query_attempt_tools,
    )?;
    validate_tool_list("metadata.widget_tools", &config.metadata.widget_tools)?;
    validate_lookahead(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_tool_list(field: &str, tools: &[String]) -> Result<(), ConfigError> {
    let mut seen = FxHashSet::default();
    for tool in tools {
        if tool.trim().is_empty() {
            return Err(validation_err(format!("{field} contains an empty tool name")));
        }
        if !seen.insert(tool.as_str()) {
            return Err(validation_err(format!(
                "{field} lists '{tool}' more than once"
            )));
        }
    }
    Ok(())
}

fn validate_lookahead(config: &AppConfig) -> Result<(), ConfigError> {
    if config.metadata.close_marker_lookahead == 0 {
        return Err(validation_err(
            "metadata.close_marker_lookahead must be greater than 0",
        ));
    }
    Ok(())
}

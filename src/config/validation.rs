use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_models(config)?;
    validate_log_level(config)?;
    validate_safety_threshold(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.port == 0 {
        return Err(validation_err("server.port must be greater than 0"));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if server.max_body_bytes == 0 {
        return Err(validation_err("server.max_body_bytes must be greater than 0"));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if server.runtime_worker_threads == Some(0) {
        return Err(validation_err(
            "server.runtime_worker_threads must be greater than 0 when set",
        ));
    }
    if server.runtime_max_blocking_threads == Some(0) {
        return Err(validation_err(
            "server.runtime_max_blocking_threads must be greater than 0 when set",
        ));
    }
    validate_http_url("server.proxy", server.proxy.as_deref())?;
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    validate_http_url("upstream.base_url", Some(&upstream.base_url))?;
    if upstream.api_version.trim().is_empty() || upstream.api_version.contains('/') {
        return Err(validation_err(
            "upstream.api_version must be a single non-empty path segment",
        ));
    }
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    let models = &config.models;
    for (field, value) in [
        ("models.default_chat", &models.default_chat),
        ("models.default_embeddings", &models.default_embeddings),
        ("models.tts", &models.tts),
    ] {
        if value.trim().is_empty() {
            return Err(validation_err(format!("{field} cannot be empty")));
        }
    }
    Ok(())
}

fn validate_http_url(field_name: &str, value: Option<&str>) -> Result<(), ConfigError> {
    let Some(value) = value.map(str::trim) else {
        return Ok(());
    };
    if value.is_empty() {
        return Err(validation_err(format!("{field_name} cannot be empty when set")));
    }
    let parsed = url::Url::parse(value)
        .map_err(|err| validation_err(format!("{field_name} is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "{field_name} must use http:// or https://"
        )));
    }
    Ok(())
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

const SAFETY_THRESHOLDS: &[&str] = &[
    "BLOCK_NONE",
    "BLOCK_ONLY_HIGH",
    "BLOCK_MEDIUM_AND_ABOVE",
    "BLOCK_LOW_AND_ABOVE",
    "OFF",
];

fn validate_safety_threshold(config: &AppConfig) -> Result<(), ConfigError> {
    let threshold = config.features.safety_threshold.as_str();
    if !SAFETY_THRESHOLDS.contains(&threshold) {
        return Err(validation_err(format!(
            "features.safety_threshold must be one of: {}",
            SAFETY_THRESHOLDS.join(", ")
        )));
    }
    Ok(())
}

//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Upper bound for the Chef request timeout, in seconds.
pub const MAX_CHEF_TIMEOUT_SECS: u64 = 600;

/// Validate a merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_server(config)?;
    validate_chef(config)?;
    validate_files(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_server(config: &Config) -> ConfigResult<()> {
    if config.server.port == 0 {
        return Err(invalid("server.port", "port must be between 1 and 65535"));
    }
    if config.server.bind.trim().is_empty() {
        return Err(invalid("server.bind", "bind address must not be empty"));
    }
    Ok(())
}

fn validate_chef(config: &Config) -> ConfigResult<()> {
    let chef = &config.chef;

    if chef.timeout_secs == 0 || chef.timeout_secs > MAX_CHEF_TIMEOUT_SECS {
        return Err(invalid(
            "chef.timeout_secs",
            format!("timeout must be between 1 and {MAX_CHEF_TIMEOUT_SECS} seconds"),
        ));
    }

    let url = url::Url::parse(&chef.endpoint)
        .map_err(|e| invalid("chef.endpoint", format!("not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(
            "chef.endpoint",
            format!("unsupported scheme '{}'; expected http or https", url.scheme()),
        ));
    }

    if chef.client_name.trim().is_empty() {
        return Err(invalid("chef.client_name", "client name must not be empty"));
    }
    if chef
        .admin_client_name
        .as_deref()
        .is_some_and(|n| n.trim().is_empty())
    {
        return Err(invalid(
            "chef.admin_client_name",
            "admin client name must not be empty when set",
        ));
    }
    for (field, key) in [
        ("chef.client_key", &chef.client_key),
        ("chef.admin_client_key", &chef.admin_client_key),
    ] {
        if key.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(invalid(field, "key path must not be empty when set"));
        }
    }
    Ok(())
}

fn validate_files(config: &Config) -> ConfigResult<()> {
    let files = &config.files;
    for (field, path) in [
        ("files.auth_json", &files.auth_json),
        ("files.state_json", &files.state_json),
        ("files.projects_json", &files.projects_json),
    ] {
        if path.as_os_str().is_empty() {
            return Err(invalid(field, "path must not be empty"));
        }
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    if config.logging.level.trim().is_empty() {
        return Err(invalid("logging.level", "log level must not be empty"));
    }
    Ok(())
}

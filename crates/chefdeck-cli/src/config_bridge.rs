//! Bridge from `chefdeck_config::Config` to domain types.
//!
//! The config crate depends on no other chefdeck crate, so every enum it
//! mirrors is converted here.

use std::time::Duration;

use anyhow::{Context, Result};

use chefdeck_auth::EmptyRunListPolicy;
use chefdeck_chef::HttpChefConfig;
use chefdeck_config::{Config, ConfigLayer, EmptyRunList, FieldSources, LogFormat};
use chefdeck_gateway::GatewaySettings;
use chefdeck_telemetry::{LogConfig, LogTarget};

/// Map the configured empty run-list policy.
pub(crate) fn empty_run_list_policy(value: EmptyRunList) -> EmptyRunListPolicy {
    match value {
        EmptyRunList::Allow => EmptyRunListPolicy::Allow,
        EmptyRunList::Deny => EmptyRunListPolicy::Deny,
    }
}

fn log_format(value: LogFormat) -> chefdeck_telemetry::LogFormat {
    match value {
        LogFormat::Pretty => chefdeck_telemetry::LogFormat::Pretty,
        LogFormat::Compact => chefdeck_telemetry::LogFormat::Compact,
        LogFormat::Json => chefdeck_telemetry::LogFormat::Json,
    }
}

/// Build the logging configuration.
///
/// A development deployment logs at `debug` unless a level was configured
/// explicitly.
pub(crate) fn log_config(config: &Config, sources: &FieldSources) -> LogConfig {
    let level_is_default = sources
        .get("logging.level")
        .is_none_or(|layer| *layer == ConfigLayer::Defaults);
    let level = if config.environment.is_development() && level_is_default {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let mut log = LogConfig::new(level).with_format(log_format(config.logging.format));
    if let Some(dir) = &config.logging.directory {
        log = log.with_target(LogTarget::File(dir.clone()));
    }
    for directive in &config.logging.directives {
        log = log.with_directive(directive.clone());
    }
    log
}

/// Build the Chef client configuration.
///
/// # Errors
///
/// Returns an error if the endpoint is not a valid URL.
pub(crate) fn chef_config(config: &Config) -> Result<HttpChefConfig> {
    let chef = &config.chef;
    let endpoint = url::Url::parse(&chef.endpoint).context("invalid chef.endpoint")?;
    let mut http = HttpChefConfig::new(endpoint, chef.client_name.clone())
        .with_timeout(Duration::from_secs(chef.timeout_secs));
    http.chef_version.clone_from(&chef.chef_version);
    if let Some(admin) = &chef.admin_client_name {
        http = http.with_admin_client(admin.clone());
    }
    http.client_key.clone_from(&chef.client_key);
    http.admin_client_key.clone_from(&chef.admin_client_key);
    Ok(http)
}

/// Build the HTTP surface settings. `dump` is served by `GET /config`.
pub(crate) fn gateway_settings(config: &Config, dump: Option<serde_json::Value>) -> GatewaySettings {
    let development = config.environment.is_development();
    GatewaySettings {
        cache_timeout_secs: config.cache.timeout_secs,
        require_key: config.auth.require_key,
        development,
        config_dump: if development { dump } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chefdeck_config::Environment;

    #[test]
    fn test_empty_run_list_policy() {
        assert_eq!(empty_run_list_policy(EmptyRunList::Allow), EmptyRunListPolicy::Allow);
        assert_eq!(empty_run_list_policy(EmptyRunList::Deny), EmptyRunListPolicy::Deny);
    }

    #[test]
    fn test_log_config_development_raises_default_level() {
        let mut config = Config::default();
        config.environment = Environment::Development;
        let mut sources = FieldSources::new();
        sources.insert("logging.level".into(), ConfigLayer::Defaults);
        assert_eq!(log_config(&config, &sources).level, "debug");

        sources.insert("logging.level".into(), ConfigLayer::File);
        assert_eq!(log_config(&config, &sources).level, "info");
    }

    #[test]
    fn test_log_config_directory_and_directives() {
        let mut config = Config::default();
        config.logging.directory = Some("/var/log/chefdeck".into());
        config.logging.directives = vec!["chefdeck_gateway=trace".into()];
        config.logging.format = LogFormat::Json;

        let log = log_config(&config, &FieldSources::new());

        assert_eq!(log.target, LogTarget::File("/var/log/chefdeck".into()));
        assert_eq!(log.format, chefdeck_telemetry::LogFormat::Json);
        assert_eq!(log.directives, vec!["chefdeck_gateway=trace"]);
        assert!(!log.ansi);
    }

    #[test]
    fn test_chef_config() {
        let mut config = Config::default();
        config.chef.admin_client_name = Some("pivotal".into());
        config.chef.timeout_secs = 12;
        config.chef.client_key = Some("keys/chefdeck.pem".into());

        let http = chef_config(&config).unwrap();

        assert_eq!(http.client_name, "chefdeck");
        assert_eq!(http.admin_client_name.as_deref(), Some("pivotal"));
        assert_eq!(http.timeout, Duration::from_secs(12));
        assert_eq!(http.client_key, Some(std::path::PathBuf::from("keys/chefdeck.pem")));
        assert!(http.admin_client_key.is_none());
    }

    #[test]
    fn test_gateway_settings_dump_only_in_development() {
        let dump = serde_json::json!({ "port": 9125 });
        let config = Config::default();
        assert!(gateway_settings(&config, Some(dump.clone())).config_dump.is_none());

        let mut config = Config::default();
        config.environment = Environment::Development;
        config.auth.require_key = true;
        let settings = gateway_settings(&config, Some(dump));
        assert!(settings.development);
        assert!(settings.require_key);
        assert!(settings.config_dump.is_some());
    }
}

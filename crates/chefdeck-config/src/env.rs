//! `CHEFDECK_*` environment variable fallbacks.
//!
//! Environment variables are a fallback, not an override: they only fill
//! fields that no configuration file set. Command-line flags still win over
//! them.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, set_path};

/// Prefix shared by every recognized variable.
pub const ENV_PREFIX: &str = "CHEFDECK_";

/// Variable naming the chefdeck home directory, searched for `config.toml`.
pub const HOME_VAR: &str = "CHEFDECK_HOME";

#[derive(Clone, Copy)]
enum Kind {
    Str,
    Int,
    Bool,
    List,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: Kind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "CHEFDECK_BIND",
        field_path: "server.bind",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_PORT",
        field_path: "server.port",
        kind: Kind::Int,
    },
    EnvMapping {
        var_name: "CHEFDECK_ENV",
        field_path: "environment",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_CACHE_TIMEOUT",
        field_path: "cache.timeout_secs",
        kind: Kind::Int,
    },
    EnvMapping {
        var_name: "CHEFDECK_AUTH_JSON",
        field_path: "files.auth_json",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_STATE_JSON",
        field_path: "files.state_json",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_PROJECTS_JSON",
        field_path: "files.projects_json",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_EMPTY_RUN_LIST",
        field_path: "auth.empty_run_list",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_REQUIRE_KEY",
        field_path: "auth.require_key",
        kind: Kind::Bool,
    },
    EnvMapping {
        var_name: "CHEFDECK_CHEF_ENDPOINT",
        field_path: "chef.endpoint",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_CHEF_CLIENT",
        field_path: "chef.client_name",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_CHEF_ADMIN_CLIENT",
        field_path: "chef.admin_client_name",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_CHEF_CLIENT_KEY",
        field_path: "chef.client_key",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_CHEF_ADMIN_CLIENT_KEY",
        field_path: "chef.admin_client_key",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_CHEF_TIMEOUT",
        field_path: "chef.timeout_secs",
        kind: Kind::Int,
    },
    EnvMapping {
        var_name: "CHEFDECK_LOG_LEVEL",
        field_path: "logging.level",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_LOG_FORMAT",
        field_path: "logging.format",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_LOG_DIR",
        field_path: "logging.directory",
        kind: Kind::Str,
    },
    EnvMapping {
        var_name: "CHEFDECK_LOG_DIRECTIVES",
        field_path: "logging.directives",
        kind: Kind::List,
    },
];

/// Snapshot the `CHEFDECK_*` variables of the current process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .collect()
}

/// Apply environment fallbacks to every field not set by a file.
///
/// Returns the number of variables applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a numeric or boolean variable does
/// not parse.
pub fn apply_env_fallbacks<S: std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults)
        {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        let value = coerce(mapping, raw)?;
        set_path(merged, mapping.field_path, value);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    Ok(count)
}

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    let raw = raw.trim();
    let err = |message: String| ConfigError::EnvError {
        var_name: mapping.var_name.to_owned(),
        message,
    };
    match mapping.kind {
        Kind::Str => Ok(toml::Value::String(raw.to_owned())),
        Kind::Int => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|e| err(format!("expected an integer: {e}"))),
        Kind::Bool => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            other => Err(err(format!("expected a boolean, got '{other}'"))),
        },
        Kind::List => Ok(toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_owned()))
                .collect(),
        )),
    }
}

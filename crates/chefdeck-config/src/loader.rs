//! Config file discovery and layered loading.
//!
//! `Config::load()`:
//! 1. Parse `defaults.toml` as the base
//! 2. Merge the config file: `--config`, else `$CHEFDECK_HOME/config.toml`,
//!    else `~/.chefdeck/config.toml`
//! 3. Apply `CHEFDECK_*` fallbacks for fields no file set
//! 4. Apply command-line overrides
//! 5. Deserialize, validate and return a [`ResolvedConfig`]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::env::{HOME_VAR, apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge, record_leaves, set_path};
use crate::types::Config;
use crate::validate;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Inputs to [`Config::load`](crate::Config::load).
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file. Must exist when set.
    pub config_file: Option<PathBuf>,
    /// Home directory for `~/.chefdeck/config.toml` discovery. Looked up
    /// from the OS when unset.
    pub home_dir: Option<PathBuf>,
    /// Environment snapshot. Read from the process when unset.
    pub env: Option<HashMap<String, String>>,
    /// Dotted-path overrides from the command line.
    pub overrides: Vec<(String, toml::Value)>,
}

impl LoadOptions {
    /// Options with no explicit file and no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load this file instead of discovering one.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Use this home directory for discovery.
    #[must_use]
    pub fn with_home_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(path.into());
        self
    }

    /// Use this environment instead of the process environment.
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Override a field, e.g. `("server.port", 8080)`.
    #[must_use]
    pub fn with_override(mut self, path: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.overrides.push((path.into(), value.into()));
        self
    }
}

/// A loaded configuration with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Which layer set each field.
    pub field_sources: FieldSources,
    /// Config files that were merged, in order.
    pub loaded_files: Vec<String>,
}

/// Load the configuration with layered precedence.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a config file is unreadable or malformed, an
/// environment variable does not parse, or the result fails validation.
pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
    let env_vars = options.env.clone().unwrap_or_else(collect_env_vars);

    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut field_sources = FieldSources::new();
    record_leaves(&merged, "", ConfigLayer::Defaults, &mut field_sources);
    let mut loaded_files = Vec::new();

    if let Some((overlay, path)) = find_config_file(options, &env_vars)? {
        deep_merge(&mut merged, &overlay, "", ConfigLayer::File, &mut field_sources);
        info!(path = %path.display(), "loaded config file");
        loaded_files.push(path.display().to_string());
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, &env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    for (path, value) in &options.overrides {
        set_path(&mut merged, path, value.clone());
        field_sources.insert(path.clone(), ConfigLayer::Cli);
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a single file (no layering beyond defaults).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let options = LoadOptions::new()
        .with_config_file(path)
        .with_env(HashMap::new());
    load(&options).map(|resolved| resolved.config)
}

fn find_config_file(
    options: &LoadOptions,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<Option<(toml::Value, PathBuf)>> {
    if let Some(path) = &options.config_file {
        let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
        })?;
        return Ok(Some((value, path.clone())));
    }

    if let Some(home) = env_vars.get(HOME_VAR).filter(|h| !h.trim().is_empty()) {
        let path = PathBuf::from(home).join("config.toml");
        if let Some(value) = try_load_file(&path)? {
            return Ok(Some((value, path)));
        }
    }

    let home_dir = options.home_dir.clone().or_else(|| {
        directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
    });
    let Some(home_dir) = home_dir else {
        debug!("no home directory, skipping user config discovery");
        return Ok(None);
    };
    let path = home_dir.join(".chefdeck").join("config.toml");
    Ok(try_load_file(&path)?.map(|value| (value, path)))
}

/// Read and parse a config file, returning `None` if it does not exist.
///
/// Files ending in `.json` are parsed as JSON; everything else as TOML.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let value = if is_json {
        serde_json::from_str::<toml::Value>(&content).map_err(|e| ConfigError::JsonError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
    } else {
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?
    };

    Ok(Some(value))
}

//! Layered merge of raw TOML trees.
//!
//! Merging happens on [`toml::Value`] rather than deserialized structs so a
//! key missing from an overlay never resets the value below it.

use std::collections::BTreeMap;

/// Which configuration layer a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLayer {
    /// Compiled-in `defaults.toml`.
    Defaults,
    /// A configuration file.
    File,
    /// `CHEFDECK_*` environment variable fallback.
    Environment,
    /// Command-line flag.
    Cli,
}

impl std::fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::File => write!(f, "config file"),
            Self::Environment => write!(f, "environment variable"),
            Self::Cli => write!(f, "command line"),
        }
    }
}

/// Dotted field path to the layer that last set it.
pub type FieldSources = BTreeMap<String, ConfigLayer>;

/// Recursively merge `overlay` into `base`, recording the layer of every
/// leaf the overlay sets.
///
/// Tables merge per key. Scalars and arrays replace.
pub fn deep_merge(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join(prefix, key);
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val, &path, layer, sources);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_leaves(overlay_val, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            record_leaves(overlay, prefix, layer, sources);
        },
    }
}

/// Record every leaf under `val` as coming from `layer`.
pub fn record_leaves(val: &toml::Value, prefix: &str, layer: ConfigLayer, sources: &mut FieldSources) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer);
    }
}

/// Set the value at a dotted path, creating intermediate tables.
///
/// Does nothing if an intermediate segment exists and is not a table.
pub fn set_path(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_tables_merge_scalars_replace() {
        let mut base = parse(
            r#"
            [server]
            bind = "localhost"
            port = 9125
            [logging]
            directives = ["a=debug"]
            "#,
        );
        let overlay = parse(
            r#"
            [server]
            port = 8080
            [logging]
            directives = ["b=trace"]
            "#,
        );

        let mut sources = FieldSources::new();
        deep_merge(&mut base, &overlay, "", ConfigLayer::File, &mut sources);

        assert_eq!(base["server"]["bind"].as_str(), Some("localhost"));
        assert_eq!(base["server"]["port"].as_integer(), Some(8080));
        assert_eq!(base["logging"]["directives"].as_array().unwrap().len(), 1);
        assert_eq!(sources.get("server.port"), Some(&ConfigLayer::File));
        assert_eq!(sources.get("server.bind"), None);
    }

    #[test]
    fn test_new_tables_recorded() {
        let mut base = parse("environment = \"production\"");
        let overlay = parse("[chef]\nendpoint = \"http://x\"\n");
        let mut sources = FieldSources::new();
        deep_merge(&mut base, &overlay, "", ConfigLayer::File, &mut sources);

        assert_eq!(base["chef"]["endpoint"].as_str(), Some("http://x"));
        assert_eq!(sources.get("chef.endpoint"), Some(&ConfigLayer::File));
    }

    #[test]
    fn test_record_leaves() {
        let val = parse("[server]\nport = 1\n[cache]\ntimeout_secs = 2\n");
        let mut sources = FieldSources::new();
        record_leaves(&val, "", ConfigLayer::Defaults, &mut sources);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources.get("cache.timeout_secs"), Some(&ConfigLayer::Defaults));
    }

    #[test]
    fn test_set_path_creates_tables() {
        let mut root = toml::Value::Table(toml::map::Map::new());
        set_path(&mut root, "server.port", toml::Value::Integer(9000));
        set_path(&mut root, "environment", toml::Value::String("test".into()));
        assert_eq!(root["server"]["port"].as_integer(), Some(9000));
        assert_eq!(root["environment"].as_str(), Some("test"));
    }

    #[test]
    fn test_set_path_through_scalar_is_ignored() {
        let mut root = parse("server = 1");
        set_path(&mut root, "server.port", toml::Value::Integer(9000));
        assert_eq!(root["server"].as_integer(), Some(1));
    }
}

//! Chef client trait.
//!
//! Defines the interface the gateway uses to reach the Chef server.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ChefResult;

/// Attributes returned by node search, keyed by result field, each with the
/// attribute path it is read from.
pub const SEARCH_FILTER: &[(&str, &[&str])] = &[
    ("name", &["name"]),
    ("kernel_machine", &["kernel", "machine"]),
    ("kernel_os", &["kernel", "os"]),
    ("fqdn", &["fqdn"]),
    ("run_list", &["run_list"]),
    ("roles", &["roles"]),
    ("recipes", &["recipes"]),
    ("chef_environment", &["chef_environment"]),
    ("platform", &["platform"]),
    ("platform_version", &["platform_version"]),
    ("tags", &["tags"]),
    ("hostname", &["hostname"]),
];

/// Query that matches every node.
pub const MATCH_ALL: &str = "*:*";

/// Chef server operations used by chefdeck.
///
/// Implementors must be cheap to share behind an `Arc`.
#[async_trait]
pub trait ChefClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Names of all nodes.
    async fn list_nodes(&self) -> ChefResult<Vec<String>>;

    /// Full node object, or `None` if the node does not exist.
    async fn fetch_node(&self, name: &str) -> ChefResult<Option<Value>>;

    /// Whether the node exists.
    async fn node_exists(&self, name: &str) -> ChefResult<bool> {
        Ok(self.fetch_node(name).await?.is_some())
    }

    /// The node's run-list, empty if the node does not exist.
    async fn fetch_run_list(&self, name: &str) -> ChefResult<Vec<String>> {
        Ok(self
            .fetch_node(name)
            .await?
            .map(|node| run_list_of(&node))
            .unwrap_or_default())
    }

    /// Delete the node and its API client.
    async fn delete_node(&self, name: &str) -> ChefResult<()>;

    /// Partial search over nodes, returning one [`SEARCH_FILTER`] projection
    /// per match.
    async fn search_nodes(&self, query: &str) -> ChefResult<Vec<Value>>;
}

/// Extract the run-list strings of a node object.
#[must_use]
pub fn run_list_of(node: &Value) -> Vec<String> {
    node.get("run_list")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Project a node object onto [`SEARCH_FILTER`]. Missing paths become
/// `null`.
#[must_use]
pub fn project(node: &Value) -> Value {
    let mut out = Map::new();
    for (field, path) in SEARCH_FILTER {
        let value = path
            .iter()
            .try_fold(node, |cur, key| cur.get(*key))
            .cloned()
            .unwrap_or(Value::Null);
        out.insert((*field).to_owned(), value);
    }
    Value::Object(out)
}

/// Sort node names case-insensitively.
pub fn sort_names(names: &mut [String]) {
    names.sort_by_cached_key(|n| n.to_ascii_lowercase());
}

//! In-memory Chef server for tests and offline runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::client::{ChefClient, MATCH_ALL, project, sort_names};
use crate::error::{ChefError, ChefResult};

/// A [`ChefClient`] holding nodes in a map.
///
/// Supports failure injection (every call fails with
/// [`ChefError::Unavailable`]) and an artificial per-call delay.
#[derive(Debug, Default)]
pub struct MemoryChefClient {
    nodes: Mutex<BTreeMap<String, Value>>,
    deleted: Mutex<Vec<String>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl MemoryChefClient {
    /// An empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with the given run-list.
    #[must_use]
    pub fn with_node(self, name: &str, run_list: &[&str]) -> Self {
        self.insert_node(json!({ "name": name, "run_list": run_list }));
        self
    }

    /// Add a node from a full attribute object. The object must carry a
    /// string `name`.
    #[must_use]
    pub fn with_node_attributes(self, node: Value) -> Self {
        self.insert_node(node);
        self
    }

    /// Insert or replace a node. Objects without a string `name` are ignored.
    pub fn insert_node(&self, node: Value) {
        let Some(name) = node.get("name").and_then(Value::as_str).map(str::to_owned) else {
            tracing::warn!("ignoring node without a name");
            return;
        };
        self.lock_nodes().insert(name, node);
    }

    /// Make every subsequent call fail, or recover.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent call.
    pub fn set_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Whether the node is currently present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lock_nodes().contains_key(name)
    }

    /// Names deleted so far, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_nodes(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, operation: &str) -> ChefResult<()> {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChefError::Unavailable(format!("{operation}: injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChefClient for MemoryChefClient {
    fn name(&self) -> &str {
        "chef-memory"
    }

    async fn list_nodes(&self) -> ChefResult<Vec<String>> {
        self.enter("list nodes").await?;
        let mut names: Vec<String> = self.lock_nodes().keys().cloned().collect();
        sort_names(&mut names);
        Ok(names)
    }

    async fn fetch_node(&self, name: &str) -> ChefResult<Option<Value>> {
        self.enter("fetch node").await?;
        Ok(self.lock_nodes().get(name).cloned())
    }

    async fn delete_node(&self, name: &str) -> ChefResult<()> {
        self.enter("delete node").await?;
        if self.lock_nodes().remove(name).is_none() {
            return Err(ChefError::NotFound {
                name: name.to_string(),
            });
        }
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
        Ok(())
    }

    /// Supports `*:*` and `field:value`, where `value` may end in `*` for a
    /// prefix match. Matching ignores case and looks at string attributes
    /// and string array elements.
    async fn search_nodes(&self, query: &str) -> ChefResult<Vec<Value>> {
        self.enter("search nodes").await?;
        let query = query.trim();
        let nodes = self.lock_nodes();
        let rows = nodes
            .values()
            .filter(|node| query.is_empty() || query == MATCH_ALL || matches_query(node, query))
            .map(project)
            .collect();
        Ok(rows)
    }
}

fn matches_query(node: &Value, query: &str) -> bool {
    let Some((field, wanted)) = query.split_once(':') else {
        return false;
    };
    let wanted = wanted.to_ascii_lowercase();
    let matches = |s: &str| {
        let s = s.to_ascii_lowercase();
        match wanted.strip_suffix('*') {
            Some(prefix) => s.starts_with(prefix),
            None => s == wanted,
        }
    };
    match node.get(field) {
        Some(Value::String(s)) => matches(s),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> MemoryChefClient {
        MemoryChefClient::new()
            .with_node("web01", &["role[webserver]"])
            .with_node("db01", &["role[dba]", "recipe[postgres]"])
            .with_node_attributes(json!({
                "name": "Cache01",
                "platform": "ubuntu",
                "run_list": []
            }))
    }

    #[tokio::test]
    async fn test_list_nodes_sorted() {
        let names = server().list_nodes().await.unwrap();
        assert_eq!(names, vec!["Cache01", "db01", "web01"]);
    }

    #[tokio::test]
    async fn test_fetch_and_run_list() {
        let chef = server();
        assert!(chef.node_exists("db01").await.unwrap());
        assert!(!chef.node_exists("ghost").await.unwrap());
        assert_eq!(
            chef.fetch_run_list("db01").await.unwrap(),
            vec!["role[dba]", "recipe[postgres]"]
        );
        assert!(chef.fetch_run_list("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_node() {
        let chef = server();
        chef.delete_node("web01").await.unwrap();
        assert!(!chef.contains("web01"));
        assert_eq!(chef.deleted(), vec!["web01"]);
        assert!(matches!(
            chef.delete_node("web01").await,
            Err(ChefError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_match_all_projects_nodes() {
        let rows = server().search_nodes(MATCH_ALL).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.get("kernel_os").is_some()));
    }

    #[tokio::test]
    async fn test_search_field_query() {
        let chef = server();
        let rows = chef.search_nodes("run_list:role[dba]").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "db01");

        let rows = chef.search_nodes("name:WEB*").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "web01");

        assert!(chef.search_nodes("platform:centos").await.unwrap().is_empty());
        assert!(chef.search_nodes("nonsense").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let chef = server();
        chef.set_failing(true);
        let err = chef.list_nodes().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, ChefError::Unavailable(_)));

        chef.set_failing(false);
        assert!(chef.list_nodes().await.is_ok());
    }

    #[tokio::test]
    async fn test_delay() {
        let chef = server();
        chef.set_delay(Duration::from_millis(200));
        let slow = tokio::time::timeout(Duration::from_millis(20), chef.list_nodes()).await;
        assert!(slow.is_err());
    }
}

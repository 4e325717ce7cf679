//! Shared test harness for integration tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chefdeck_auth::{AuthSource, Authorizer, EmptyRunListPolicy, hash_key};
use chefdeck_chef::MemoryChefClient;
use chefdeck_gateway::{GatewayServer, GatewaySettings, NodeService};
use chefdeck_ledger::Ledger;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

/// A gateway wired to file-backed documents in a tempdir and an in-memory
/// Chef server.
///
/// Nodes on the Chef server:
/// - `Web01`, run-list `role[dba]`
/// - `web02`, run-list `role[webserver]`
/// - `bare01`, empty run-list
///
/// Identities: `root` (admin, key `rootkey`), `alice` and `carol`
/// (`webadmin`, alice with key `alicekey`), `dave` (`dba`).
#[allow(dead_code)]
pub struct Harness {
    /// Router under test.
    pub router: Router,
    /// The ledger behind the router.
    pub ledger: Arc<Ledger>,
    /// The fake Chef server.
    pub chef: Arc<MemoryChefClient>,
    /// Holds the documents.
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Harness {
    /// Harness with default settings and the allow policy.
    pub fn new() -> Self {
        Self::with(GatewaySettings::default(), EmptyRunListPolicy::Allow)
    }

    /// Harness with explicit settings and empty run-list policy.
    pub fn with(settings: GatewaySettings, policy: EmptyRunListPolicy) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("auth.json"), auth_document().to_string()).unwrap();
        std::fs::write(
            dir.path().join("projects.json"),
            json!({
                "web": { "search": "run_list:role[webserver]" },
                "all": {}
            })
            .to_string(),
        )
        .unwrap();
        let ledger = Arc::new(Ledger::open(dir.path().join("state.json")));
        Self::assemble(dir, ledger, settings, policy)
    }

    /// Harness whose ledger path is unwritable.
    pub fn with_broken_state() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("auth.json"), auth_document().to_string()).unwrap();
        let state = dir.path().join("state.json");
        std::fs::create_dir_all(state.join("occupied")).unwrap();
        let ledger = Arc::new(Ledger::open(state));
        Self::assemble(dir, ledger, GatewaySettings::default(), EmptyRunListPolicy::Allow)
    }

    fn assemble(
        dir: TempDir,
        ledger: Arc<Ledger>,
        settings: GatewaySettings,
        policy: EmptyRunListPolicy,
    ) -> Self {
        let chef = Arc::new(
            MemoryChefClient::new()
                .with_node("Web01", &["role[dba]"])
                .with_node("web02", &["role[webserver]"])
                .with_node("bare01", &[]),
        );
        let authorizer = Authorizer::new(
            Arc::clone(&ledger),
            AuthSource::File(dir.path().join("auth.json")),
        )
        .with_empty_run_list_policy(policy);
        let service = NodeService::new(Arc::clone(&ledger), authorizer, chef.clone())
            .with_projects(dir.path().join("projects.json"))
            .with_timeout(Duration::from_millis(500));
        let router = GatewayServer::new(service, settings).into_router();

        Self {
            router,
            ledger,
            chef,
            dir,
        }
    }

    /// Path of the ledger document.
    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state.json")
    }

    /// Path of the authorization document.
    pub fn auth_path(&self) -> PathBuf {
        self.dir.path().join("auth.json")
    }

    /// A fresh ledger loaded from disk.
    pub fn reload(&self) -> Ledger {
        Ledger::open(self.state_path())
    }

    /// Send a request and decode the JSON body (`null` if not JSON).
    pub async fn call(&self, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// `GET uri`
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call("GET", uri).await
    }

    /// `POST uri`
    pub async fn post(&self, uri: &str) -> (StatusCode, Value) {
        self.call("POST", uri).await
    }
}

/// The authorization document written by [`Harness`].
pub fn auth_document() -> Value {
    json!({
        "root": { "roles": ["ADMIN"], "auth_key": hash_key("rootkey") },
        "alice": { "roles": ["webadmin"], "auth_key": hash_key("alicekey") },
        "carol": { "roles": ["webadmin"] },
        "dave": { "roles": ["dba"] }
    })
}

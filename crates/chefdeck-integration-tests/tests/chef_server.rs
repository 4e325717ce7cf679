//! The gateway against a Chef server reached over HTTP.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{Request, StatusCode};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chefdeck_auth::{AuthSource, Authorizer};
use chefdeck_chef::{HttpChefClient, HttpChefConfig};
use chefdeck_gateway::{GatewayServer, GatewaySettings, NodeService};
use chefdeck_ledger::Ledger;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

/// Chef nodes `web01` (node delete answers 503), `db01`, and `ghost` which
/// the server no longer has.
#[derive(Clone, Default)]
struct ChefStub {
    deletes: Arc<Mutex<Vec<String>>>,
}

async fn node(UrlPath(name): UrlPath<String>) -> (StatusCode, Json<Value>) {
    match name.as_str() {
        "web01" | "db01" => (StatusCode::OK, Json(json!({"name": name, "run_list": []}))),
        _ => (StatusCode::NOT_FOUND, Json(json!({"error": ["not found"]}))),
    }
}

async fn delete_client(State(stub): State<ChefStub>, UrlPath(name): UrlPath<String>) -> StatusCode {
    stub.deletes.lock().unwrap().push(format!("clients/{name}"));
    StatusCode::OK
}

async fn delete_node(State(stub): State<ChefStub>, UrlPath(name): UrlPath<String>) -> StatusCode {
    stub.deletes.lock().unwrap().push(format!("nodes/{name}"));
    match name.as_str() {
        "web01" => StatusCode::SERVICE_UNAVAILABLE,
        "db01" => StatusCode::OK,
        _ => StatusCode::NOT_FOUND,
    }
}

struct Setup {
    router: Router,
    ledger: Arc<Ledger>,
    stub: ChefStub,
    dir: TempDir,
}

async fn setup() -> Setup {
    let stub = ChefStub::default();
    let chef_router = Router::new()
        .route("/nodes/{name}", get(node).delete(delete_node))
        .route("/clients/{name}", delete(delete_client))
        .with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, chef_router).await.unwrap();
    });

    let dir = TempDir::new().unwrap();
    let auth_path = dir.path().join("auth.json");
    std::fs::write(&auth_path, common::auth_document().to_string()).unwrap();

    let endpoint = Url::parse(&format!("http://{addr}")).unwrap();
    let chef = HttpChefClient::new(HttpChefConfig::new(endpoint, "chefdeck")).unwrap();
    let ledger = Arc::new(Ledger::open(dir.path().join("state.json")));
    let authorizer = Authorizer::new(Arc::clone(&ledger), AuthSource::File(auth_path));
    let service = NodeService::new(Arc::clone(&ledger), authorizer, Arc::new(chef))
        .with_timeout(Duration::from_secs(5));
    let router = GatewayServer::new(service, GatewaySettings::default()).into_router();

    Setup {
        router,
        ledger,
        stub,
        dir,
    }
}

impl Setup {
    async fn post(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(Request::post(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn on_disk(&self) -> Ledger {
        Ledger::open(self.dir.path().join("state.json"))
    }
}

#[tokio::test]
async fn failed_node_delete_leaves_ledger_untouched() {
    let s = setup().await;
    s.post("/chef/v1/add/web01/alice").await;
    let before = std::fs::read(s.dir.path().join("state.json")).unwrap();

    let (status, body) = s.post("/chef/v1/delete/web01?auth_user=root").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["retryable"], true);
    assert_eq!(
        *s.stub.deletes.lock().unwrap(),
        vec!["clients/web01", "nodes/web01"]
    );
    assert!(s.ledger.contains("web01"));
    assert_eq!(std::fs::read(s.dir.path().join("state.json")).unwrap(), before);
}

#[tokio::test]
async fn successful_delete_removes_ledger_record() {
    let s = setup().await;
    s.post("/chef/v1/add/db01/alice").await;
    s.post("/chef/v1/add/web01/alice").await;

    let (status, body) = s.post("/chef/v1/delete/db01?auth_user=root").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("db01 Successfully Deleted"));
    assert_eq!(s.on_disk().names(), vec!["web01"]);
}

#[tokio::test]
async fn node_already_gone_from_chef_is_removed_from_ledger() {
    let s = setup().await;
    s.post("/chef/v1/add/ghost/alice").await;

    let (status, _) = s.post("/chef/v1/delete/ghost?auth_user=root").await;

    assert_eq!(status, StatusCode::OK);
    assert!(s.on_disk().is_empty());
}

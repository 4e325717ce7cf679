//! Chef server REST client.
//!
//! Talks to the Chef server API over HTTP. With a client key configured every
//! request is signed (see [`RequestSigner`]); without one requests go out
//! unsigned, which only chef-zero accepts.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};
use url::Url;

use crate::client::{ChefClient, SEARCH_FILTER, sort_names};
use crate::error::{ChefError, ChefResult};
use crate::signing::RequestSigner;

const DEFAULT_CHEF_VERSION: &str = "12.0.0";
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for [`HttpChefClient`].
#[derive(Debug, Clone)]
pub struct HttpChefConfig {
    /// Chef server base URL, e.g. `https://chef.example.com/organizations/ops`.
    pub endpoint: Url,
    /// Client name sent as `X-Ops-UserId` on reads.
    pub client_name: String,
    /// Client name used for deletes. Falls back to `client_name`.
    pub admin_client_name: Option<String>,
    /// PEM private key of `client_name`.
    pub client_key: Option<PathBuf>,
    /// PEM private key of the admin client. Falls back to `client_key`.
    pub admin_client_key: Option<PathBuf>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Value for the `X-Chef-Version` header.
    pub chef_version: String,
}

impl HttpChefConfig {
    /// Settings with defaults for everything but the endpoint and client.
    #[must_use]
    pub fn new(endpoint: Url, client_name: impl Into<String>) -> Self {
        Self {
            endpoint,
            client_name: client_name.into(),
            admin_client_name: None,
            client_key: None,
            admin_client_key: None,
            timeout: Duration::from_secs(30),
            chef_version: DEFAULT_CHEF_VERSION.to_string(),
        }
    }

    /// Set the client name used for deletes.
    #[must_use]
    pub fn with_admin_client(mut self, name: impl Into<String>) -> Self {
        self.admin_client_name = Some(name.into());
        self
    }

    /// Sign reads with the key at `path`.
    #[must_use]
    pub fn with_client_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_key = Some(path.into());
        self
    }

    /// Sign deletes with the key at `path`.
    #[must_use]
    pub fn with_admin_client_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.admin_client_key = Some(path.into());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Which Chef client identity a request is made as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Caller {
    Reader,
    Admin,
}

/// [`ChefClient`] backed by the Chef server REST API.
#[derive(Debug, Clone)]
pub struct HttpChefClient {
    client: Client,
    config: HttpChefConfig,
    signer: Option<RequestSigner>,
    admin_signer: Option<RequestSigner>,
}

impl HttpChefClient {
    /// Create a client, loading any configured keys.
    ///
    /// # Errors
    ///
    /// Returns [`ChefError::Config`] if the endpoint cannot carry a path, a
    /// key cannot be loaded, a separate admin client has no key of its own
    /// while reads are signed, or the HTTP client cannot be built.
    pub fn new(config: HttpChefConfig) -> ChefResult<Self> {
        if config.endpoint.cannot_be_a_base() {
            return Err(ChefError::Config(format!(
                "endpoint cannot be used as a base URL: {}",
                config.endpoint
            )));
        }

        let signer = config
            .client_key
            .as_deref()
            .map(|path| RequestSigner::from_file(&config.client_name, path))
            .transpose()?;
        let admin_name = config
            .admin_client_name
            .as_deref()
            .unwrap_or(&config.client_name);
        let admin_signer = match (&config.admin_client_key, &signer) {
            (Some(path), _) => Some(RequestSigner::from_file(admin_name, path)?),
            (None, Some(signer)) if signer.user_id() == admin_name => Some(signer.clone()),
            (None, Some(_)) => {
                return Err(ChefError::Config(format!(
                    "admin client {admin_name} needs its own key when requests are signed"
                )));
            },
            (None, None) => None,
        };
        if signer.is_none() {
            warn!(endpoint = %config.endpoint, "no Chef client key configured, requests are unsigned");
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChefError::Config(e.to_string()))?;
        Ok(Self {
            client,
            config,
            signer,
            admin_signer,
        })
    }

    /// Whether reads are signed.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// The configured endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.config.endpoint
    }

    fn url(&self, segments: &[&str]) -> ChefResult<Url> {
        let mut url = self.config.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| ChefError::Config("endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Build a request as `caller`, signed when a key is configured.
    fn request(
        &self,
        method: Method,
        url: Url,
        caller: Caller,
        body: Option<Vec<u8>>,
    ) -> ChefResult<RequestBuilder> {
        let (user, signer) = match caller {
            Caller::Reader => (self.config.client_name.as_str(), self.signer.as_ref()),
            Caller::Admin => (self.admin_client(), self.admin_signer.as_ref()),
        };
        let body = body.unwrap_or_default();
        let auth = match signer {
            Some(signer) => signer.sign(method.as_str(), url.path(), &body, Utc::now())?,
            None => vec![("X-Ops-UserId".to_owned(), user.to_owned())],
        };

        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/json")
            .header("X-Chef-Version", &self.config.chef_version);
        for (name, value) in auth {
            request = request.header(name, value);
        }
        if !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }
        Ok(request)
    }

    fn admin_client(&self) -> &str {
        self.config
            .admin_client_name
            .as_deref()
            .unwrap_or(&self.config.client_name)
    }

    /// Send a request. A 404 comes back as `None`; other failures are errors.
    async fn execute(&self, operation: &str, request: RequestBuilder) -> ChefResult<Option<Response>> {
        let response = request
            .send()
            .await
            .map_err(|e| ChefError::from_reqwest(operation, &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
            error!(operation, status = %status, body = %body, "Chef API error");
            if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::BAD_GATEWAY {
                return Err(ChefError::Unavailable(format!("Status {status}: {body}")));
            }
            return Err(ChefError::Status {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(Some(response))
    }

    async fn json(operation: &str, response: Response) -> ChefResult<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|e| ChefError::from_reqwest(operation, &e))
    }
}

#[async_trait]
impl ChefClient for HttpChefClient {
    fn name(&self) -> &str {
        "chef-http"
    }

    async fn list_nodes(&self) -> ChefResult<Vec<String>> {
        debug!(endpoint = %self.config.endpoint, "Listing Chef nodes");
        let url = self.url(&["nodes"])?;
        let request = self.request(Method::GET, url, Caller::Reader, None)?;
        let Some(response) = self.execute("list nodes", request).await? else {
            return Err(ChefError::InvalidResponse(
                "nodes endpoint returned 404".to_string(),
            ));
        };
        let body = Self::json("list nodes", response).await?;
        let Value::Object(map) = body else {
            return Err(ChefError::InvalidResponse(
                "nodes listing is not an object".to_string(),
            ));
        };
        let mut names: Vec<String> = map.into_iter().map(|(k, _)| k).collect();
        sort_names(&mut names);
        Ok(names)
    }

    async fn fetch_node(&self, name: &str) -> ChefResult<Option<Value>> {
        debug!(node = name, "Fetching Chef node");
        let url = self.url(&["nodes", name])?;
        let request = self.request(Method::GET, url, Caller::Reader, None)?;
        match self.execute("fetch node", request).await? {
            Some(response) => Ok(Some(Self::json("fetch node", response).await?)),
            None => Ok(None),
        }
    }

    async fn delete_node(&self, name: &str) -> ChefResult<()> {
        let admin = self.admin_client();
        debug!(node = name, client = admin, "Deleting Chef client and node");

        let url = self.url(&["clients", name])?;
        let request = self.request(Method::DELETE, url, Caller::Admin, None)?;
        if self.execute("delete client", request).await?.is_none() {
            warn!(node = name, "Chef API client not found, deleting node only");
        }

        let url = self.url(&["nodes", name])?;
        let request = self.request(Method::DELETE, url, Caller::Admin, None)?;
        match self.execute("delete node", request).await? {
            Some(_) => Ok(()),
            None => Err(ChefError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    async fn search_nodes(&self, query: &str) -> ChefResult<Vec<Value>> {
        debug!(query, "Searching Chef nodes");
        let mut url = self.url(&["search", "node"])?;
        url.query_pairs_mut().append_pair("q", query).append_pair("start", "0");

        let body = serde_json::to_vec(&filter_body())
            .map_err(|e| ChefError::Config(format!("search filter: {e}")))?;
        let request = self.request(Method::POST, url, Caller::Reader, Some(body))?;
        let Some(response) = self.execute("search nodes", request).await? else {
            return Err(ChefError::InvalidResponse(
                "search endpoint returned 404".to_string(),
            ));
        };
        let body = Self::json("search nodes", response).await?;
        rows_of(body)
    }
}

/// Partial-search request body built from [`SEARCH_FILTER`].
fn filter_body() -> Value {
    let mut body = Map::new();
    for (field, path) in SEARCH_FILTER {
        body.insert((*field).to_string(), serde_json::json!(path));
    }
    Value::Object(body)
}

/// Unwrap partial-search rows. Rows carry the projection under `data`; rows
/// without it are returned as-is.
fn rows_of(body: Value) -> ChefResult<Vec<Value>> {
    let Value::Object(mut map) = body else {
        return Err(ChefError::InvalidResponse(
            "search response is not an object".to_string(),
        ));
    };
    let Some(Value::Array(rows)) = map.remove("rows") else {
        return Err(ChefError::InvalidResponse(
            "search response has no rows".to_string(),
        ));
    };
    Ok(rows
        .into_iter()
        .map(|mut row| match row.get_mut("data") {
            Some(data) => data.take(),
            None => row,
        })
        .collect())
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx = idx.saturating_sub(1);
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::body::Bytes;
    use axum::extract::{Path as UrlPath, State};
    use axum::http::HeaderMap;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
    use serde_json::json;

    use crate::signing::canonical_request;

    const KEY_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/client.pem");

    fn client(endpoint: &str) -> HttpChefClient {
        HttpChefClient::new(HttpChefConfig::new(Url::parse(endpoint).unwrap(), "deck")).unwrap()
    }

    #[test]
    fn test_url_joins_segments() {
        let c = client("https://chef.example.com/organizations/ops/");
        assert_eq!(
            c.url(&["nodes", "web01"]).unwrap().as_str(),
            "https://chef.example.com/organizations/ops/nodes/web01"
        );

        let c = client("http://localhost:8889");
        assert_eq!(
            c.url(&["nodes"]).unwrap().as_str(),
            "http://localhost:8889/nodes"
        );
    }

    #[test]
    fn test_url_escapes_node_name() {
        let c = client("http://localhost:8889");
        assert_eq!(
            c.url(&["nodes", "a/b c"]).unwrap().as_str(),
            "http://localhost:8889/nodes/a%2Fb%20c"
        );
    }

    #[test]
    fn test_rejects_non_base_endpoint() {
        let config = HttpChefConfig::new(Url::parse("mailto:ops@example.com").unwrap(), "deck");
        assert!(matches!(
            HttpChefClient::new(config),
            Err(ChefError::Config(_))
        ));
    }

    #[test]
    fn test_admin_client_fallback() {
        let c = client("http://localhost:8889");
        assert_eq!(c.admin_client(), "deck");

        let config = HttpChefConfig::new(Url::parse("http://localhost:8889").unwrap(), "deck")
            .with_admin_client("pivotal");
        let c = HttpChefClient::new(config).unwrap();
        assert_eq!(c.admin_client(), "pivotal");
    }

    #[test]
    fn test_filter_body() {
        let body = filter_body();
        assert_eq!(body["kernel_os"], json!(["kernel", "os"]));
        assert_eq!(body["name"], json!(["name"]));
    }

    #[test]
    fn test_rows_of_partial_search() {
        let body = json!({
            "total": 2,
            "start": 0,
            "rows": [
                {"url": "http://x/nodes/a", "data": {"name": "a"}},
                {"name": "b"}
            ]
        });
        let rows = rows_of(body).unwrap();
        assert_eq!(rows, vec![json!({"name": "a"}), json!({"name": "b"})]);
    }

    #[test]
    fn test_rows_of_rejects_bad_shape() {
        assert!(rows_of(json!([])).is_err());
        assert!(rows_of(json!({"total": 0})).is_err());
    }

    #[test]
    fn test_floor_char_boundary() {
        assert_eq!(floor_char_boundary("abc", 10), 3);
        assert_eq!(floor_char_boundary("héllo", 2), 1);
    }

    /// Requests seen by the stub Chef server: `(operation, headers, body)`.
    #[derive(Clone, Default)]
    struct Stub {
        seen: Arc<Mutex<Vec<(String, HeaderMap, Bytes)>>>,
    }

    impl Stub {
        fn record(&self, operation: String, headers: HeaderMap, body: Bytes) {
            self.seen.lock().unwrap().push((operation, headers, body));
        }

        fn operations(&self) -> Vec<String> {
            self.seen.lock().unwrap().iter().map(|(op, _, _)| op.clone()).collect()
        }

        fn last(&self) -> (HeaderMap, Bytes) {
            let seen = self.seen.lock().unwrap();
            let (_, headers, body) = seen.last().unwrap();
            (headers.clone(), body.clone())
        }
    }

    fn read_status(name: &str) -> StatusCode {
        match name {
            "ghost" => StatusCode::NOT_FOUND,
            "flaky" => StatusCode::SERVICE_UNAVAILABLE,
            "proxied" => StatusCode::BAD_GATEWAY,
            "locked" => StatusCode::FORBIDDEN,
            _ => StatusCode::OK,
        }
    }

    async fn stub_nodes(State(stub): State<Stub>, headers: HeaderMap) -> Json<Value> {
        stub.record("GET nodes".into(), headers, Bytes::new());
        Json(json!({"web01": "http://x/nodes/web01", "DB01": "http://x/nodes/DB01"}))
    }

    async fn stub_node(
        State(stub): State<Stub>,
        UrlPath(name): UrlPath<String>,
        headers: HeaderMap,
    ) -> (StatusCode, Json<Value>) {
        stub.record(format!("GET nodes/{name}"), headers, Bytes::new());
        (read_status(&name), Json(json!({"name": name, "run_list": ["role[web]"]})))
    }

    async fn stub_delete_client(
        State(stub): State<Stub>,
        UrlPath(name): UrlPath<String>,
        headers: HeaderMap,
    ) -> StatusCode {
        stub.record(format!("DELETE clients/{name}"), headers, Bytes::new());
        match name.as_str() {
            "orphan" | "ghost" => StatusCode::NOT_FOUND,
            "flaky" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::OK,
        }
    }

    async fn stub_delete_node(
        State(stub): State<Stub>,
        UrlPath(name): UrlPath<String>,
        headers: HeaderMap,
    ) -> StatusCode {
        stub.record(format!("DELETE nodes/{name}"), headers, Bytes::new());
        match name.as_str() {
            "ghost" => StatusCode::NOT_FOUND,
            "stuck" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }

    async fn stub_search(State(stub): State<Stub>, headers: HeaderMap, body: Bytes) -> Json<Value> {
        stub.record("POST search/node".into(), headers, body);
        Json(json!({"total": 1, "start": 0, "rows": [{"data": {"name": "web01"}}]}))
    }

    /// Serve a stub Chef organization and return its URL.
    async fn serve(stub: Stub) -> Url {
        let org = Router::new()
            .route("/nodes", get(stub_nodes))
            .route("/nodes/{name}", get(stub_node).delete(stub_delete_node))
            .route("/clients/{name}", delete(stub_delete_client))
            .route("/search/node", post(stub_search))
            .with_state(stub);
        let router = Router::new().nest("/organizations/ops", org);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/organizations/ops")).unwrap()
    }

    async fn stub_client(config: impl FnOnce(HttpChefConfig) -> HttpChefConfig) -> (Stub, HttpChefClient) {
        let stub = Stub::default();
        let endpoint = serve(stub.clone()).await;
        let client = HttpChefClient::new(config(HttpChefConfig::new(endpoint, "chefdeck"))).unwrap();
        (stub, client)
    }

    #[tokio::test]
    async fn test_fetch_node_status_mapping() {
        let (_stub, c) = stub_client(|c| c).await;

        let node = c.fetch_node("web01").await.unwrap().unwrap();
        assert_eq!(node["name"], "web01");
        assert!(c.fetch_node("ghost").await.unwrap().is_none());
        assert!(!c.node_exists("ghost").await.unwrap());
        assert!(c.fetch_run_list("ghost").await.unwrap().is_empty());

        for name in ["flaky", "proxied"] {
            let err = c.fetch_node(name).await.unwrap_err();
            assert!(matches!(err, ChefError::Unavailable(_)), "{name}: {err:?}");
            assert!(err.is_retryable());
        }

        let err = c.fetch_node("locked").await.unwrap_err();
        assert!(matches!(err, ChefError::Status { status: 403, .. }), "{err:?}");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_list_nodes_sorted() {
        let (_stub, c) = stub_client(|c| c).await;
        assert_eq!(c.list_nodes().await.unwrap(), vec!["DB01", "web01"]);
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_client() {
        let (stub, c) = stub_client(|c| c).await;

        c.delete_node("orphan").await.unwrap();

        assert_eq!(
            stub.operations(),
            vec!["DELETE clients/orphan", "DELETE nodes/orphan"]
        );
    }

    #[tokio::test]
    async fn test_delete_status_mapping() {
        let (stub, c) = stub_client(|c| c).await;

        let err = c.delete_node("ghost").await.unwrap_err();
        assert!(matches!(err, ChefError::NotFound { ref name } if name == "ghost"));

        let err = c.delete_node("flaky").await.unwrap_err();
        assert!(matches!(err, ChefError::Unavailable(_)));
        assert!(!stub.operations().contains(&"DELETE nodes/flaky".to_string()));

        let err = c.delete_node("stuck").await.unwrap_err();
        assert!(matches!(err, ChefError::Status { status: 500, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unsigned_requests_carry_user_id() {
        let (stub, c) = stub_client(|c| c.with_admin_client("pivotal")).await;
        assert!(!c.is_signed());

        c.delete_node("web01").await.unwrap();

        let (headers, _) = stub.last();
        assert_eq!(headers["x-ops-userid"], "pivotal");
        assert_eq!(headers["x-chef-version"], "12.0.0");
        assert!(headers.get("x-ops-sign").is_none());
    }

    #[tokio::test]
    async fn test_signed_search_verifies() {
        let (stub, c) = stub_client(|c| c.with_client_key(KEY_PATH)).await;
        assert!(c.is_signed());

        let rows = c.search_nodes("name:web*").await.unwrap();
        assert_eq!(rows, vec![json!({"name": "web01"})]);

        let (headers, body) = stub.last();
        let header = |name: &str| headers[name].to_str().unwrap().to_string();
        assert_eq!(header("x-ops-sign"), "algorithm=sha1;version=1.1;");
        assert_eq!(header("x-ops-userid"), "chefdeck");
        assert_eq!(header("content-type"), "application/json");
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), filter_body());

        let mut lines = Vec::new();
        for index in 1..=6 {
            lines.push(header(&format!("x-ops-authorization-{index}")));
        }
        assert!(headers.get("x-ops-authorization-7").is_none());
        let signature = STANDARD.decode(lines.concat()).unwrap();

        let canonical = canonical_request(
            "POST",
            "/organizations/ops/search/node",
            &header("x-ops-content-hash"),
            &header("x-ops-timestamp"),
            "chefdeck",
        );
        let key = RsaPrivateKey::from_pkcs1_pem(&std::fs::read_to_string(KEY_PATH).unwrap()).unwrap();
        RsaPublicKey::from(&key)
            .verify(Pkcs1v15Sign::new_unprefixed(), canonical.as_bytes(), &signature)
            .unwrap();
    }

    #[tokio::test]
    async fn test_signed_delete_uses_admin_identity() {
        let (stub, c) = stub_client(|c| {
            c.with_client_key(KEY_PATH)
                .with_admin_client("pivotal")
                .with_admin_client_key(KEY_PATH)
        })
        .await;

        c.delete_node("web01").await.unwrap();

        let (headers, _) = stub.last();
        assert_eq!(headers["x-ops-userid"], "pivotal");
        assert!(headers.get("x-ops-authorization-1").is_some());
    }

    #[test]
    fn test_separate_admin_client_requires_key_when_signing() {
        let config = HttpChefConfig::new(Url::parse("http://localhost:8889").unwrap(), "deck")
            .with_client_key(KEY_PATH)
            .with_admin_client("pivotal");
        assert!(matches!(
            HttpChefClient::new(config),
            Err(ChefError::Config(_))
        ));
    }

    #[test]
    fn test_missing_key_file_rejected() {
        let config = HttpChefConfig::new(Url::parse("http://localhost:8889").unwrap(), "deck")
            .with_client_key("/nonexistent/deck.pem");
        assert!(matches!(
            HttpChefClient::new(config),
            Err(ChefError::Config(_))
        ));
    }
}

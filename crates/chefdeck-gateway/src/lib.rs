//! Chefdeck Gateway - HTTP facade over the ledger and the Chef server.
//!
//! Provides a [`GatewayServer`] exposing the JSON API RunDeck uses to list,
//! register and remove Chef nodes:
//!
//! - `GET /` - health line
//! - `GET /config` - configuration dump (development only)
//! - `GET /state`, `GET /chef/v1/state` - ledger records
//! - `GET /chef/v1/list` - node names on the Chef server
//! - `GET /chef/v1/list/{user}` - names `user` may delete
//! - `GET /chef/v1/node/{node}?regex=1` - node attributes, or `false`
//! - `GET|POST /chef/v1/auth` - the caller's authorization
//! - `GET /chef/v1/search?project=` - partial node search
//! - `GET /chef/v1/{project}/config` - project settings
//! - `GET /chef/v1/{project}/search` - project node search
//! - `POST /chef/v1/add/{node}/{user}?type=` - register a node
//! - `POST /chef/v1/delete/{node}` - authorization-gated delete
//!
//! The caller is named by the `auth_user` query parameter. A key is taken
//! from `auth_key`, or from the `Authorization` header when absent.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod handlers;
mod service;


use std::sync::Arc;

use axum::Router;
use axum::extract::{MatchedPath, Query, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::Value;
use tracing::Instrument;

use chefdeck_telemetry::RequestContext;

pub use error::{GatewayError, GatewayResult};
pub use service::{AuthSummary, DEFAULT_CHEF_TIMEOUT, NodeService, PROJECT_SEARCH_KEY, RoleSummary};

/// Default `Cache-Control` max-age for cacheable reads, in seconds.
pub const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 30;

/// Request-level behavior of the HTTP surface.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// `max-age` sent on cacheable reads.
    pub cache_timeout_secs: u64,
    /// Require a matching key on add and delete.
    pub require_key: bool,
    /// Serve `GET /config`.
    pub development: bool,
    /// Document returned by `GET /config`.
    pub config_dump: Option<Value>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            cache_timeout_secs: DEFAULT_CACHE_TIMEOUT_SECS,
            require_key: false,
            development: false,
            config_dump: None,
        }
    }
}

/// Shared state for all handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: Arc<NodeService>,
    pub(crate) settings: Arc<GatewaySettings>,
}

/// Identity and key carried in the query string.
#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct Caller {
    #[serde(default)]
    pub(crate) auth_user: Option<String>,
    #[serde(default)]
    pub(crate) auth_key: Option<String>,
}

/// Wrap each routed request in a span carrying a request id, the route
/// and the caller, then log its outcome.
async fn trace_request(request: Request, next: Next) -> Response {
    let operation = request.extensions().get::<MatchedPath>().map_or_else(
        || request.uri().path().to_owned(),
        |m| m.as_str().to_owned(),
    );
    let mut ctx = RequestContext::new(format!("{} {operation}", request.method()))
        .with_target(request.uri().path());
    if let Some(user) = Query::<Caller>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(caller)| caller.auth_user)
    {
        ctx = ctx.with_identity(user);
    }

    let response = next.run(request).instrument(ctx.span()).await;
    ctx.finish(response.status().as_u16());
    response
}

/// HTTP server backed by a [`NodeService`].
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    /// Create a server.
    #[must_use]
    pub fn new(service: NodeService, settings: GatewaySettings) -> Self {
        let state = AppState {
            service: Arc::new(service),
            settings: Arc::new(settings),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    fn build_router(state: AppState) -> Router {
        let api = Router::new()
            .route("/state", get(handlers::state))
            .route("/list", get(handlers::list_nodes))
            .route("/list/{user}", get(handlers::list_for_user))
            .route("/node/{node}", get(handlers::get_node))
            .route("/auth", get(handlers::auth).post(handlers::auth))
            .route("/search", get(handlers::search))
            .route("/{project}/config", get(handlers::project_config))
            .route("/{project}/search", get(handlers::project_search))
            .route("/add/{node}/{user}", post(handlers::add_node))
            .route("/delete/{node}", post(handlers::delete_node));

        let mut router = Router::new()
            .route("/", get(handlers::health))
            .route("/state", get(handlers::state));
        if state.settings.development {
            router = router.route("/config", get(handlers::config));
        }

        router
            .nest("/chef/v1", api)
            .route_layer(middleware::from_fn(trace_request))
            .with_state(state)
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `addr` until `shutdown` completes, then drain in-flight
    /// requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "gateway listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

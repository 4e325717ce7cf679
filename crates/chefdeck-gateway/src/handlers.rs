//! HTTP request handlers.
//!
//! Every `/chef/v1` handler resolves the caller from the query string and
//! hands off to [`NodeService`](crate::NodeService). Cacheable reads carry a
//! `Cache-Control: public, max-age=N` header.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use chefdeck_auth::AuthContext;
use chefdeck_ledger::NodeRecord;

use crate::error::GatewayResult;
use crate::service::AuthSummary;
use crate::{AppState, Caller};

/// Attach the configured `Cache-Control` header.
fn cached(state: &AppState, body: impl IntoResponse) -> Response {
    let value = format!("public, max-age={}", state.settings.cache_timeout_secs);
    let mut response = body.into_response();
    if let Ok(value) = HeaderValue::from_str(&value) {
        response.headers_mut().insert(header::CACHE_CONTROL, value);
    }
    response
}

/// Presented key: the `auth_key` parameter, else the `Authorization` header.
fn presented_key<'a>(auth_key: Option<&'a str>, headers: &'a HeaderMap) -> Option<&'a str> {
    auth_key.filter(|k| !k.is_empty()).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
            .filter(|k| !k.is_empty())
    })
}

/// Enforce the key requirement, if enabled.
fn check_key(state: &AppState, ctx: &AuthContext, key: Option<&str>) -> GatewayResult<()> {
    if state.settings.require_key {
        state.service.authorizer().require_key(ctx, key)?;
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Service endpoints
// -----------------------------------------------------------------------

/// `GET /`
pub(crate) async fn health() -> &'static str {
    "chefdeck is up and running!"
}

/// `GET /config`, development only.
pub(crate) async fn config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": concat!("chefdeck ", env!("CARGO_PKG_VERSION")),
        "cache_timeout_secs": state.settings.cache_timeout_secs,
        "require_key": state.settings.require_key,
        "state": state.service.ledger().names(),
        "config": state.settings.config_dump.clone().unwrap_or(Value::Null),
    }))
}

/// `GET /state` and `GET /chef/v1/state`
pub(crate) async fn state(State(state): State<AppState>) -> Json<Vec<NodeRecord>> {
    Json(state.service.state())
}

// -----------------------------------------------------------------------
// Chef reads
// -----------------------------------------------------------------------

/// `GET /chef/v1/list`
pub(crate) async fn list_nodes(State(state): State<AppState>) -> GatewayResult<Response> {
    let names = state.service.list_nodes().await?;
    Ok(cached(&state, Json(names)))
}

/// `GET /chef/v1/list/{user}`
///
/// The user comes from the path, not the query string.
pub(crate) async fn list_for_user(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Json<Vec<String>> {
    Json(state.service.list_for_user(&user))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NodeQuery {
    #[serde(default)]
    regex: Option<String>,
}

/// `GET /chef/v1/node/{node}?regex=1`
///
/// Answers `false` when the node does not exist.
pub(crate) async fn get_node(
    State(state): State<AppState>,
    Path(node): Path<String>,
    Query(query): Query<NodeQuery>,
) -> GatewayResult<Response> {
    let case_insensitive = query.regex.as_deref() == Some("1");
    let found = state.service.get_node(&node, case_insensitive).await?;
    Ok(cached(&state, Json(found.unwrap_or(Value::Bool(false)))))
}

/// `GET|POST /chef/v1/auth`
pub(crate) async fn auth(
    State(state): State<AppState>,
    Query(caller): Query<Caller>,
    headers: HeaderMap,
) -> Json<AuthSummary> {
    let ctx = state
        .service
        .resolve(caller.auth_user.as_deref().unwrap_or_default());
    let key = presented_key(caller.auth_key.as_deref(), &headers);
    Json(state.service.auth_summary(&ctx, key))
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    project: Option<String>,
}

/// `GET /chef/v1/search?project=`
pub(crate) async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> GatewayResult<Response> {
    let rows = state.service.search(query.project.as_deref()).await?;
    Ok(cached(&state, Json(rows)))
}

/// `GET /chef/v1/{project}/config`
pub(crate) async fn project_config(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Json<Value> {
    Json(state.service.project_settings(&project))
}

/// `GET /chef/v1/{project}/search`
pub(crate) async fn project_search(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> GatewayResult<Response> {
    let rows = state.service.search(Some(&project)).await?;
    Ok(cached(&state, Json(rows)))
}

// -----------------------------------------------------------------------
// Mutations
// -----------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AddQuery {
    #[serde(default, rename = "type")]
    node_type: Option<String>,
    #[serde(default)]
    auth_user: Option<String>,
    #[serde(default)]
    auth_key: Option<String>,
}

/// `POST /chef/v1/add/{node}/{user}?type=`
///
/// The path user is recorded as the actor. The key, when required, belongs
/// to `auth_user`, or to the path user if that is unset.
pub(crate) async fn add_node(
    State(state): State<AppState>,
    Path((node, user)): Path<(String, String)>,
    Query(query): Query<AddQuery>,
    headers: HeaderMap,
) -> GatewayResult<Json<NodeRecord>> {
    let identity = query
        .auth_user
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(&user);
    let ctx = state.service.resolve(identity);
    check_key(&state, &ctx, presented_key(query.auth_key.as_deref(), &headers))?;

    let record = state
        .service
        .add(&node, &user, query.node_type.as_deref())
        .await?;
    Ok(Json(record))
}

/// `POST /chef/v1/delete/{node}`
pub(crate) async fn delete_node(
    State(state): State<AppState>,
    Path(node): Path<String>,
    Query(caller): Query<Caller>,
    headers: HeaderMap,
) -> GatewayResult<Json<String>> {
    let ctx = state
        .service
        .resolve(caller.auth_user.as_deref().unwrap_or_default());
    check_key(&state, &ctx, presented_key(caller.auth_key.as_deref(), &headers))?;

    state.service.delete(&ctx, &node).await?;
    Ok(Json(format!("{node} Successfully Deleted")))
}

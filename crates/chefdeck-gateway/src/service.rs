//! Request orchestration over the ledger, the authorizer and Chef.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use chefdeck_auth::{AuthContext, Authorizer};
use chefdeck_chef::{ChefClient, ChefError, ChefResult, MATCH_ALL};
use chefdeck_ledger::{Ledger, LedgerResult, NodeRecord};

use crate::error::{GatewayError, GatewayResult};

/// Default bound on a single Chef server call.
pub const DEFAULT_CHEF_TIMEOUT: Duration = Duration::from_secs(30);

/// Key in a project's settings naming its node search query.
pub const PROJECT_SEARCH_KEY: &str = "search";

/// Answer to `GET /chef/v1/auth`.
///
/// Field names match what existing RunDeck job definitions parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSummary {
    /// Caller identity, `null` when anonymous.
    #[serde(rename = "User")]
    pub user: Option<String>,
    /// Whether the caller is an admin.
    #[serde(rename = "Admin")]
    pub admin: bool,
    /// Roles held by the caller.
    #[serde(rename = "Authorization")]
    pub authorization: RoleSummary,
    /// Whether the presented key matched. Omitted when no key was presented.
    #[serde(rename = "Auth_Key_Match?", skip_serializing_if = "Option::is_none")]
    pub auth_key_match: Option<bool>,
}

/// Role list inside [`AuthSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    /// The caller's roles.
    pub roles: Vec<String>,
}

/// Composes the ledger, the authorizer and the Chef client into the
/// add, delete and listing operations.
pub struct NodeService {
    ledger: Arc<Ledger>,
    authorizer: Authorizer,
    chef: Arc<dyn ChefClient>,
    projects: Option<PathBuf>,
    timeout: Duration,
}

impl std::fmt::Debug for NodeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeService")
            .field("ledger", &self.ledger)
            .field("chef", &self.chef.name())
            .field("projects", &self.projects)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl NodeService {
    /// Create a service.
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, authorizer: Authorizer, chef: Arc<dyn ChefClient>) -> Self {
        Self {
            ledger,
            authorizer,
            chef,
            projects: None,
            timeout: DEFAULT_CHEF_TIMEOUT,
        }
    }

    /// Read project settings from this JSON document.
    #[must_use]
    pub fn with_projects(mut self, path: impl Into<PathBuf>) -> Self {
        self.projects = Some(path.into());
        self
    }

    /// Bound every Chef server call by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// The authorizer.
    #[must_use]
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// Resolve a caller identity.
    #[must_use]
    pub fn resolve(&self, identity: &str) -> AuthContext {
        self.authorizer.resolve(identity)
    }

    /// Register `name` on behalf of `user`, or touch its existing record.
    ///
    /// # Errors
    ///
    /// [`GatewayError::BadRequest`] for blank input,
    /// [`GatewayError::Persistence`] if the ledger cannot be written.
    pub async fn add(
        &self,
        name: &str,
        user: &str,
        node_type: Option<&str>,
    ) -> GatewayResult<NodeRecord> {
        let (name, user) = (name.to_owned(), user.to_owned());
        let node_type = node_type.map(str::to_owned);
        self.with_ledger(move |ledger| ledger.upsert(&name, &user, node_type.as_deref()))
            .await
    }

    /// Delete `name` from Chef and the ledger if `ctx` is allowed to.
    ///
    /// The node's run-list is read from Chef at call time. Nothing is
    /// changed unless authorization passes, and the ledger is only updated
    /// after Chef confirms the deletion.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotFound`] when the ledger has no record,
    /// [`GatewayError::Unauthorized`] when no rule allows the delete, and
    /// external or persistence errors from the two writes.
    pub async fn delete(&self, ctx: &AuthContext, name: &str) -> GatewayResult<NodeRecord> {
        let Some(record) = self.ledger.find(name) else {
            return Err(GatewayError::not_in_state(name));
        };
        let chef_name = record.name.clone();

        let run_list = self
            .external("fetch run-list", self.chef.fetch_run_list(&chef_name))
            .await?;
        let decision = self.authorizer.check_delete(ctx, &chef_name, &run_list)?;

        match self
            .external("delete node", self.chef.delete_node(&chef_name))
            .await
        {
            Ok(()) => {},
            Err(GatewayError::NotFound { .. }) => {
                warn!(node = %chef_name, "node already absent from Chef, removing ledger record");
            },
            Err(e) => return Err(e),
        }

        let removed = self
            .with_ledger({
                let name = chef_name.clone();
                move |ledger| ledger.delete(&name)
            })
            .await;

        match removed {
            Ok(record) => {
                info!(
                    node = %record.name,
                    identity = ctx.identity(),
                    decision = decision.as_str(),
                    "node deleted"
                );
                Ok(record)
            },
            Err(GatewayError::NotFound { .. }) => {
                warn!(node = %chef_name, "ledger record removed concurrently");
                Ok(record)
            },
            Err(e) => {
                error!(
                    node = %chef_name,
                    error = %e,
                    "node deleted from Chef but ledger still holds it"
                );
                Err(e)
            },
        }
    }

    /// Names `identity` may delete.
    ///
    /// Admins see every record. Others see records whose `type` equals one
    /// of their roles (ignoring case) and records they created.
    #[must_use]
    pub fn list_for_user(&self, identity: &str) -> Vec<String> {
        let ctx = self.authorizer.resolve(identity);
        let records = self.ledger.all();
        if ctx.is_admin() {
            return records.into_iter().map(|r| r.name).collect();
        }

        records
            .into_iter()
            .filter(|r| {
                let role_match = r
                    .node_type
                    .as_deref()
                    .is_some_and(|t| ctx.has_role(t));
                role_match || r.is_created_by(ctx.identity())
            })
            .map(|r| r.name)
            .collect()
    }

    /// Every ledger record, sorted by name.
    #[must_use]
    pub fn state(&self) -> Vec<NodeRecord> {
        self.ledger.all()
    }

    /// Node names known to Chef.
    ///
    /// # Errors
    ///
    /// External service or timeout errors.
    pub async fn list_nodes(&self) -> GatewayResult<Vec<String>> {
        self.external("list nodes", self.chef.list_nodes()).await
    }

    /// Full node attributes, or `None` if Chef has no such node.
    ///
    /// With `case_insensitive`, `name` is first matched against the node
    /// list ignoring case.
    ///
    /// # Errors
    ///
    /// External service or timeout errors.
    pub async fn get_node(&self, name: &str, case_insensitive: bool) -> GatewayResult<Option<Value>> {
        let name = if case_insensitive {
            let nodes = self.list_nodes().await?;
            match nodes.into_iter().find(|n| n.eq_ignore_ascii_case(name)) {
                Some(n) => n,
                None => return Ok(None),
            }
        } else {
            name.to_owned()
        };
        self.external("fetch node", self.chef.fetch_node(&name)).await
    }

    /// Partial search using the project's query, or all nodes when the
    /// project is unset or has no query.
    ///
    /// # Errors
    ///
    /// External service or timeout errors.
    pub async fn search(&self, project: Option<&str>) -> GatewayResult<Vec<Value>> {
        let query = project
            .map(|p| self.project_settings(p))
            .and_then(|settings| {
                settings
                    .get(PROJECT_SEARCH_KEY)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| MATCH_ALL.to_owned());
        self.external("search nodes", self.chef.search_nodes(&query))
            .await
    }

    /// Settings object for `project`, `{}` when absent.
    ///
    /// The projects document is re-read on every call.
    #[must_use]
    pub fn project_settings(&self, project: &str) -> Value {
        let doc = chefdeck_store::read_value(self.projects.as_deref());
        match doc.get(project) {
            Some(Value::Object(settings)) => Value::Object(settings.clone()),
            _ => Value::Object(Map::new()),
        }
    }

    /// Describe the caller's authorization.
    #[must_use]
    pub fn auth_summary(&self, ctx: &AuthContext, presented_key: Option<&str>) -> AuthSummary {
        AuthSummary {
            user: (!ctx.is_anonymous()).then(|| ctx.identity().to_owned()),
            admin: self.authorizer.is_admin(ctx),
            authorization: RoleSummary {
                roles: ctx.roles().to_vec(),
            },
            auth_key_match: presented_key.map(|k| self.authorizer.verify_key(ctx, Some(k))),
        }
    }

    async fn external<T>(
        &self,
        operation: &str,
        call: impl Future<Output = ChefResult<T>>,
    ) -> GatewayResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| {
                if !matches!(e, ChefError::NotFound { .. }) {
                    warn!(operation, error = %e, "Chef call failed");
                }
                e.into()
            }),
            Err(_) => {
                warn!(operation, timeout = ?self.timeout, "Chef call timed out");
                Err(GatewayError::ExternalTimeout {
                    operation: operation.to_owned(),
                })
            },
        }
    }

    async fn with_ledger<T, F>(&self, op: F) -> GatewayResult<T>
    where
        F: FnOnce(&Ledger) -> LedgerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || op(&ledger))
            .await
            .map_err(|e| GatewayError::Internal(format!("ledger task failed: {e}")))?
            .map_err(GatewayError::from)
    }
}

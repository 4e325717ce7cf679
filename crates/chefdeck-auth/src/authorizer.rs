//! Authorization decisions for node mutations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chefdeck_ledger::Ledger;

use crate::context::{AuthContext, AuthSource};
use crate::error::{AuthError, AuthResult};
use crate::key;

/// What to do when a node's run-list is empty.
///
/// `Allow` keeps the historical behavior: any caller may delete a node with
/// no run-list, including a node whose run-list lookup came back empty.
/// `Deny` closes that path so only admins and creators can delete such nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyRunListPolicy {
    /// An empty run-list authorizes every caller.
    #[default]
    Allow,
    /// An empty run-list authorizes nobody.
    Deny,
}

/// Why a delete was allowed or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The caller holds the admin role.
    Admin,
    /// The caller created the ledger record.
    Creator,
    /// One of the caller's roles appears in the node's run-list.
    RoleAdmin,
    /// The run-list was empty and the policy allows that.
    EmptyRunList,
    /// No rule matched.
    Denied,
}

impl Decision {
    /// Whether the operation may proceed.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Denied)
    }

    /// Short label for logs and responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Creator => "creator",
            Self::RoleAdmin => "role_admin",
            Self::EmptyRunList => "empty_run_list",
            Self::Denied => "denied",
        }
    }
}

/// Answers who may mutate which node.
///
/// Reads the ledger for creator checks and the authorization source for
/// role resolution. Holds no per-request state.
#[derive(Debug, Clone)]
pub struct Authorizer {
    ledger: Arc<Ledger>,
    source: AuthSource,
    empty_run_list: EmptyRunListPolicy,
}

impl Authorizer {
    /// Create an authorizer with the default (allow) empty run-list policy.
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, source: AuthSource) -> Self {
        Self {
            ledger,
            source,
            empty_run_list: EmptyRunListPolicy::default(),
        }
    }

    /// Set the empty run-list policy.
    #[must_use]
    pub fn with_empty_run_list_policy(mut self, policy: EmptyRunListPolicy) -> Self {
        self.empty_run_list = policy;
        self
    }

    /// The configured empty run-list policy.
    #[must_use]
    pub fn empty_run_list_policy(&self) -> EmptyRunListPolicy {
        self.empty_run_list
    }

    /// Resolve the caller's roles. Unknown callers and an unreadable
    /// authorization document both give an empty role set.
    #[must_use]
    pub fn resolve(&self, identity: &str) -> AuthContext {
        self.source.resolve(identity)
    }

    /// Whether the caller holds the admin role.
    #[must_use]
    pub fn is_admin(&self, ctx: &AuthContext) -> bool {
        ctx.is_admin()
    }

    /// Whether the caller created the ledger record for `name`.
    ///
    /// `false` when no record exists.
    #[must_use]
    pub fn is_creator(&self, ctx: &AuthContext, name: &str) -> bool {
        if ctx.is_anonymous() {
            return false;
        }
        self.ledger
            .find(name)
            .is_some_and(|r| r.is_created_by(ctx.identity()))
    }

    /// Whether any caller role appears in `run_list`, or the run-list is
    /// empty.
    ///
    /// A role matches a token when it occurs in it as a case-insensitive
    /// substring, so `webserver` matches `role[webserver]`. An empty
    /// run-list returns `true`; [`authorize_delete`](Self::authorize_delete)
    /// applies the configured policy on top of that.
    #[must_use]
    pub fn is_role_admin(&self, ctx: &AuthContext, run_list: &[String]) -> bool {
        run_list.is_empty() || role_matches(ctx, run_list)
    }

    /// Check a presented key against the caller's stored digest.
    #[must_use]
    pub fn verify_key(&self, ctx: &AuthContext, presented: Option<&str>) -> bool {
        key::verify_key(ctx.auth_key(), presented)
    }

    /// Require a presented key that matches the caller's stored digest.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKey`] if the key is missing or wrong.
    pub fn require_key(&self, ctx: &AuthContext, presented: Option<&str>) -> AuthResult<()> {
        if self.verify_key(ctx, presented) {
            return Ok(());
        }
        warn!(identity = ctx.identity(), "auth key rejected");
        Err(AuthError::InvalidKey {
            identity: ctx.identity().to_owned(),
        })
    }

    /// [`authorize_delete`](Self::authorize_delete), with a refusal as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Denied`] when no rule allows the delete.
    pub fn check_delete(
        &self,
        ctx: &AuthContext,
        name: &str,
        run_list: &[String],
    ) -> AuthResult<Decision> {
        let decision = self.authorize_delete(ctx, name, run_list);
        if decision.is_allowed() {
            return Ok(decision);
        }
        warn!(node = name, identity = ctx.identity(), "delete denied");
        Err(AuthError::Denied {
            identity: ctx.identity().to_owned(),
            operation: "delete",
            node: name.to_owned(),
        })
    }

    /// Decide whether the caller may delete `name`, whose current external
    /// run-list is `run_list`.
    #[must_use]
    pub fn authorize_delete(&self, ctx: &AuthContext, name: &str, run_list: &[String]) -> Decision {
        let decision = if self.is_admin(ctx) {
            Decision::Admin
        } else if self.is_creator(ctx, name) {
            Decision::Creator
        } else if run_list.is_empty() {
            match self.empty_run_list {
                EmptyRunListPolicy::Allow => {
                    warn!(
                        node = name,
                        identity = ctx.identity(),
                        "granting delete on empty run-list"
                    );
                    Decision::EmptyRunList
                },
                EmptyRunListPolicy::Deny => Decision::Denied,
            }
        } else if role_matches(ctx, run_list) {
            Decision::RoleAdmin
        } else {
            Decision::Denied
        };

        debug!(
            node = name,
            identity = ctx.identity(),
            decision = decision.as_str(),
            "delete authorization evaluated"
        );
        decision
    }
}

fn role_matches(ctx: &AuthContext, run_list: &[String]) -> bool {
    ctx.roles().iter().any(|role| {
        let role = role.to_ascii_lowercase();
        run_list
            .iter()
            .any(|entry| entry.to_ascii_lowercase().contains(&role))
    })
}

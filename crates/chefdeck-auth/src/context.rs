//! Per-request caller context and the authorization document it is
//! resolved from.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Role name that grants every permission.
pub const ADMIN_ROLE: &str = "admin";

/// One identity's entry in the authorization document.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    /// Roles held by the identity.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Hex-encoded SHA-512 digest of the identity's key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
}

impl std::fmt::Debug for AuthRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRecord")
            .field("roles", &self.roles)
            .field("has_auth_key", &self.auth_key.is_some())
            .finish()
    }
}

/// Identity → authorization mapping, as stored on disk.
pub type AuthDocument = HashMap<String, AuthRecord>;

/// Where the authorization document comes from.
///
/// The file variant is re-read on every resolution so edits take effect
/// without a restart.
#[derive(Debug, Clone)]
pub enum AuthSource {
    /// A JSON document on disk.
    File(PathBuf),
    /// A fixed mapping.
    Static(AuthDocument),
}

impl AuthSource {
    /// Load the current mapping. A missing or malformed file yields an empty
    /// mapping.
    #[must_use]
    pub fn load(&self) -> AuthDocument {
        match self {
            Self::File(path) => chefdeck_store::read_document(Some(path)),
            Self::Static(doc) => doc.clone(),
        }
    }

    /// Resolve `identity` against the current mapping.
    ///
    /// An exact key match wins. Otherwise the ASCII case-insensitive match
    /// with the lexicographically smallest key is used, with a warning when
    /// more than one key matches. Unknown identities get an empty role set.
    #[must_use]
    pub fn resolve(&self, identity: &str) -> AuthContext {
        let identity = identity.trim();
        if identity.is_empty() {
            return AuthContext::anonymous();
        }

        let mut doc = self.load();
        let record = doc.remove(identity).or_else(|| fold_match(doc, identity));

        match record {
            Some(record) => AuthContext::new(identity, record.roles, record.auth_key),
            None => {
                debug!(identity, "identity not in authorization document");
                AuthContext::new(identity, Vec::new(), None)
            },
        }
    }
}

fn fold_match(doc: AuthDocument, identity: &str) -> Option<AuthRecord> {
    let mut matches: Vec<(String, AuthRecord)> = doc
        .into_iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(identity))
        .collect();
    matches.sort_by(|(a, _), (b, _)| a.cmp(b));
    if matches.len() > 1 {
        let keys: Vec<&str> = matches.iter().map(|(k, _)| k.as_str()).collect();
        warn!(identity, ?keys, "ambiguous identity in authorization document, using the first key");
    }
    matches.into_iter().next().map(|(_, record)| record)
}

impl Default for AuthSource {
    fn default() -> Self {
        Self::Static(AuthDocument::new())
    }
}

/// The resolved identity and role set for one request.
///
/// Built once per request and passed down explicitly; never stored in
/// shared state.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    identity: String,
    roles: Vec<String>,
    auth_key: Option<String>,
}

impl AuthContext {
    /// Build a context. Duplicate and blank roles are dropped.
    #[must_use]
    pub fn new(identity: impl Into<String>, roles: Vec<String>, auth_key: Option<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(roles.len());
        for role in roles {
            let role = role.trim();
            if !role.is_empty() && !unique.iter().any(|r| r.eq_ignore_ascii_case(role)) {
                unique.push(role.to_owned());
            }
        }
        Self {
            identity: identity.into(),
            roles: unique,
            auth_key,
        }
    }

    /// A context with no identity and no roles.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The caller identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The caller's roles.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Stored key digest, if the identity has one.
    #[must_use]
    pub fn auth_key(&self) -> Option<&str> {
        self.auth_key.as_deref()
    }

    /// Whether the caller has no identity.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.identity.is_empty()
    }

    /// Whether the caller holds `role`, ignoring case.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Whether the caller holds the `admin` role in any casing.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("identity", &self.identity)
            .field("roles", &self.roles)
            .field("has_auth_key", &self.auth_key.is_some())
            .finish()
    }
}

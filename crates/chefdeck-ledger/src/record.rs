//! Node records and name folding.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of audit entries kept per record.
pub const MAX_AUDIT_ENTRIES: usize = 5;

/// ASCII case-insensitive name equality used for every ledger lookup.
///
/// Only `A-Z` fold; non-ASCII letters compare exactly.
#[must_use]
pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Sort key for a node name, folded to ASCII lowercase.
#[must_use]
pub fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// One node known to the ledger.
///
/// `created` and `creator` are fixed at first insertion. `last_modified`
/// holds `"<timestamp> - <actor>"` strings, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Display name, with the casing of the first insertion.
    pub name: String,
    /// When the record was first created.
    pub created: DateTime<Utc>,
    /// Identity that first created the record.
    pub creator: String,
    /// Classification used to find the role that manages this node.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// Audit trail, newest first, at most [`MAX_AUDIT_ENTRIES`] long.
    #[serde(default, deserialize_with = "lenient_audit")]
    pub last_modified: Vec<String>,
}

impl NodeRecord {
    /// Create a fresh record with an empty audit trail.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        creator: impl Into<String>,
        node_type: Option<String>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            created,
            creator: creator.into(),
            node_type,
            last_modified: Vec::new(),
        }
    }

    /// Whether this record is identified by `name`.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        same_name(&self.name, name)
    }

    /// Whether `identity` created this record.
    #[must_use]
    pub fn is_created_by(&self, identity: &str) -> bool {
        self.creator.eq_ignore_ascii_case(identity)
    }

    /// Prepend an audit entry for `actor` at `at`, dropping the oldest
    /// entries beyond the cap.
    pub fn touch(&mut self, actor: &str, at: DateTime<Utc>) {
        self.last_modified.insert(0, audit_entry(actor, at));
        self.last_modified.truncate(MAX_AUDIT_ENTRIES);
    }
}

/// Format an audit entry.
#[must_use]
pub fn audit_entry(actor: &str, at: DateTime<Utc>) -> String {
    format!(
        "{} - {actor}",
        at.to_rfc3339_opts(SecondsFormat::Secs, false)
    )
}

/// Accept a missing, `null`, or non-array `last_modified` as an empty trail.
///
/// Hand-edited files sometimes carry a scalar here; the trail restarts
/// rather than rejecting the whole record.
fn lenient_audit<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    })
}

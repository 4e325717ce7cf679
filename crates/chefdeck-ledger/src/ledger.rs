//! The node-state ledger.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::record::{NodeRecord, name_key};

/// In-memory collection of [`NodeRecord`]s backed by a JSON document.
///
/// A single mutex guards the full read-modify-write cycle of every mutation.
/// Mutations are applied to a working copy, written to disk, and only then
/// committed to memory, so a failed write leaves both copies as they were.
pub struct Ledger {
    path: Option<PathBuf>,
    records: Mutex<Vec<NodeRecord>>,
}

impl Ledger {
    /// Create a ledger that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Open the ledger stored at `path`.
    ///
    /// A missing file, malformed JSON, or a top-level value that is not an
    /// array loads as an empty ledger. Array entries that do not form a
    /// record (no `name`, no `creator`, bad `created`) are skipped and logged.
    /// Loaded records are sorted and de-duplicated by name, later entries
    /// winning, so each name maps to exactly one record.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut records = load_records(&path);
        normalize(&mut records);
        info!(path = %path.display(), count = records.len(), "ledger loaded");
        Self {
            path: Some(path),
            records: Mutex::new(records),
        }
    }

    /// Backing document path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Case-insensitive lookup by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<NodeRecord> {
        self.lock().iter().find(|r| r.is_named(name)).cloned()
    }

    /// Whether a record exists for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lock().iter().any(|r| r.is_named(name))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the ledger has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All records, sorted case-insensitively by name.
    #[must_use]
    pub fn all(&self) -> Vec<NodeRecord> {
        let mut records = self.lock().clone();
        records.sort_by_cached_key(|r| name_key(&r.name));
        records
    }

    /// Names of all records, in [`all`](Self::all) order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.all().into_iter().map(|r| r.name).collect()
    }

    /// Create or touch the record for `name`.
    ///
    /// An existing record gets an audit entry for `creator` and, if
    /// `node_type` is given, a new type. Its name, `created`, and `creator`
    /// are kept. A missing record is created with an empty audit trail.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Invalid`] for an empty name or creator and
    /// [`LedgerError::Persistence`] if the write fails.
    pub fn upsert(
        &self,
        name: &str,
        creator: &str,
        node_type: Option<&str>,
    ) -> LedgerResult<NodeRecord> {
        self.upsert_at(name, creator, node_type, Utc::now())
    }

    pub(crate) fn upsert_at(
        &self,
        name: &str,
        creator: &str,
        node_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> LedgerResult<NodeRecord> {
        let name = name.trim();
        let creator = creator.trim();
        if name.is_empty() {
            return Err(LedgerError::Invalid {
                field: "name",
                message: "node name must not be empty".to_owned(),
            });
        }
        if creator.is_empty() {
            return Err(LedgerError::Invalid {
                field: "creator",
                message: "acting user must not be empty".to_owned(),
            });
        }
        let node_type = node_type.map(str::trim).filter(|t| !t.is_empty());

        let mut records = self.lock();
        let mut next = records.clone();

        let record = if let Some(existing) = next.iter_mut().find(|r| r.is_named(name)) {
            existing.touch(creator, now);
            if let Some(t) = node_type {
                existing.node_type = Some(t.to_owned());
            }
            info!(node = %existing.name, actor = creator, "ledger record updated");
            existing.clone()
        } else {
            let record = NodeRecord::new(name, creator, node_type.map(str::to_owned), now);
            info!(node = name, actor = creator, "ledger record created");
            next.push(record.clone());
            record
        };

        self.commit(&mut records, next)?;
        Ok(record)
    }

    /// Remove and return the record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] if no record matches, leaving the
    /// ledger untouched, or [`LedgerError::Persistence`] if the write fails.
    pub fn delete(&self, name: &str) -> LedgerResult<NodeRecord> {
        let mut records = self.lock();
        let Some(index) = records.iter().position(|r| r.is_named(name)) else {
            return Err(LedgerError::NotFound {
                name: name.to_owned(),
            });
        };

        let mut next = records.clone();
        let removed = next.remove(index);
        self.commit(&mut records, next)?;

        info!(node = %removed.name, "ledger record deleted");
        Ok(removed)
    }

    /// Sort, de-duplicate, and write the full ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Persistence`] if the write fails.
    pub fn persist(&self) -> LedgerResult<()> {
        let mut records = self.lock();
        let next = records.clone();
        self.commit(&mut records, next)
    }

    /// Normalize `next`, write it, and replace the in-memory records.
    fn commit(
        &self,
        records: &mut MutexGuard<'_, Vec<NodeRecord>>,
        mut next: Vec<NodeRecord>,
    ) -> LedgerResult<()> {
        normalize(&mut next);
        if let Err(e) = chefdeck_store::write_document(self.path.as_deref(), &next) {
            tracing::error!(error = %e, "ledger write failed, keeping previous state");
            return Err(e.into());
        }
        **records = next;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NodeRecord>> {
        // Mutations only replace the vector after a successful write, so the
        // data behind a poisoned lock is still consistent.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("path", &self.path)
            .field("records", &self.len())
            .finish()
    }
}

/// Sort by folded name and keep the last record of each equal-name run.
fn normalize(records: &mut Vec<NodeRecord>) {
    records.sort_by_cached_key(|r| name_key(&r.name));

    let mut deduped: Vec<NodeRecord> = Vec::with_capacity(records.len());
    for record in records.drain(..) {
        match deduped.last_mut() {
            Some(last) if last.is_named(&record.name) => {
                warn!(node = %record.name, "duplicate ledger record, keeping the later entry");
                *last = record;
            },
            _ => deduped.push(record),
        }
    }
    *records = deduped;
}

fn load_records(path: &Path) -> Vec<NodeRecord> {
    let items = match chefdeck_store::read_value(Some(path)) {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        other => {
            warn!(
                path = %path.display(),
                kind = value_kind(&other),
                "ledger document is not an array, starting empty"
            );
            return Vec::new();
        },
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<NodeRecord>(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(path = %path.display(), index, error = %e, "skipping malformed ledger entry");
            },
        }
    }
    debug!(count = records.len(), "ledger entries parsed");
    records
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

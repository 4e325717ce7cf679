//! Document read and write operations.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::lock;

/// Maximum document size accepted on read (16 MiB).
///
/// Larger files are treated as malformed.
pub const MAX_DOCUMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Treat `None` and the empty path alike.
fn present(path: Option<&Path>) -> Option<&Path> {
    path.filter(|p| !p.as_os_str().is_empty())
}

/// Read the raw text of a document, logging why it was skipped if it can't
/// be used.
fn read_text(path: &Path) -> Option<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "document not found, using default");
            return None;
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "document unreadable, using default");
            return None;
        },
    };

    if content.len() as u64 > MAX_DOCUMENT_SIZE {
        warn!(
            path = %path.display(),
            size = content.len(),
            limit = MAX_DOCUMENT_SIZE,
            "document exceeds size limit, using default"
        );
        return None;
    }

    Some(content)
}

/// Read a document in free-form mode.
///
/// Maps keep their string keys exactly as written. Returns
/// [`Value::Null`] if the path is absent, the file is missing or
/// unreadable, or the contents are not valid JSON.
#[must_use]
pub fn read_value(path: Option<&Path>) -> Value {
    let Some(path) = present(path) else {
        return Value::Null;
    };
    let Some(content) = read_text(path) else {
        return Value::Null;
    };

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "discarding malformed JSON document");
            Value::Null
        },
    }
}

/// Read a document in typed mode.
///
/// Document keys bind to the fields of `T`. Returns `T::default()` on any
/// failure, including a document whose shape does not match `T`.
#[must_use]
pub fn read_document<T>(path: Option<&Path>) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(path) = present(path) else {
        return T::default();
    };
    let Some(content) = read_text(path) else {
        return T::default();
    };

    match serde_json::from_str(&content) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "discarding malformed JSON document");
            T::default()
        },
    }
}

/// Write a JSON value as a pretty-printed document.
///
/// No-op if `path` is absent or `doc` is `null`.
///
/// # Errors
///
/// Returns a [`StoreError`] if the directory, lock, temp file, or rename
/// fails. The previous document is left intact in every failure case.
pub fn write_value(path: Option<&Path>, doc: &Value) -> StoreResult<()> {
    let Some(path) = present(path) else {
        return Ok(());
    };
    if doc.is_null() {
        return Ok(());
    }

    let body = serde_json::to_string_pretty(doc).map_err(|e| StoreError::Serialization {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    write_atomic(path, body.as_bytes())
}

/// Serialize `doc` and write it as a pretty-printed document.
///
/// No-op if `path` is absent or `doc` serializes to `null`.
///
/// # Errors
///
/// Returns a [`StoreError`] if serialization or the write fails.
pub fn write_document<T>(path: Option<&Path>, doc: &T) -> StoreResult<()>
where
    T: Serialize + ?Sized,
{
    let Some(target) = present(path) else {
        return Ok(());
    };
    let value = serde_json::to_value(doc).map_err(|e| StoreError::Serialization {
        path: target.display().to_string(),
        message: e.to_string(),
    })?;
    write_value(Some(target), &value)
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let _guard = lock::acquire(path)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    debug!(path = %path.display(), bytes = bytes.len(), "document written");
    Ok(())
}

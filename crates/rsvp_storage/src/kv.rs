#![forbid(unsafe_code)]

//! Key-value store capability.
//!
//! Backends guarantee per-key atomic `get`/`put`/`delete` and a prefix-scoped,
//! cursor-paginated `list`. There are no cross-key transactions: a listing that
//! runs while writes land may or may not observe them.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsvp_kernel_contracts::ContractViolation;
use thiserror::Error;

/// Largest page a single `list` call returns.
pub const KV_LIST_LIMIT_MAX: usize = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store backend `{backend}` failed: {reason}")]
    Backend {
        backend: &'static str,
        reason: String,
    },
    #[error("list cursor is not valid for prefix `{prefix}`")]
    InvalidCursor { prefix: String },
    #[error("journal io failure at {}: {source}", path.display())]
    JournalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("journal corrupt at {} line {line}: {reason}", path.display())]
    JournalCorrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("record rejected: {0}")]
    ContractViolation(#[from] ContractViolation),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvListPage {
    pub keys: Vec<String>,
    pub list_complete: bool,
    pub cursor: Option<String>,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Keys starting with `prefix`, in key order, resuming after `cursor`.
    /// `cursor` is `Some` exactly when `list_complete` is false.
    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<KvListPage, StorageError>;
}

pub(crate) fn encode_cursor(last_key: &str) -> String {
    URL_SAFE_NO_PAD.encode(last_key.as_bytes())
}

pub(crate) fn decode_cursor(prefix: &str, cursor: &str) -> Result<String, StorageError> {
    let invalid = || StorageError::InvalidCursor {
        prefix: prefix.to_string(),
    };
    let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let key = String::from_utf8(bytes).map_err(|_| invalid())?;
    if !key.starts_with(prefix) {
        return Err(invalid());
    }
    Ok(key)
}

/// Shared page walk over an ordered map, used by the in-process backends.
pub(crate) fn list_ordered_page(
    entries: &BTreeMap<String, String>,
    prefix: &str,
    cursor: Option<&str>,
    limit: usize,
) -> Result<KvListPage, StorageError> {
    let limit = limit.clamp(1, KV_LIST_LIMIT_MAX);
    let start = match cursor {
        Some(cursor) => Bound::Excluded(decode_cursor(prefix, cursor)?),
        None => Bound::Included(prefix.to_string()),
    };

    let mut keys = Vec::new();
    let mut more = false;
    for key in entries
        .range::<String, _>((start, Bound::Unbounded))
        .map(|(k, _)| k)
    {
        if !key.starts_with(prefix) {
            break;
        }
        if keys.len() == limit {
            more = true;
            break;
        }
        keys.push(key.clone());
    }

    let cursor = if more {
        keys.last().map(|k| encode_cursor(k))
    } else {
        None
    };
    Ok(KvListPage {
        keys,
        list_complete: !more,
        cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(keys: &[&str]) -> BTreeMap<String, String> {
        keys.iter()
            .map(|k| (k.to_string(), "{}".to_string()))
            .collect()
    }

    #[test]
    fn at_kv_01_prefix_scan_stays_inside_namespace() {
        let map = entries(&["aaa", "rsvp:1", "rsvp:2", "rsvq:0", "zzz"]);
        let page = list_ordered_page(&map, "rsvp:", None, 10).unwrap();
        assert_eq!(page.keys, vec!["rsvp:1", "rsvp:2"]);
        assert!(page.list_complete);
        assert_eq!(page.cursor, None);
    }

    #[test]
    fn at_kv_02_cursor_resumes_after_last_key() {
        let map = entries(&["rsvp:1", "rsvp:2", "rsvp:3"]);
        let first = list_ordered_page(&map, "rsvp:", None, 2).unwrap();
        assert_eq!(first.keys, vec!["rsvp:1", "rsvp:2"]);
        assert!(!first.list_complete);

        let second = list_ordered_page(&map, "rsvp:", first.cursor.as_deref(), 2).unwrap();
        assert_eq!(second.keys, vec!["rsvp:3"]);
        assert!(second.list_complete);
        assert_eq!(second.cursor, None);
    }

    #[test]
    fn at_kv_03_exact_page_boundary_reports_complete() {
        let map = entries(&["rsvp:1", "rsvp:2"]);
        let page = list_ordered_page(&map, "rsvp:", None, 2).unwrap();
        assert_eq!(page.keys.len(), 2);
        assert!(page.list_complete);
    }

    #[test]
    fn at_kv_04_foreign_or_garbage_cursor_rejected() {
        let map = entries(&["rsvp:1"]);
        let foreign = encode_cursor("other:1");
        assert!(matches!(
            list_ordered_page(&map, "rsvp:", Some(&foreign), 10),
            Err(StorageError::InvalidCursor { .. })
        ));
        assert!(matches!(
            list_ordered_page(&map, "rsvp:", Some("!!not base64!!"), 10),
            Err(StorageError::InvalidCursor { .. })
        ));
    }
}

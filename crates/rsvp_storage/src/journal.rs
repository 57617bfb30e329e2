#![forbid(unsafe_code)]

//! Durable single-process store: an in-memory map fronted by an append-only
//! JSON-lines journal of `put`/`delete` operations, replayed on open.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::kv::{list_ordered_page, KvListPage, KvStore, StorageError};

const JOURNAL_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalOp {
    Put { key: String, value: String },
    Delete { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct JournalEntry {
    schema_version: u32,
    #[serde(flatten)]
    op: JournalOp,
}

impl JournalEntry {
    fn v1(op: JournalOp) -> Self {
        Self {
            schema_version: JOURNAL_SCHEMA_VERSION,
            op,
        }
    }
}

#[derive(Debug)]
pub struct JournalKvStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    // Held across append + map update so journal order matches visible order.
    journal: Mutex<File>,
}

impl JournalKvStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::JournalIo {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let replay = replay_journal(&path).await?;
        if let Some(committed_len) = replay.torn_tail_at {
            truncate_journal(&path, committed_len).await?;
        }
        info!(
            path = %path.display(),
            keys = replay.entries.len(),
            "journal store replayed"
        );

        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| StorageError::JournalIo {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            entries: RwLock::new(replay.entries),
            journal: Mutex::new(journal),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// On a failed write the file is cut back to its previous length so the next
    /// append starts on a line boundary.
    async fn append(&self, file: &mut File, op: JournalOp) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(&JournalEntry::v1(op))?;
        line.push('\n');
        let io_err = |source| StorageError::JournalIo {
            path: self.path.clone(),
            source,
        };
        let committed_len = file.metadata().await.map_err(io_err)?.len();
        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.sync_data().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            if let Err(rollback) = file.set_len(committed_len).await {
                error!(
                    path = %self.path.display(),
                    "journal rollback after failed append failed: {rollback}"
                );
            }
            return Err(io_err(err));
        }
        Ok(())
    }
}

struct JournalReplay {
    entries: BTreeMap<String, String>,
    /// Byte length of the committed prefix when the file ends in a partial line.
    torn_tail_at: Option<u64>,
}

async fn truncate_journal(path: &Path, committed_len: u64) -> Result<(), StorageError> {
    let io_err = |source| StorageError::JournalIo {
        path: path.to_path_buf(),
        source,
    };
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(io_err)?;
    file.set_len(committed_len).await.map_err(io_err)?;
    file.sync_data().await.map_err(io_err)?;
    warn!(
        path = %path.display(),
        committed_len,
        "truncated partial final journal line"
    );
    Ok(())
}

async fn replay_journal(path: &Path) -> Result<JournalReplay, StorageError> {
    let mut entries = BTreeMap::new();
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(JournalReplay {
                entries,
                torn_tail_at: None,
            })
        }
        Err(source) => {
            return Err(StorageError::JournalIo {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    // An append that never reached its newline was never acknowledged.
    let (committed, torn_tail_at) = if raw.is_empty() || raw.ends_with('\n') {
        (raw.as_str(), None)
    } else {
        let cut = raw.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
        (&raw[..cut], Some(cut as u64))
    };

    for (idx, line) in committed.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let entry: JournalEntry =
            serde_json::from_str(line).map_err(|err| StorageError::JournalCorrupt {
                path: path.to_path_buf(),
                line: line_no,
                reason: err.to_string(),
            })?;
        if entry.schema_version != JOURNAL_SCHEMA_VERSION {
            return Err(StorageError::JournalCorrupt {
                path: path.to_path_buf(),
                line: line_no,
                reason: format!("unsupported schema_version={}", entry.schema_version),
            });
        }
        match entry.op {
            JournalOp::Put { key, value } => {
                entries.insert(key, value);
            }
            JournalOp::Delete { key } => {
                entries.remove(&key);
            }
        }
    }
    Ok(JournalReplay {
        entries,
        torn_tail_at,
    })
}

#[async_trait]
impl KvStore for JournalKvStore {
    fn backend_tag(&self) -> &'static str {
        "journal"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut journal = self.journal.lock().await;
        self.append(
            &mut journal,
            JournalOp::Put {
                key: key.to_string(),
                value: value.to_string(),
            },
        )
        .await?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut journal = self.journal.lock().await;
        if !self.entries.read().await.contains_key(key) {
            return Ok(());
        }
        self.append(
            &mut journal,
            JournalOp::Delete {
                key: key.to_string(),
            },
        )
        .await?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<KvListPage, StorageError> {
        let entries = self.entries.read().await;
        list_ordered_page(&entries, prefix, cursor, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_journal_01_entry_line_shape() {
        let line = serde_json::to_string(&JournalEntry::v1(JournalOp::Put {
            key: "rsvp:a".to_string(),
            value: "{}".to_string(),
        }))
        .unwrap();
        let shape: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(shape["schema_version"], 1);
        assert_eq!(shape["op"], "put");
        assert_eq!(shape["key"], "rsvp:a");
        assert!(!line.contains('\n'));
        let back: JournalEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(
            back.op,
            JournalOp::Put {
                key: "rsvp:a".to_string(),
                value: "{}".to_string(),
            }
        );
    }
}

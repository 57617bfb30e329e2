#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rsvp_kernel_contracts::common::clip_text;
use rsvp_kernel_contracts::rsvp::{
    Companion, RsvpId, RsvpRecord, ADULTS_MAX, COMPANIONS_MAX, COMPANION_COUNT_MAX,
    COMPANION_NAME_MAX_CHARS, CONTACT_PHONE_MAX_CHARS, GUEST_NAME_MAX_CHARS, NOTE_MAX_CHARS,
    RSVP_KEY_PREFIX, SOURCE_IP_MAX_CHARS, USER_AGENT_MAX_CHARS,
};
use rsvp_kernel_contracts::Validate;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::kv::{KvStore, StorageError, KV_LIST_LIMIT_MAX};

/// One store page of decoded records, in store key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsvpPage {
    pub items: Vec<RsvpRecord>,
    pub list_complete: bool,
    pub cursor: Option<String>,
}

/// A stored value that cannot be mapped to a record. Skipped during listings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("corrupt rsvp row `{key}`: {reason}")]
pub struct ParseCorruption {
    pub key: String,
    pub reason: String,
}

/// Typed access to RSVP rows under the `rsvp:` namespace.
#[derive(Clone)]
pub struct RsvpRepo {
    store: Arc<dyn KvStore>,
    page_size: usize,
}

impl RsvpRepo {
    pub fn new(store: Arc<dyn KvStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.clamp(1, KV_LIST_LIMIT_MAX),
        }
    }

    pub fn backend_tag(&self) -> &'static str {
        self.store.backend_tag()
    }

    /// Single put under `rsvp:<id>`. Ids are never reused, so this never overwrites.
    pub async fn insert_rsvp_row(&self, record: &RsvpRecord) -> Result<(), StorageError> {
        record.validate()?;
        let value = serde_json::to_string(record)?;
        self.store.put(&record.storage_key(), &value).await?;
        debug!(id = %record.id, "rsvp row written");
        Ok(())
    }

    pub async fn rsvp_page(&self, cursor: Option<&str>) -> Result<RsvpPage, StorageError> {
        let page = self
            .store
            .list(RSVP_KEY_PREFIX, cursor, self.page_size)
            .await?;
        let items = self.load_rows(page.keys).await?;
        Ok(RsvpPage {
            items,
            list_complete: page.list_complete,
            cursor: page.cursor,
        })
    }

    /// Every decodable row, newest `createdAt` first. Corrupt rows are skipped.
    pub async fn list_rsvp_rows(&self) -> Result<Vec<RsvpRecord>, StorageError> {
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.rsvp_page(cursor.as_deref()).await?;
            rows.extend(page.items);
            match page.cursor {
                Some(next) if !page.list_complete => cursor = Some(next),
                _ => break,
            }
        }
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    /// All keys under the namespace at the time of the walk.
    pub async fn rsvp_key_snapshot(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .store
                .list(RSVP_KEY_PREFIX, cursor.as_deref(), self.page_size)
                .await?;
            keys.extend(page.keys);
            match page.cursor {
                Some(next) if !page.list_complete => cursor = Some(next),
                _ => break,
            }
        }
        Ok(keys)
    }

    /// Deletes every key in the namespace snapshot. Submissions landing after the
    /// snapshot survive.
    pub async fn clear_rsvp_rows(&self) -> Result<u64, StorageError> {
        let keys = self.rsvp_key_snapshot().await?;
        let mut cleared = 0u64;
        for key in &keys {
            if let Err(err) = self.store.delete(key).await {
                warn!(cleared, total = keys.len(), "rsvp clear aborted: {err}");
                return Err(err);
            }
            cleared += 1;
        }
        info!(cleared, "rsvp rows cleared");
        Ok(cleared)
    }

    async fn load_rows(&self, keys: Vec<String>) -> Result<Vec<RsvpRecord>, StorageError> {
        let mut slots: Vec<Option<RsvpRecord>> = vec![None; keys.len()];
        let mut fetches = JoinSet::new();
        for (idx, key) in keys.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            fetches.spawn(async move {
                let value = store.get(&key).await;
                (idx, key, value)
            });
        }

        while let Some(joined) = fetches.join_next().await {
            let (idx, key, value) = joined.map_err(|err| StorageError::Backend {
                backend: self.store.backend_tag(),
                reason: format!("value fetch task failed: {err}"),
            })?;
            // Deleted between list and get.
            let Some(raw) = value? else {
                continue;
            };
            match decode_stored_row(&key, &raw) {
                Ok(record) => slots[idx] = Some(record),
                Err(corrupt) => warn!("skipping row: {corrupt}"),
            }
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Stable: equal timestamps keep their relative order.
pub fn sort_newest_first(rows: &mut [RsvpRecord]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Stored row as written by this service or by earlier variants
/// (`{id, ts, name, hasChildren, children}`). Earlier writers had no field bounds
/// and stored ages as arbitrary numbers, so companions are read loosely.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRsvpRow {
    id: Option<String>,
    #[serde(alias = "ts")]
    created_at: DateTime<Utc>,
    #[serde(alias = "name")]
    guest_name: String,
    attending: Option<bool>,
    adults: Option<u32>,
    #[serde(default, alias = "children")]
    companions: Value,
    companion_count: Option<u32>,
    contact_phone: Option<String>,
    note: Option<String>,
    source_ip: Option<String>,
    user_agent: Option<String>,
}

/// Named entries only, names clipped, ages coerced like intake does.
fn stored_companions(raw: &Value) -> Vec<Companion> {
    let Value::Array(items) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let name = clip_text(item.get("name")?.as_str()?, COMPANION_NAME_MAX_CHARS)?;
            let age = match item.get("age") {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            Some(Companion {
                name,
                age: Companion::age_from_number(age),
            })
        })
        .collect()
}

fn decode_stored_row(key: &str, raw: &str) -> Result<RsvpRecord, ParseCorruption> {
    let corrupt = |reason: String| ParseCorruption {
        key: key.to_string(),
        reason,
    };
    let key_id = RsvpId::from_storage_key(key)
        .ok_or_else(|| corrupt("key does not carry a valid rsvp id".to_string()))?;
    let row: StoredRsvpRow = serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;
    if let Some(stored_id) = row.id.as_deref() {
        if stored_id != key_id.as_str() {
            return Err(corrupt(format!("stored id `{stored_id}` does not match key")));
        }
    }
    let guest_name = clip_text(&row.guest_name, GUEST_NAME_MAX_CHARS)
        .ok_or_else(|| corrupt("guest name is blank".to_string()))?;

    let mut companions = stored_companions(&row.companions);
    let named = u32::try_from(companions.len()).unwrap_or(u32::MAX);
    companions.truncate(COMPANIONS_MAX);
    let companion_count = row
        .companion_count
        .unwrap_or(named)
        .max(named)
        .min(COMPANION_COUNT_MAX);

    let record = RsvpRecord {
        id: key_id,
        created_at: row.created_at,
        guest_name,
        attending: row.attending.unwrap_or(true),
        adults: row.adults.map(|a| a.min(ADULTS_MAX)),
        companions,
        companion_count,
        contact_phone: row
            .contact_phone
            .and_then(|v| clip_text(&v, CONTACT_PHONE_MAX_CHARS)),
        note: row.note.and_then(|v| clip_text(&v, NOTE_MAX_CHARS)),
        source_ip: row
            .source_ip
            .and_then(|v| clip_text(&v, SOURCE_IP_MAX_CHARS)),
        user_agent: row
            .user_agent
            .and_then(|v| clip_text(&v, USER_AGENT_MAX_CHARS)),
    };
    record.validate().map_err(|e| corrupt(e.to_string()))?;
    Ok(record)
}

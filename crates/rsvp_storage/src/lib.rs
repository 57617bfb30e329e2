#![forbid(unsafe_code)]

pub mod journal;
pub mod kv;
pub mod memory;
pub mod repo;

pub use journal::JournalKvStore;
pub use kv::{KvListPage, KvStore, StorageError, KV_LIST_LIMIT_MAX};
pub use memory::MemoryKvStore;
pub use repo::{ParseCorruption, RsvpPage, RsvpRepo};

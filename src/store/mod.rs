//! Persisted key-value collections.
//!
//! The pipeline only needs `get/all/add/update/remove` over three
//! collections:
//! - `lobby_history`: append-only rows, one per changed session, kept as
//!   JSON Lines so each tick only appends its own rows
//! - `configs`: display bindings keyed by owning scope
//! - `stalks`: presence watches keyed by destination + identity

pub mod json;
pub mod log;
pub mod memory;

use crate::data::{DisplayBinding, HistoryEntry, WatchConfig};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub use json::JsonCollection;
pub use log::JsonLinesCollection;
pub use memory::MemoryCollection;

/// Items stored in a collection expose their key
pub trait Keyed {
    fn key(&self) -> String;
}

impl Keyed for HistoryEntry {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Keyed for DisplayBinding {
    fn key(&self) -> String {
        self.scope_id.clone()
    }
}

impl Keyed for WatchConfig {
    fn key(&self) -> String {
        watch_key(&self.destination_id, &self.watched_identity_id)
    }
}

/// Key of a watch: one destination may watch several identities
pub fn watch_key(destination_id: &str, identity_id: &str) -> String {
    format!("{}:{}", destination_id, identity_id)
}

/// Abstract key-value collection
#[async_trait]
pub trait Collection<T>: Send + Sync
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<T>>;

    async fn all(&self) -> Result<Vec<T>>;

    /// Insert a new item. Keyed backends fail if the key already exists;
    /// the append-only log trusts the caller to use fresh keys.
    async fn add(&self, item: T) -> Result<()>;

    /// Insert several new items in one write where the backend allows it
    async fn add_many(&self, items: Vec<T>) -> Result<()> {
        for item in items {
            self.add(item).await?;
        }
        Ok(())
    }

    /// Replace an existing item; fails if the key is unknown
    async fn update(&self, item: T) -> Result<()>;

    /// Remove an item; returns whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;
}

/// Marker bound for types the JSON backend can persist
pub trait Storable: Keyed + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Storable for T where T: Keyed + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

pub const HISTORY_FILE: &str = "lobby_history.jsonl";
pub const BINDINGS_FILE: &str = "configs.json";
pub const WATCHES_FILE: &str = "stalks.json";

/// The collections the consumer reads and writes
#[derive(Clone)]
pub struct Stores {
    pub history: Arc<dyn Collection<HistoryEntry>>,
    pub bindings: Arc<dyn Collection<DisplayBinding>>,
    pub watches: Arc<dyn Collection<WatchConfig>>,
}

impl Stores {
    /// File-backed stores under `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            history: Arc::new(JsonLinesCollection::<HistoryEntry>::new(dir.join(HISTORY_FILE))),
            bindings: Arc::new(JsonCollection::<DisplayBinding>::new(dir.join(BINDINGS_FILE))),
            watches: Arc::new(JsonCollection::<WatchConfig>::new(dir.join(WATCHES_FILE))),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            history: Arc::new(MemoryCollection::<HistoryEntry>::default()),
            bindings: Arc::new(MemoryCollection::<DisplayBinding>::default()),
            watches: Arc::new(MemoryCollection::<WatchConfig>::default()),
        }
    }
}

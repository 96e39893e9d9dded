//! In-memory collection, used for tests and ephemeral runs.

use super::{Collection, Keyed};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct MemoryCollection<T> {
    items: Mutex<BTreeMap<String, T>>,
}

impl<T> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<T: Keyed> MemoryCollection<T> {
    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().map(|i| (i.key(), i)).collect()),
        }
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }
}

#[async_trait]
impl<T> Collection<T> for MemoryCollection<T>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn all(&self) -> Result<Vec<T>> {
        Ok(self.items.lock().await.values().cloned().collect())
    }

    async fn add(&self, item: T) -> Result<()> {
        let mut items = self.items.lock().await;
        let key = item.key();
        if items.contains_key(&key) {
            anyhow::bail!("Item {} already exists", key);
        }
        items.insert(key, item);
        Ok(())
    }

    async fn update(&self, item: T) -> Result<()> {
        let mut items = self.items.lock().await;
        match items.get_mut(&item.key()) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => anyhow::bail!("Item {} does not exist", item.key()),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.items.lock().await.remove(key).is_some())
    }
}

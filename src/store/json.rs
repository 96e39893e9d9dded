//! JSON-file collection with file locking.
//!
//! The whole collection lives in one JSON object keyed by item key. Access is
//! serialized through a `<file>.lock` sidecar: reads take a shared lock,
//! mutations an exclusive lock for the full read-modify-write, so the consumer
//! and the operator CLI can share a file. New contents go to a temporary file
//! that is renamed over the old one, so a crash mid-write leaves the previous
//! version intact.

use super::{Collection, Storable};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

pub struct JsonCollection<T> {
    path: PathBuf,
    _item: PhantomData<fn() -> T>,
}

impl<T: Storable> JsonCollection<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _item: PhantomData,
        }
    }

    async fn read(&self) -> Result<BTreeMap<String, T>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_map(&path)).await?
    }

    /// Apply `mutate` to the stored map under an exclusive lock
    async fn mutate<R, F>(&self, mutate: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut BTreeMap<String, T>) -> Result<R> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || mutate_map(&path, mutate)).await?
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Run `f` while holding the lock for `path`
pub(super) fn with_lock<R>(path: &Path, exclusive: bool, f: impl FnOnce() -> Result<R>) -> Result<R> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let lock_path = sibling(path, ".lock");
    let lock = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("Failed to open {}", lock_path.display()))?;

    if exclusive {
        lock.lock_exclusive()?;
    } else {
        lock.lock_shared()?;
    }
    let result = f();
    lock.unlock()?;
    result
}

/// Replace `path` with `contents` via a synced temporary file and rename
pub(super) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = sibling(path, ".tmp");
    let mut tmp = File::create(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    tmp.write_all(contents)?;
    tmp.sync_all()?;
    drop(tmp);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

fn load_map<T: Storable>(path: &Path) -> Result<BTreeMap<String, T>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_map<T: Storable>(path: &Path) -> Result<BTreeMap<String, T>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    with_lock(path, false, || load_map(path))
}

fn mutate_map<T, R, F>(path: &Path, mutate: F) -> Result<R>
where
    T: Storable,
    F: FnOnce(&mut BTreeMap<String, T>) -> Result<R>,
{
    with_lock(path, true, || {
        let mut map = load_map(path)?;
        let out = mutate(&mut map)?;
        write_atomic(path, serde_json::to_string_pretty(&map)?.as_bytes())?;
        Ok(out)
    })
}

#[async_trait]
impl<T: Storable> Collection<T> for JsonCollection<T> {
    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.read().await?.remove(key))
    }

    async fn all(&self) -> Result<Vec<T>> {
        Ok(self.read().await?.into_values().collect())
    }

    async fn add(&self, item: T) -> Result<()> {
        self.mutate(move |map| {
            let key = item.key();
            if map.contains_key(&key) {
                anyhow::bail!("Item {} already exists", key);
            }
            map.insert(key, item);
            Ok(())
        })
        .await
    }

    async fn update(&self, item: T) -> Result<()> {
        self.mutate(move |map| {
            let key = item.key();
            match map.get_mut(&key) {
                Some(slot) => {
                    *slot = item;
                    Ok(())
                }
                None => anyhow::bail!("Item {} does not exist", key),
            }
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.mutate(move |map| Ok(map.remove(&key).is_some())).await
    }
}

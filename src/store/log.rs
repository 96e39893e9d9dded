//! Append-only JSON Lines collection.
//!
//! One item per line. Adding items appends their lines under the exclusive
//! lock and leaves what is already on disk untouched, so a write costs as
//! much as the items it adds. A torn trailing line left by a crash is skipped
//! on read and terminated before the next append. `add` does not scan the
//! file for an existing key; callers store items with fresh keys.
//!
//! Updates and removals rewrite the whole file through a temporary file.
//! The history path never issues them.

use super::json::{with_lock, write_atomic};
use super::{Collection, Storable};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

pub struct JsonLinesCollection<T> {
    path: PathBuf,
    _item: PhantomData<fn() -> T>,
}

impl<T: Storable> JsonLinesCollection<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _item: PhantomData,
        }
    }

    async fn read(&self) -> Result<Vec<T>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_lines(&path)).await?
    }

    async fn append(&self, items: Vec<T>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_lines(&path, &items)).await?
    }

    /// Rewrite every stored item through `mutate` under the exclusive lock
    async fn rewrite<R, F>(&self, mutate: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Vec<T>) -> Result<R> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            with_lock(&path, true, || {
                let mut items = load(&path)?;
                let out = mutate(&mut items)?;
                write_atomic(&path, serialize_lines(&items)?.as_bytes())?;
                Ok(out)
            })
        })
        .await?
    }
}

fn load<T: Storable>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_lines(path, &content))
}

fn read_lines<T: Storable>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    with_lock(path, false, || load(path))
}

fn parse_lines<T: Storable>(path: &Path, content: &str) -> Vec<T> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str(line) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping unreadable line {} of {}: {}", n + 1, path.display(), e);
                None
            }
        })
        .collect()
}

fn serialize_lines<T: Storable>(items: &[T]) -> Result<String> {
    let mut out = String::new();
    for item in items {
        out.push_str(&serde_json::to_string(item)?);
        out.push('\n');
    }
    Ok(out)
}

/// Whether the last byte on disk is not a newline (a torn append)
fn ends_mid_line(file: &mut File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn append_lines<T: Storable>(path: &Path, items: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let lines = serialize_lines(items)?;

    with_lock(path, true, || {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut buf = Vec::with_capacity(lines.len() + 1);
        if ends_mid_line(&mut file)? {
            buf.push(b'\n');
        }
        buf.extend_from_slice(lines.as_bytes());
        file.write_all(&buf)?;
        file.sync_data()?;
        Ok(())
    })
}

#[async_trait]
impl<T: Storable> Collection<T> for JsonLinesCollection<T> {
    async fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.read().await?.into_iter().rev().find(|item| item.key() == key))
    }

    async fn all(&self) -> Result<Vec<T>> {
        self.read().await
    }

    async fn add(&self, item: T) -> Result<()> {
        self.append(vec![item]).await
    }

    async fn add_many(&self, items: Vec<T>) -> Result<()> {
        self.append(items).await
    }

    async fn update(&self, item: T) -> Result<()> {
        self.rewrite(move |items| {
            let key = item.key();
            match items.iter_mut().find(|i| i.key() == key) {
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
        self.rewrite(move |items| {
            let before = items.len();
            items.retain(|i| i.key() != key);
            Ok(items.len() != before)
        })
        .await
    }
}

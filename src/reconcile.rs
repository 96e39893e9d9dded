//! Reconciliation engine.
//!
//! Holds the two most recent snapshots and decides which sessions changed.
//! Only changed sessions are appended to the persisted history, so history
//! volume tracks real deltas rather than sample ticks.

use crate::data::{HistoryEntry, SessionRecord};
use crate::store::Collection;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// Sessions that are new or differ from their previous record
    pub changed: Vec<SessionRecord>,
    /// The full snapshot as ingested (deduplicated by id)
    pub all: Vec<SessionRecord>,
}

impl ReconciliationResult {
    pub fn is_unchanged(&self) -> bool {
        self.changed.is_empty()
    }
}

pub struct ReconciliationEngine {
    current: Vec<SessionRecord>,
    previous: Vec<SessionRecord>,
    history: Arc<dyn Collection<HistoryEntry>>,
}

impl ReconciliationEngine {
    pub fn new(history: Arc<dyn Collection<HistoryEntry>>) -> Self {
        Self {
            current: Vec::new(),
            previous: Vec::new(),
            history,
        }
    }

    pub fn current(&self) -> &[SessionRecord] {
        &self.current
    }

    pub fn previous(&self) -> &[SessionRecord] {
        &self.previous
    }

    /// Ingest a new snapshot.
    ///
    /// Each record is compared against the record with the same id in the
    /// snapshot ingested immediately before this one. History writes that
    /// fail are logged; they never undo the state transition.
    pub async fn ingest(&mut self, snapshot: Vec<SessionRecord>) -> ReconciliationResult {
        let snapshot = dedup_by_id(snapshot);

        self.previous = std::mem::replace(&mut self.current, snapshot);

        let known: HashMap<&str, &SessionRecord> =
            self.previous.iter().map(|s| (s.id.as_str(), s)).collect();

        let changed: Vec<SessionRecord> = self
            .current
            .iter()
            .filter(|s| known.get(s.id.as_str()).map_or(true, |old| *old != *s))
            .cloned()
            .collect();

        if !changed.is_empty() {
            tracing::info!(
                "{} of {} sessions changed",
                changed.len(),
                self.current.len()
            );
            self.persist(&changed).await;
        }

        ReconciliationResult {
            changed,
            all: self.current.clone(),
        }
    }

    async fn persist(&self, changed: &[SessionRecord]) {
        let entries: Vec<HistoryEntry> = changed.iter().cloned().map(HistoryEntry::new).collect();
        if let Err(e) = self.history.add_many(entries).await {
            tracing::warn!("Failed to record history for {} sessions: {:#}", changed.len(), e);
        }
    }
}

/// Keep the first record for each id
fn dedup_by_id(snapshot: Vec<SessionRecord>) -> Vec<SessionRecord> {
    let mut seen = HashSet::new();
    let before = snapshot.len();
    let deduped: Vec<SessionRecord> = snapshot
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect();
    if deduped.len() != before {
        tracing::debug!("Dropped {} duplicate session ids", before - deduped.len());
    }
    deduped
}

/// Newest history entry whose session name starts with `prefix`
/// (case-insensitive)
pub async fn latest_by_name_prefix(
    history: &dyn Collection<HistoryEntry>,
    prefix: &str,
) -> anyhow::Result<Option<HistoryEntry>> {
    let prefix = prefix.to_lowercase();
    let entries = history.all().await?;
    Ok(entries
        .into_iter()
        .filter(|e| e.lobby.name.to_lowercase().starts_with(&prefix))
        .max_by_key(|e| e.recorded_at))
}

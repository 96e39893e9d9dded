//! Display synchronizer.
//!
//! Keeps one live status message per (binding, version track) in step with
//! the latest snapshot. Repairs itself when the chat surface reports that a
//! message or a whole scope has gone away:
//!
//! - scope no longer resolves: the binding is removed
//! - message no longer resolves: its locator is cleared and a fresh message
//!   is created in the same pass
//!
//! Bindings are synced concurrently, and so are the tracks within a binding.
//! A failure in one never blocks the others.

pub mod render;

use crate::data::{DisplayBinding, MessageLocator, SessionRecord, VersionTrack};
use crate::store::Collection;
use crate::surface::{ChatSurface, RenderedView, SurfaceError};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;

pub use render::{render_category, MAX_BLOCKS};

/// Counters for one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub edited: usize,
    /// Messages recreated after their previous locator stopped resolving
    pub recreated: usize,
    pub removed_bindings: usize,
    pub failed: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.created += other.created;
        self.edited += other.edited;
        self.recreated += other.recreated;
        self.removed_bindings += other.removed_bindings;
        self.failed += other.failed;
    }
}

#[derive(Debug)]
enum TrackOutcome {
    Created(MessageLocator),
    Edited,
    Recreated(MessageLocator),
    /// Locator went stale and recreating failed; leave it empty for next time
    Cleared,
    Failed,
}

pub struct DisplaySynchronizer {
    surface: Arc<dyn ChatSurface>,
    bindings: Arc<dyn Collection<DisplayBinding>>,
}

impl DisplaySynchronizer {
    pub fn new(surface: Arc<dyn ChatSurface>, bindings: Arc<dyn Collection<DisplayBinding>>) -> Self {
        Self { surface, bindings }
    }

    pub async fn sync(&self, sessions: &[SessionRecord]) -> SyncReport {
        self.sync_at(sessions, Utc::now()).await
    }

    /// Sync every stored binding against `sessions`, rendering elapsed
    /// mission time relative to `now`
    pub async fn sync_at(&self, sessions: &[SessionRecord], now: DateTime<Utc>) -> SyncReport {
        let bindings = match self.bindings.all().await {
            Ok(bindings) => bindings,
            Err(e) => {
                tracing::warn!("Could not load display bindings: {:#}", e);
                return SyncReport::default();
            }
        };

        let reports = join_all(
            bindings
                .into_iter()
                .map(|binding| self.sync_binding(binding, sessions, now)),
        )
        .await;

        let mut total = SyncReport::default();
        for report in reports {
            total.absorb(report);
        }
        if total.failed > 0 || total.removed_bindings > 0 || total.recreated > 0 {
            tracing::info!("Display sync: {:?}", total);
        }
        total
    }

    async fn sync_binding(
        &self,
        mut binding: DisplayBinding,
        sessions: &[SessionRecord],
        now: DateTime<Utc>,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        match self.surface.resolve_scope(&binding.scope_id).await {
            Ok(()) => {}
            Err(SurfaceError::NotFound(reason)) => {
                tracing::info!(
                    "Scope {} is gone ({}), removing its display",
                    binding.scope_id,
                    reason
                );
                match self.bindings.remove(&binding.scope_id).await {
                    Ok(_) => report.removed_bindings += 1,
                    Err(e) => {
                        tracing::warn!("Failed to remove binding {}: {:#}", binding.scope_id, e);
                        report.failed += 1;
                    }
                }
                return report;
            }
            Err(e) => {
                tracing::warn!("Skipping display for {}: {}", binding.scope_id, e);
                report.failed += 1;
                return report;
            }
        }

        let tracks = binding.visible.categories();
        let outcomes = join_all(tracks.iter().map(|track| {
            let view = render_category(*track, sessions, now);
            self.sync_track(&binding, *track, view)
        }))
        .await;

        let mut dirty = false;
        for (track, outcome) in tracks.into_iter().zip(outcomes) {
            match outcome {
                TrackOutcome::Created(locator) => {
                    binding.rendered.insert(track, Some(locator));
                    report.created += 1;
                    dirty = true;
                }
                TrackOutcome::Edited => report.edited += 1,
                TrackOutcome::Recreated(locator) => {
                    binding.rendered.insert(track, Some(locator));
                    report.recreated += 1;
                    dirty = true;
                }
                TrackOutcome::Cleared => {
                    binding.rendered.insert(track, None);
                    report.failed += 1;
                    dirty = true;
                }
                TrackOutcome::Failed => report.failed += 1,
            }
        }

        if dirty {
            if let Err(e) = self.bindings.update(binding.clone()).await {
                tracing::warn!("Failed to persist binding {}: {:#}", binding.scope_id, e);
            }
        }

        report
    }

    async fn sync_track(
        &self,
        binding: &DisplayBinding,
        track: VersionTrack,
        view: RenderedView,
    ) -> TrackOutcome {
        let Some(locator) = binding.locator(track) else {
            return match self.surface.create_view(&binding.destination_id, &view).await {
                Ok(locator) => TrackOutcome::Created(locator),
                Err(e) => {
                    tracing::warn!(
                        "Creating {} view in {} failed: {}",
                        track.label(),
                        binding.destination_id,
                        e
                    );
                    TrackOutcome::Failed
                }
            };
        };

        match self.surface.edit_view(locator, &view).await {
            Ok(()) => TrackOutcome::Edited,
            Err(SurfaceError::NotFound(_)) => {
                tracing::info!(
                    "{} view {} was deleted, recreating",
                    track.label(),
                    locator.message_id
                );
                match self.surface.create_view(&binding.destination_id, &view).await {
                    Ok(locator) => TrackOutcome::Recreated(locator),
                    Err(e) => {
                        tracing::warn!("Recreating {} view failed: {}", track.label(), e);
                        TrackOutcome::Cleared
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Editing {} view failed: {}", track.label(), e);
                TrackOutcome::Failed
            }
        }
    }
}

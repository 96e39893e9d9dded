//! Presence sweep: join each lobby, read its members, leave.
//!
//! A sweep runs as a bounded set of tasks that the sampling loop does not
//! wait on. Starting the next tick abandons whatever is still in flight; a
//! stale sweep is dropped rather than queued behind the new one. A visit that
//! already issued its join still leaves the lobby when it is abandoned.

use crate::data::{PresenceSighting, SessionRecord};
use crate::directory::Directory;
use crate::util::send_or_log;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

pub struct PresenceSweep {
    tasks: JoinSet<()>,
    max_in_flight: usize,
}

impl PresenceSweep {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            max_in_flight: max_in_flight.max(1),
        }
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::warn!("Presence sweep task panicked: {}", e);
                }
            }
        }
    }

    /// Lobby visits still running
    pub fn in_flight(&mut self) -> usize {
        self.reap_finished();
        self.tasks.len()
    }

    /// Cancel every unfinished visit; returns how many were abandoned.
    /// Lobbies already joined are left in the background.
    pub fn abandon(&mut self) -> usize {
        let abandoned = self.in_flight();
        self.tasks.abort_all();
        self.tasks = JoinSet::new();
        abandoned
    }

    /// Start visiting every lobby in `lobbies`.
    ///
    /// At most `max_in_flight` joins run concurrently (never more than the
    /// number of lobbies). Sightings are sent to `sightings` as members are
    /// read; a failed join is logged and skipped.
    pub fn start<D: Directory>(
        &mut self,
        directory: Arc<D>,
        lobbies: &[SessionRecord],
        sightings: mpsc::Sender<PresenceSighting>,
    ) {
        if lobbies.is_empty() {
            return;
        }

        let permits = Arc::new(Semaphore::new(self.max_in_flight.min(lobbies.len())));
        tracing::debug!("Starting presence sweep over {} lobbies", lobbies.len());

        for lobby in lobbies {
            let directory = Arc::clone(&directory);
            let permits = Arc::clone(&permits);
            let sightings = sightings.clone();
            let lobby = lobby.clone();

            self.tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                visit_lobby(directory, &lobby, &sightings).await;
            });
        }
    }
}

/// Leaves a joined lobby if the visit is dropped before it left on its own
struct LeaveGuard<D: Directory> {
    directory: Arc<D>,
    lobby_id: Option<String>,
}

impl<D: Directory> LeaveGuard<D> {
    fn disarm(&mut self) {
        self.lobby_id = None;
    }
}

impl<D: Directory> Drop for LeaveGuard<D> {
    fn drop(&mut self) {
        let Some(lobby_id) = self.lobby_id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Presence sweep: no runtime to leave lobby {}", lobby_id);
            return;
        };
        let directory = Arc::clone(&self.directory);
        handle.spawn(async move {
            if let Err(e) = directory.leave(&lobby_id).await {
                tracing::warn!("Presence sweep: failed to leave abandoned lobby {}: {:#}", lobby_id, e);
            }
        });
    }
}

async fn visit_lobby<D: Directory>(
    directory: Arc<D>,
    lobby: &SessionRecord,
    sightings: &mpsc::Sender<PresenceSighting>,
) {
    // Armed before the join: an aborted join may still have reached the directory
    let mut guard = LeaveGuard {
        directory: Arc::clone(&directory),
        lobby_id: Some(lobby.id.clone()),
    };

    let members = match directory.join(&lobby.id).await {
        Ok(members) => members,
        Err(e) => {
            guard.disarm();
            tracing::warn!("Presence sweep: skipping lobby {}: {:#}", lobby.id, e);
            return;
        }
    };

    for member in members {
        let sighting = PresenceSighting {
            identity_id: member.id,
            display_name: member.name,
            session_id: lobby.id.clone(),
            session_name: lobby.name.clone(),
            scenario_name: lobby.scenario_name.clone(),
        };
        if !send_or_log(sightings, sighting, "presence sighting").await {
            break;
        }
    }

    let left = directory.leave(&lobby.id).await;
    guard.disarm();
    if let Err(e) = left {
        tracing::warn!("Presence sweep: failed to leave lobby {}: {:#}", lobby.id, e);
    }
}

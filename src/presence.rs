//! Presence notifier.
//!
//! Turns sightings into one-shot notices for every watch on the sighted
//! identity. A notice goes out only when the identity shows up somewhere new;
//! the last known session is remembered for every identity seen, watched or
//! not, so registering a watch later never fires for a stale sighting.

use crate::data::{PresenceSighting, WatchConfig};
use crate::surface::{ChatSurface, Notice};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

pub struct PresenceNotifier {
    surface: Arc<dyn ChatSurface>,
    /// identity id -> session id; volatile, rebuilt empty on restart
    last_known: HashMap<String, String>,
}

impl PresenceNotifier {
    pub fn new(surface: Arc<dyn ChatSurface>) -> Self {
        Self {
            surface,
            last_known: HashMap::new(),
        }
    }

    pub fn last_known(&self, identity_id: &str) -> Option<&str> {
        self.last_known.get(identity_id).map(String::as_str)
    }

    /// Deliver notices for `sighting`; returns how many were delivered
    pub async fn notify(&mut self, sighting: &PresenceSighting, watches: &[WatchConfig]) -> usize {
        if self.last_known(&sighting.identity_id) == Some(sighting.session_id.as_str()) {
            return 0;
        }
        self.last_known
            .insert(sighting.identity_id.clone(), sighting.session_id.clone());

        let matching: Vec<&WatchConfig> = watches
            .iter()
            .filter(|w| w.watched_identity_id == sighting.identity_id)
            .collect();
        if matching.is_empty() {
            return 0;
        }

        let notice = Notice::arrival(sighting);
        let surface = &self.surface;
        let deliveries = join_all(matching.iter().map(|watch| {
            let notice = &notice;
            async move {
                match surface.send_notice(&watch.destination_id, notice).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(
                            "Presence notice for {} to {} failed: {}",
                            sighting.identity_id,
                            watch.destination_id,
                            e
                        );
                        false
                    }
                }
            }
        }))
        .await;

        let delivered = deliveries.into_iter().filter(|ok| *ok).count();
        tracing::info!(
            "{} sighted in {} ({} notices)",
            sighting.display_name,
            sighting.session_id,
            delivered
        );
        delivered
    }
}

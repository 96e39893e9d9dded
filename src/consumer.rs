//! The consumer task.
//!
//! Single owner of all consumer-side state: snapshots, display bindings and
//! last known locations are only touched from here, one message at a time.

use crate::data::PresenceSighting;
use crate::display::{DisplaySynchronizer, SyncReport};
use crate::presence::PresenceNotifier;
use crate::reconcile::{ReconciliationEngine, ReconciliationResult};
use crate::store::Stores;
use crate::surface::ChatSurface;
use crate::transport::WireMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Consumer {
    engine: ReconciliationEngine,
    displays: DisplaySynchronizer,
    notifier: PresenceNotifier,
    stores: Stores,
}

impl Consumer {
    pub fn new(stores: Stores, surface: Arc<dyn ChatSurface>) -> Self {
        Self {
            engine: ReconciliationEngine::new(Arc::clone(&stores.history)),
            displays: DisplaySynchronizer::new(Arc::clone(&surface), Arc::clone(&stores.bindings)),
            notifier: PresenceNotifier::new(surface),
            stores,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn notifier(&self) -> &PresenceNotifier {
        &self.notifier
    }

    pub async fn handle(&mut self, message: WireMessage) {
        match message {
            WireMessage::Snapshot(snapshot) => {
                self.on_snapshot(snapshot).await;
            }
            WireMessage::Sighting(sighting) => {
                self.on_sighting(&sighting).await;
            }
        }
    }

    async fn on_snapshot(
        &mut self,
        snapshot: Vec<crate::data::SessionRecord>,
    ) -> (ReconciliationResult, SyncReport) {
        let result = self.engine.ingest(snapshot).await;
        let report = self.displays.sync(&result.all).await;
        (result, report)
    }

    async fn on_sighting(&mut self, sighting: &PresenceSighting) -> usize {
        let watches = match self.stores.watches.all().await {
            Ok(watches) => watches,
            Err(e) => {
                tracing::warn!("Could not load watches: {:#}", e);
                Vec::new()
            }
        };
        self.notifier.notify(sighting, &watches).await
    }

    /// Process messages until the transport side hangs up
    pub async fn run(mut self, mut inbound: mpsc::Receiver<WireMessage>) {
        while let Some(message) = inbound.recv().await {
            self.handle(message).await;
        }
        tracing::info!("Inbound channel closed, consumer stopping");
    }
}

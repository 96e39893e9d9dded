//! Directory sampler.
//!
//! Polls the matchmaking directory on a fixed cadence and, every
//! `presence_every` samples, launches a presence sweep over the lobbies just
//! seen. A failed query yields no snapshot for that tick; the consumer keeps
//! its previous snapshot.

pub mod sweep;

use crate::config::SamplerConfig;
use crate::data::{PresenceSighting, SessionRecord};
use crate::directory::{Directory, LobbyFilter};
use crate::transport::{SamplerLink, WireMessage};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

pub use sweep::PresenceSweep;

pub type Snapshot = Vec<SessionRecord>;

pub struct Sampler<D: Directory> {
    directory: Arc<D>,
    filter: LobbyFilter,
    presence_every: u64,
    ticks: u64,
    sweep: PresenceSweep,
}

impl<D: Directory> Sampler<D> {
    pub fn new(directory: Arc<D>, config: &SamplerConfig) -> Self {
        Self {
            directory,
            filter: LobbyFilter::open_lobbies(config.max_results),
            presence_every: u64::from(config.presence_every),
            ticks: 0,
            sweep: PresenceSweep::new(config.max_concurrent_joins),
        }
    }

    /// Query the directory once. `None` when the query failed.
    pub async fn sample(&self) -> Option<Snapshot> {
        match self.directory.query(&self.filter).await {
            Ok(raw) => {
                let mut snapshot: Snapshot = raw.into_iter().map(|r| r.into_record()).collect();
                snapshot.truncate(self.filter.max_results);
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!("Directory query failed, skipping this tick: {:#}", e);
                None
            }
        }
    }

    /// Whether tick number `tick` (0-based) carries a presence sweep.
    /// A `presence_every` of 0 disables sweeps.
    pub fn is_presence_tick(&self, tick: u64) -> bool {
        self.presence_every != 0 && tick % self.presence_every == 0
    }

    /// One sampling tick: abandon the stale sweep, sample, maybe sweep
    pub async fn tick(&mut self, sightings: &mpsc::Sender<PresenceSighting>) -> Option<Snapshot> {
        let tick = self.ticks;
        self.ticks += 1;

        let abandoned = self.sweep.abandon();
        if abandoned > 0 {
            tracing::info!("Abandoned {} unfinished presence visits", abandoned);
        }

        let snapshot = self.sample().await?;
        tracing::debug!("Sampled {} lobbies", snapshot.len());

        if self.is_presence_tick(tick) {
            self.sweep
                .start(Arc::clone(&self.directory), &snapshot, sightings.clone());
        }

        Some(snapshot)
    }

    pub fn sweep_in_flight(&mut self) -> usize {
        self.sweep.in_flight()
    }
}

/// Sampling loop. Returns once the link to the consumer closes.
pub async fn run<D: Directory>(
    directory: Arc<D>,
    config: &SamplerConfig,
    mut link: SamplerLink,
    mut closed: crate::transport::client::LinkClosed,
) -> Result<()> {
    let (sighting_tx, mut sighting_rx) = mpsc::channel::<PresenceSighting>(256);
    let mut sampler = Sampler::new(directory, config);

    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(snapshot) = sampler.tick(&sighting_tx).await else {
                    continue;
                };
                if let Err(e) = link.send(&WireMessage::Snapshot(snapshot)).await {
                    tracing::warn!("Link send failed, exiting: {:#}", e);
                    break;
                }
            }
            Some(sighting) = sighting_rx.recv() => {
                if let Err(e) = link.send(&WireMessage::Sighting(sighting)).await {
                    tracing::warn!("Link send failed, exiting: {:#}", e);
                    break;
                }
            }
            _ = &mut closed => {
                tracing::info!("Consumer closed the link, exiting");
                break;
            }
        }
    }

    sampler.sweep.abandon();
    link.close().await;
    Ok(())
}

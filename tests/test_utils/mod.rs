#![allow(dead_code)]
//! Fakes and fixtures shared by the lobby-relay integration tests

use anyhow::Result;
use async_trait::async_trait;
use lobby_relay::data::{GameState, MessageLocator, SessionRecord, VersionTrack};
use lobby_relay::directory::{Directory, LobbyFilter, LobbyMember, LobbyMetadata, RawLobby};
use lobby_relay::surface::{ChatSurface, Notice, RenderedView, SurfaceError, SurfaceResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn make_session(id: &str, players: u32, track: VersionTrack) -> SessionRecord {
    let game_version = match track {
        VersionTrack::Stable => "1.0.4",
        VersionTrack::PublicTest => "1.0.5p",
        VersionTrack::Modded => "1.0.4m",
    };
    SessionRecord {
        id: id.to_string(),
        name: format!("Lobby {}", id),
        owner_name: "Maverick".to_string(),
        owner_id: format!("owner-{}", id),
        scenario_name: "Operation Dawn".to_string(),
        scenario_id: "scn-1".to_string(),
        max_players: 8,
        player_count: players,
        game_version: game_version.to_string(),
        version_track: track,
        game_state: GameState::Mission,
        mod_count: 0,
        loaded_mods: vec![],
        started_at_utc: None,
        feature: None,
        env_idx: None,
        briefing_room: None,
    }
}

// =============================================================================
// Chat surface
// =============================================================================

#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub creates: Vec<(String, RenderedView)>,
    pub edits: Vec<MessageLocator>,
    pub notices: Vec<(String, Notice)>,
    live_messages: HashSet<String>,
    missing_scopes: HashSet<String>,
    unreachable_scopes: HashSet<String>,
    failing_destinations: HashSet<String>,
    failing_creates: HashSet<String>,
    next_message: u64,
}

/// In-memory chat surface that records every call
#[derive(Debug, Default)]
pub struct FakeSurface {
    log: Mutex<SurfaceLog>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget a message, as if someone deleted it
    pub fn delete_message(&self, message_id: &str) {
        self.log.lock().unwrap().live_messages.remove(message_id);
    }

    /// The scope no longer exists
    pub fn remove_scope(&self, scope_id: &str) {
        self.log
            .lock()
            .unwrap()
            .missing_scopes
            .insert(scope_id.to_string());
    }

    /// Resolving the scope fails transiently
    pub fn make_scope_unreachable(&self, scope_id: &str) {
        self.log
            .lock()
            .unwrap()
            .unreachable_scopes
            .insert(scope_id.to_string());
    }

    /// Every call targeting the destination fails transiently
    pub fn fail_destination(&self, destination_id: &str) {
        self.log
            .lock()
            .unwrap()
            .failing_destinations
            .insert(destination_id.to_string());
    }

    /// Creating new views in the destination fails transiently
    pub fn fail_creates(&self, destination_id: &str) {
        self.log
            .lock()
            .unwrap()
            .failing_creates
            .insert(destination_id.to_string());
    }

    pub fn restore_creates(&self, destination_id: &str) {
        self.log.lock().unwrap().failing_creates.remove(destination_id);
    }

    pub fn create_count(&self) -> usize {
        self.log.lock().unwrap().creates.len()
    }

    pub fn edit_count(&self) -> usize {
        self.log.lock().unwrap().edits.len()
    }

    pub fn notices(&self) -> Vec<(String, Notice)> {
        self.log.lock().unwrap().notices.clone()
    }

    pub fn live_messages(&self) -> HashSet<String> {
        self.log.lock().unwrap().live_messages.clone()
    }

    pub fn created_views(&self) -> Vec<(String, RenderedView)> {
        self.log.lock().unwrap().creates.clone()
    }
}

#[async_trait]
impl ChatSurface for FakeSurface {
    async fn resolve_scope(&self, scope_id: &str) -> SurfaceResult<()> {
        let log = self.log.lock().unwrap();
        if log.missing_scopes.contains(scope_id) {
            return Err(SurfaceError::NotFound(format!("guild {}", scope_id)));
        }
        if log.unreachable_scopes.contains(scope_id) {
            return Err(SurfaceError::Transient("timeout".to_string()));
        }
        Ok(())
    }

    async fn create_view(
        &self,
        destination_id: &str,
        view: &RenderedView,
    ) -> SurfaceResult<MessageLocator> {
        let mut log = self.log.lock().unwrap();
        if log.failing_destinations.contains(destination_id)
            || log.failing_creates.contains(destination_id)
        {
            return Err(SurfaceError::Transient("HTTP 502".to_string()));
        }
        log.next_message += 1;
        let message_id = format!("msg-{}", log.next_message);
        log.live_messages.insert(message_id.clone());
        log.creates.push((destination_id.to_string(), view.clone()));
        Ok(MessageLocator {
            channel_id: destination_id.to_string(),
            message_id,
        })
    }

    async fn edit_view(&self, locator: &MessageLocator, _view: &RenderedView) -> SurfaceResult<()> {
        let mut log = self.log.lock().unwrap();
        if log.failing_destinations.contains(&locator.channel_id) {
            return Err(SurfaceError::Transient("HTTP 502".to_string()));
        }
        if !log.live_messages.contains(&locator.message_id) {
            return Err(SurfaceError::NotFound(format!(
                "message {}",
                locator.message_id
            )));
        }
        log.edits.push(locator.clone());
        Ok(())
    }

    async fn send_notice(&self, destination_id: &str, notice: &Notice) -> SurfaceResult<()> {
        let mut log = self.log.lock().unwrap();
        if log.failing_destinations.contains(destination_id) {
            return Err(SurfaceError::Transient("HTTP 502".to_string()));
        }
        log.notices.push((destination_id.to_string(), notice.clone()));
        Ok(())
    }
}

// =============================================================================
// Directory
// =============================================================================

pub fn raw_lobby(id: &str, members: u32, version: &str) -> RawLobby {
    RawLobby {
        id: id.to_string(),
        member_count: members,
        data: LobbyMetadata {
            name: Some(format!("Lobby {}", id)),
            owner_name: Some("Goose".to_string()),
            owner_id: Some(format!("owner-{}", id)),
            scenario_name: Some("Strike Package".to_string()),
            max_players: Some("8".to_string()),
            game_state: Some("Briefing".to_string()),
            version: Some(version.to_string()),
            ..LobbyMetadata::default()
        },
    }
}

/// Directory with canned lobbies and members
#[derive(Default)]
pub struct FakeDirectory {
    pub lobbies: Mutex<Vec<RawLobby>>,
    pub members: HashMap<String, Vec<LobbyMember>>,
    pub failing_joins: HashSet<String>,
    pub fail_queries: AtomicBool,
    /// How long each join takes
    pub join_delay: Duration,
    pub queries: AtomicUsize,
    pub joins: AtomicUsize,
    pub leaves: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_lobbies(lobbies: Vec<RawLobby>) -> Self {
        Self {
            lobbies: Mutex::new(lobbies),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn query(&self, _filter: &LobbyFilter) -> Result<Vec<RawLobby>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            anyhow::bail!("directory unavailable");
        }
        Ok(self.lobbies.lock().unwrap().clone())
    }

    async fn join(&self, lobby_id: &str) -> Result<Vec<LobbyMember>> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.join_delay.is_zero() {
            tokio::time::sleep(self.join_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_joins.contains(lobby_id) {
            anyhow::bail!("join {} timed out", lobby_id);
        }
        Ok(self.members.get(lobby_id).cloned().unwrap_or_default())
    }

    async fn leave(&self, _lobby_id: &str) -> Result<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! Matchmaking directory abstraction.
//!
//! The directory returns raw lobby records whose metadata uses the game's
//! short keys (`lName`, `maxP`, ...). [`LobbyMetadata`] is the fixed schema
//! for those keys; [`RawLobby::into_record`] applies the defaulting rules:
//! - missing text fields become empty strings
//! - unparsable counts become 0
//! - mod fields are only read for modded versions, otherwise `mod_count = 0`
//!   and no mods
//! - an unparsable mission start becomes `None`

use crate::data::{
    parse_count, parse_unix_seconds, split_mod_list, GameState, SessionRecord, VersionTrack,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Greater,
}

impl Comparison {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::Greater => ">",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCondition {
    pub key: String,
    pub comparison: Comparison,
    pub value: i64,
}

/// Query sent to the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyFilter {
    pub worldwide: bool,
    pub max_results: usize,
    pub conditions: Vec<FilterCondition>,
}

impl LobbyFilter {
    /// Worldwide, capacity > 1, ready, no password
    pub fn open_lobbies(max_results: usize) -> Self {
        let condition = |key: &str, comparison, value| FilterCondition {
            key: key.to_string(),
            comparison,
            value,
        };
        Self {
            worldwide: true,
            max_results,
            conditions: vec![
                condition("maxP", Comparison::Greater, 1),
                condition("lReady", Comparison::Equal, 1),
                condition("pwh", Comparison::Equal, 0),
            ],
        }
    }
}

/// Metadata keys a lobby advertises
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyMetadata {
    #[serde(rename = "lName", default)]
    pub name: Option<String>,
    #[serde(rename = "oName", default)]
    pub owner_name: Option<String>,
    #[serde(rename = "oId", default)]
    pub owner_id: Option<String>,
    #[serde(rename = "scn", default)]
    pub scenario_name: Option<String>,
    #[serde(rename = "scID", default)]
    pub scenario_id: Option<String>,
    #[serde(rename = "maxP", default)]
    pub max_players: Option<String>,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(rename = "envIdx", default)]
    pub env_idx: Option<String>,
    #[serde(rename = "brtype", default)]
    pub briefing_room: Option<String>,
    #[serde(rename = "pwh", default)]
    pub password_hash: Option<String>,
    #[serde(rename = "gState", default)]
    pub game_state: Option<String>,
    #[serde(rename = "ver", default)]
    pub version: Option<String>,
    #[serde(rename = "mUtc", default)]
    pub mission_start_utc: Option<String>,
    #[serde(rename = "lModCount", default)]
    pub mod_count: Option<String>,
    #[serde(rename = "lMods", default)]
    pub loaded_mods: Option<String>,
}

/// A lobby as returned by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLobby {
    pub id: String,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub data: LobbyMetadata,
}

impl RawLobby {
    pub fn into_record(self) -> SessionRecord {
        let meta = self.data;
        let text = |v: Option<String>| v.unwrap_or_default();

        let game_version = text(meta.version);
        let version_track = VersionTrack::from_version(&game_version);

        let (mod_count, loaded_mods) = if version_track == VersionTrack::Modded {
            (
                meta.mod_count.as_deref().map(parse_count).unwrap_or(0),
                meta.loaded_mods.as_deref().map(split_mod_list).unwrap_or_default(),
            )
        } else {
            (0, Vec::new())
        };

        SessionRecord {
            id: self.id,
            name: text(meta.name),
            owner_name: text(meta.owner_name),
            owner_id: text(meta.owner_id),
            scenario_name: text(meta.scenario_name),
            scenario_id: text(meta.scenario_id),
            max_players: meta.max_players.as_deref().map(parse_count).unwrap_or(0),
            player_count: self.member_count,
            game_version,
            version_track,
            game_state: meta
                .game_state
                .as_deref()
                .map(GameState::parse)
                .unwrap_or_default(),
            mod_count,
            loaded_mods,
            started_at_utc: meta.mission_start_utc.as_deref().and_then(parse_unix_seconds),
            feature: meta.feature,
            env_idx: meta.env_idx,
            briefing_room: meta.briefing_room,
        }
    }
}

/// A member of a joined lobby
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyMember {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[async_trait]
pub trait Directory: Send + Sync + 'static {
    async fn query(&self, filter: &LobbyFilter) -> Result<Vec<RawLobby>>;

    /// Join a lobby and return its membership list
    async fn join(&self, lobby_id: &str) -> Result<Vec<LobbyMember>>;

    async fn leave(&self, lobby_id: &str) -> Result<()>;
}

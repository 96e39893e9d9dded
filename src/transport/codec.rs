//! Wire format between sampler and consumer.
//!
//! Every frame is one UTF-8 JSON object. A frame is a snapshot iff it carries
//! a non-null array-typed `lobbies` field; any other object is a sighting.
//! The literal text frame `"ping"` is the consumer's heartbeat and is never a
//! message.

use crate::data::{
    parse_count, parse_unix_seconds, split_mod_list, GameState, PresenceSighting, SessionRecord,
    VersionTrack,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const HEARTBEAT_FRAME: &str = "ping";

#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Snapshot(Vec<SessionRecord>),
    Sighting(PresenceSighting),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("heartbeat frame")]
    Heartbeat,
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// A lobby as it travels on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyInfo {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub lobby_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub lobby_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub owner_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub owner_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub scenario_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub scenario_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub max_players: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub feature: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub env_idx: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub game_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub briefing_room: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(rename = "ld_GameState", default, deserialize_with = "lenient_text")]
    pub game_state: Option<String>,
    #[serde(rename = "mUtc", default, deserialize_with = "lenient_text")]
    pub mission_start_utc: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub player_count: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub mod_count: Option<String>,
    #[serde(default, deserialize_with = "lenient_mods")]
    pub loaded_mods: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFrame {
    lobbies: Vec<LobbyInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SightingFrame {
    #[serde(deserialize_with = "required_text")]
    steam_id: String,
    #[serde(default)]
    name: String,
    #[serde(deserialize_with = "required_text")]
    lobby_id: String,
    #[serde(default)]
    lobby_name: String,
    #[serde(default)]
    lobby_mission: String,
}

/// Text fields may arrive as strings, numbers or null
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    })
}

fn required_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_text(deserializer)?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| serde::de::Error::custom("expected a non-empty id"))
}

/// Mods arrive either as an array or as one delimited string
fn lenient_mods<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) => split_mod_list(&s),
        _ => Vec::new(),
    })
}

impl From<LobbyInfo> for SessionRecord {
    fn from(info: LobbyInfo) -> Self {
        let text = |v: Option<String>| v.unwrap_or_default();

        let game_version = text(info.game_version);
        let version_track = VersionTrack::from_version(&game_version);
        let owner_id = text(info.owner_id);
        // The host is stable for a session's lifetime
        let id = info
            .lobby_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| owner_id.clone());

        let (mod_count, loaded_mods) = if version_track == VersionTrack::Modded {
            (
                info.mod_count.as_deref().map(parse_count).unwrap_or(0),
                info.loaded_mods,
            )
        } else {
            (0, Vec::new())
        };

        SessionRecord {
            id,
            name: text(info.lobby_name),
            owner_name: text(info.owner_name),
            owner_id,
            scenario_name: text(info.scenario_name),
            scenario_id: text(info.scenario_id),
            max_players: info.max_players.as_deref().map(parse_count).unwrap_or(0),
            player_count: info.player_count.as_deref().map(parse_count).unwrap_or(0),
            game_version,
            version_track,
            game_state: info
                .game_state
                .as_deref()
                .map(GameState::parse)
                .unwrap_or_default(),
            mod_count,
            loaded_mods,
            started_at_utc: info.mission_start_utc.as_deref().and_then(parse_unix_seconds),
            feature: info.feature,
            env_idx: info.env_idx,
            briefing_room: info.briefing_room,
        }
    }
}

impl From<&SessionRecord> for LobbyInfo {
    fn from(record: &SessionRecord) -> Self {
        Self {
            lobby_id: Some(record.id.clone()),
            lobby_name: Some(record.name.clone()),
            owner_name: Some(record.owner_name.clone()),
            owner_id: Some(record.owner_id.clone()),
            scenario_name: Some(record.scenario_name.clone()),
            scenario_id: Some(record.scenario_id.clone()),
            max_players: Some(record.max_players.to_string()),
            feature: record.feature.clone(),
            env_idx: record.env_idx.clone(),
            game_version: Some(record.game_version.clone()),
            briefing_room: record.briefing_room.clone(),
            password_hash: None,
            game_state: Some(record.game_state.wire_name().to_string()),
            mission_start_utc: record.started_at_utc.map(|t| t.timestamp().to_string()),
            player_count: Some(record.player_count.to_string()),
            mod_count: Some(record.mod_count.to_string()),
            loaded_mods: record.loaded_mods.clone(),
        }
    }
}

impl From<SightingFrame> for PresenceSighting {
    fn from(frame: SightingFrame) -> Self {
        Self {
            identity_id: frame.steam_id,
            display_name: frame.name,
            session_id: frame.lobby_id,
            session_name: frame.lobby_name,
            scenario_name: frame.lobby_mission,
        }
    }
}

impl From<&PresenceSighting> for SightingFrame {
    fn from(sighting: &PresenceSighting) -> Self {
        Self {
            steam_id: sighting.identity_id.clone(),
            name: sighting.display_name.clone(),
            lobby_id: sighting.session_id.clone(),
            lobby_name: sighting.session_name.clone(),
            lobby_mission: sighting.scenario_name.clone(),
        }
    }
}

/// Classify and decode one inbound text frame
pub fn decode_frame(text: &str) -> Result<WireMessage, FrameError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FrameError::Empty);
    }
    if trimmed == HEARTBEAT_FRAME {
        return Err(FrameError::Heartbeat);
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| FrameError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(FrameError::Malformed("not a JSON object".to_string()));
    }

    if value.get("lobbies").is_some_and(Value::is_array) {
        let frame: SnapshotFrame =
            serde_json::from_value(value).map_err(|e| FrameError::Malformed(e.to_string()))?;
        Ok(WireMessage::Snapshot(
            frame.lobbies.into_iter().map(SessionRecord::from).collect(),
        ))
    } else {
        let frame: SightingFrame =
            serde_json::from_value(value).map_err(|e| FrameError::Malformed(e.to_string()))?;
        Ok(WireMessage::Sighting(frame.into()))
    }
}

/// Encode a message as one text frame
pub fn encode_message(message: &WireMessage) -> serde_json::Result<String> {
    match message {
        WireMessage::Snapshot(lobbies) => serde_json::to_string(&SnapshotFrame {
            lobbies: lobbies.iter().map(LobbyInfo::from).collect(),
        }),
        WireMessage::Sighting(sighting) => serde_json::to_string(&SightingFrame::from(sighting)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_heartbeat_and_empty_are_not_messages() {
        assert_eq!(decode_frame(""), Err(FrameError::Empty));
        assert_eq!(decode_frame("   "), Err(FrameError::Empty));
        assert_eq!(decode_frame("ping"), Err(FrameError::Heartbeat));
        assert!(matches!(decode_frame("x"), Err(FrameError::Malformed(_))));
        assert!(matches!(decode_frame("[1,2]"), Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_null_lobbies_is_not_a_snapshot() {
        // Falls through to sighting classification, which lacks ids
        assert!(matches!(
            decode_frame(r#"{"lobbies":null}"#),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_snapshot_with_string_and_number_fields() {
        let frame = r#"{"lobbies":[{
            "lobbyName":"Friday Ops","ownerName":"Strike","ownerId":"76561197960287930",
            "scenarioName":"Cold","scenarioId":"scn","maxPlayers":"8","feature":"0",
            "envIdx":"1","gameVersion":"1.4.2m","briefingRoom":"0","passwordHash":"0",
            "ld_GameState":"Mission","mUtc":"1700000000","playerCount":3,
            "modCount":"2","loadedMods":"Alpha,Beta"
        }]}"#;

        let WireMessage::Snapshot(lobbies) = decode_frame(frame).unwrap() else {
            panic!("expected snapshot");
        };
        let lobby = &lobbies[0];
        assert_eq!(lobby.id, "76561197960287930");
        assert_eq!(lobby.player_count, 3);
        assert_eq!(lobby.max_players, 8);
        assert_eq!(lobby.version_track, VersionTrack::Modded);
        assert_eq!(lobby.loaded_mods, vec!["Alpha", "Beta"]);
        assert_eq!(lobby.game_state, GameState::Mission);
    }

    #[test]
    fn test_sighting_frame() {
        let frame = r#"{"steamId":"76561197960287930","name":"Viper","lobbyId":"lobby-42","lobbyName":"Friday Ops","lobbyMission":"Cold"}"#;
        let message = decode_frame(frame).unwrap();
        assert_eq!(
            message,
            WireMessage::Sighting(PresenceSighting {
                identity_id: "76561197960287930".to_string(),
                display_name: "Viper".to_string(),
                session_id: "lobby-42".to_string(),
                session_name: "Friday Ops".to_string(),
                scenario_name: "Cold".to_string(),
            })
        );
    }

    #[test]
    fn test_encoded_snapshot_decodes_to_same_records() {
        let frame = r#"{"lobbies":[{"lobbyId":"A","lobbyName":"","ownerId":"o","maxPlayers":8,"playerCount":4,"gameVersion":"1.0","ld_GameState":"1"}]}"#;
        let decoded = decode_frame(frame).unwrap();
        let encoded = encode_message(&decoded).unwrap();
        assert_eq!(decode_frame(&encoded).unwrap(), decoded);
    }
}

pub mod sorting;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Label used for sessions whose name is empty or whitespace-only
pub const ANONYMOUS_LOBBY: &str = "Anonymous lobby";

/// One discovered multiplayer session, normalized from the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    pub owner_name: String,
    pub owner_id: String,
    pub scenario_name: String,
    pub scenario_id: String,
    pub max_players: u32,
    pub player_count: u32,
    /// Raw version string as advertised by the host (e.g. "1.4.2m")
    pub game_version: String,
    pub version_track: VersionTrack,
    pub game_state: GameState,
    #[serde(default)]
    pub mod_count: u32,
    #[serde(default)]
    pub loaded_mods: Vec<String>,
    pub started_at_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub env_idx: Option<String>,
    #[serde(default)]
    pub briefing_room: Option<String>,
}

impl SessionRecord {
    /// Name to show in displays; blank names are labeled as anonymous
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            ANONYMOUS_LOBBY
        } else {
            &self.name
        }
    }

    /// Time spent in the running mission, if the session is in-mission
    /// and advertises a start time.
    pub fn mission_elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.game_state != GameState::Mission {
            return None;
        }
        let started = self.started_at_utc?;
        let elapsed = now.signed_duration_since(started);
        (elapsed >= Duration::zero()).then_some(elapsed)
    }

    pub fn is_modded(&self) -> bool {
        self.version_track == VersionTrack::Modded
    }
}

/// Coarse release channel a session belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum VersionTrack {
    #[default]
    Stable,
    PublicTest,
    Modded,
}

impl VersionTrack {
    /// Derive the track from a raw version string.
    ///
    /// Versions carrying an `m` marker are modded, a `p` marker means the
    /// public testing branch, anything else is treated as stable.
    pub fn from_version(version: &str) -> Self {
        let version = version.to_ascii_lowercase();
        if version.contains('m') {
            Self::Modded
        } else if version.contains('p') {
            Self::PublicTest
        } else {
            Self::Stable
        }
    }

    /// Parse a one-letter (or full name) category code as typed by operators
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "s" | "stable" => Some(Self::Stable),
            "p" | "pt" | "publictest" | "public-test" => Some(Self::PublicTest),
            "m" | "modded" => Some(Self::Modded),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Stable => "Stable",
            Self::PublicTest => "Public Testing",
            Self::Modded => "Modded",
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        [Self::Stable, Self::PublicTest, Self::Modded].into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum GameState {
    Briefing,
    Mission,
    Debrief,
    #[default]
    Unknown,
}

impl GameState {
    /// Accepts either the state name or its ordinal (0 = briefing, 1 = mission, 2 = debrief)
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "briefing" | "0" => Self::Briefing,
            "mission" | "1" => Self::Mission,
            "debrief" | "2" => Self::Debrief,
            _ => Self::Unknown,
        }
    }

    /// Name used on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Briefing => "Briefing",
            Self::Mission => "Mission",
            Self::Debrief => "Debrief",
            Self::Unknown => "Unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Briefing => "In briefing",
            Self::Mission => "In mission",
            Self::Debrief => "In debrief",
            Self::Unknown => "Unknown",
        }
    }
}

/// One observation of an identity inside a session during a presence sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSighting {
    pub identity_id: String,
    pub display_name: String,
    pub session_id: String,
    pub session_name: String,
    pub scenario_name: String,
}

/// Locator of a message rendered on the external chat surface
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageLocator {
    pub channel_id: String,
    pub message_id: String,
}

/// Which version tracks a display renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode", content = "tracks")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(BTreeSet<VersionTrack>),
}

impl CategoryFilter {
    /// Build a filter from operator codes like `"m,p"`; empty input means all
    pub fn from_codes(codes: &str) -> Option<Self> {
        let codes: Vec<&str> = codes
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|c| !c.is_empty())
            .collect();

        if codes.is_empty() {
            return Some(Self::All);
        }

        let mut tracks = BTreeSet::new();
        for code in codes {
            tracks.insert(VersionTrack::from_code(code)?);
        }
        Some(Self::Only(tracks))
    }

    pub fn categories(&self) -> Vec<VersionTrack> {
        match self {
            Self::All => VersionTrack::all().collect(),
            Self::Only(tracks) => tracks.iter().copied().collect(),
        }
    }
}

/// A live status view rendered for one owning scope (guild/workspace)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBinding {
    pub scope_id: String,
    pub destination_id: String,
    #[serde(default)]
    pub rendered: BTreeMap<VersionTrack, Option<MessageLocator>>,
    #[serde(default)]
    pub visible: CategoryFilter,
}

impl DisplayBinding {
    pub fn new(scope_id: &str, destination_id: &str, visible: CategoryFilter) -> Self {
        Self {
            scope_id: scope_id.to_string(),
            destination_id: destination_id.to_string(),
            rendered: BTreeMap::new(),
            visible,
        }
    }

    pub fn locator(&self, track: VersionTrack) -> Option<&MessageLocator> {
        self.rendered.get(&track).and_then(|l| l.as_ref())
    }
}

/// Standing request to be notified when an identity is sighted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub scope_id: String,
    pub destination_id: String,
    pub watched_identity_id: String,
}

/// One persisted history row, appended whenever a session changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: uuid::Uuid,
    pub lobby_id: String,
    pub recorded_at: DateTime<Utc>,
    pub lobby: SessionRecord,
}

impl HistoryEntry {
    pub fn new(lobby: SessionRecord) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            lobby_id: lobby.id.clone(),
            recorded_at: Utc::now(),
            lobby,
        }
    }
}

// =============================================================================
// Field defaulting rules shared by the directory and wire conversions
// =============================================================================

/// Parse a count field; anything unparsable or negative becomes 0
pub fn parse_count(raw: &str) -> u32 {
    let raw = raw.trim();
    raw.parse::<u32>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u32))
        .unwrap_or(0)
}

/// Parse a unix timestamp in seconds (integer or fractional)
pub fn parse_unix_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    Utc.timestamp_opt(whole, nanos).single()
}

/// Split a delimited mod list ("a,b" or one per line) into names
pub fn split_mod_list(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

//! Builds the per-track status view from a snapshot.

use crate::data::sorting::{sessions_for_track, sort_by_player_count};
use crate::data::{SessionRecord, VersionTrack};
use crate::surface::{RenderedView, ViewBlock};
use chrono::{DateTime, Duration, Utc};

/// Most summary blocks a single view carries
pub const MAX_BLOCKS: usize = 25;

/// Render the view for `track`, busiest sessions first
pub fn render_category(
    track: VersionTrack,
    sessions: &[SessionRecord],
    now: DateTime<Utc>,
) -> RenderedView {
    let sorted = sort_by_player_count(sessions_for_track(sessions, track));
    let total = sorted.len();
    let players: u32 = sorted.iter().map(|s| s.player_count).sum();

    let blocks: Vec<ViewBlock> = sorted
        .iter()
        .take(MAX_BLOCKS)
        .map(|s| summary_block(s, now))
        .collect();

    let mut footer = match total {
        0 => "No open lobbies".to_string(),
        1 => format!("1 lobby, {} players", players),
        n => format!("{} lobbies, {} players", n, players),
    };
    if total > MAX_BLOCKS {
        footer.push_str(&format!(" (+{} more)", total - MAX_BLOCKS));
    }

    RenderedView {
        title: format!("{} lobbies", track.label()),
        blocks,
        footer,
    }
}

fn summary_block(session: &SessionRecord, now: DateTime<Utc>) -> ViewBlock {
    let mut lines = vec![
        format!("Host: {}", session.owner_name),
        format!("Mission: {}", session.scenario_name),
        format!("Players: {}/{}", session.player_count, session.max_players),
    ];

    let state = match session.mission_elapsed(now) {
        Some(elapsed) => format!("{} ({})", session.game_state.label(), format_elapsed(elapsed)),
        None => session.game_state.label().to_string(),
    };
    lines.push(format!("State: {}", state));
    lines.push(format!(
        "Version: {} ({})",
        session.game_version,
        session.version_track.label()
    ));

    if session.is_modded() {
        lines.push(format!("Mods: {}", session.mod_count));
    }

    ViewBlock {
        heading: session.display_name().to_string(),
        body: lines.join("\n"),
    }
}

/// "1h 05m", "12m", "<1m"
pub fn format_elapsed(elapsed: Duration) -> String {
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        "<1m".to_string()
    } else if minutes < 60 {
        format!("{}m", minutes)
    } else {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    }
}

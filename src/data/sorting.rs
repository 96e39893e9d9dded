//! Ordering of sessions for rendered views.
//!
//! Single source of truth for "busiest lobby first" ordering used by the
//! display renderer and the `query` command.

use super::{SessionRecord, VersionTrack};

/// Sort sessions by player count, busiest first.
///
/// Ties keep a deterministic order by display name, then id, so repeated
/// renders of an unchanged snapshot produce identical views.
pub fn sort_by_player_count(mut sessions: Vec<&SessionRecord>) -> Vec<&SessionRecord> {
    sessions.sort_by(|a, b| {
        b.player_count
            .cmp(&a.player_count)
            .then_with(|| a.display_name().cmp(b.display_name()))
            .then_with(|| a.id.cmp(&b.id))
    });
    sessions
}

/// Sessions on one version track, busiest first
pub fn sessions_for_track(sessions: &[SessionRecord], track: VersionTrack) -> Vec<&SessionRecord> {
    sort_by_player_count(
        sessions
            .iter()
            .filter(|s| s.version_track == track)
            .collect(),
    )
}

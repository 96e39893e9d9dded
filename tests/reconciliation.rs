//! Tests for snapshot reconciliation and history writes

mod test_utils;

use lobby_relay::data::{HistoryEntry, VersionTrack};
use lobby_relay::reconcile::ReconciliationEngine;
use lobby_relay::store::log::JsonLinesCollection;
use lobby_relay::store::memory::MemoryCollection;
use lobby_relay::store::{Collection, HISTORY_FILE};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;
use test_utils::make_session;

#[tokio::test]
async fn test_player_count_change_is_recorded_once() {
    let history = Arc::new(MemoryCollection::<HistoryEntry>::default());
    let mut engine = ReconciliationEngine::new(history.clone());

    engine
        .ingest(vec![make_session("A", 3, VersionTrack::Stable)])
        .await;
    let before = history.len().await;

    let result = engine
        .ingest(vec![make_session("A", 4, VersionTrack::Stable)])
        .await;

    assert_eq!(result.changed.len(), 1);
    assert_eq!(result.changed[0].id, "A");
    assert_eq!(result.changed[0].player_count, 4);
    assert_eq!(history.len().await, before + 1);

    let entries = history.all().await.unwrap();
    assert!(entries
        .iter()
        .any(|e| e.lobby_id == "A" && e.lobby.player_count == 4));
}

#[tokio::test]
async fn test_identical_snapshots_are_not_rewritten() {
    let history = Arc::new(MemoryCollection::<HistoryEntry>::default());
    let mut engine = ReconciliationEngine::new(history.clone());
    let snapshot = vec![
        make_session("A", 3, VersionTrack::Stable),
        make_session("B", 6, VersionTrack::Modded),
    ];

    let first = engine.ingest(snapshot.clone()).await;
    assert_eq!(first.changed.len(), 2);

    let second = engine.ingest(snapshot.clone()).await;
    assert!(second.is_unchanged());
    assert_eq!(second.all, snapshot);
    assert_eq!(history.len().await, 2);
}

#[tokio::test]
async fn test_vanished_session_leaves_current_and_is_not_emitted() {
    let history = Arc::new(MemoryCollection::<HistoryEntry>::default());
    let mut engine = ReconciliationEngine::new(history.clone());

    engine
        .ingest(vec![
            make_session("A", 3, VersionTrack::Stable),
            make_session("B", 2, VersionTrack::Stable),
        ])
        .await;
    let result = engine
        .ingest(vec![make_session("A", 3, VersionTrack::Stable)])
        .await;

    assert!(result.changed.is_empty());
    assert!(engine.current().iter().all(|s| s.id != "B"));
    assert_eq!(history.len().await, 2);
}

#[tokio::test]
async fn test_returning_session_is_changed_again() {
    let history = Arc::new(MemoryCollection::<HistoryEntry>::default());
    let mut engine = ReconciliationEngine::new(history.clone());
    let a = make_session("A", 3, VersionTrack::Stable);

    engine.ingest(vec![a.clone()]).await;
    engine.ingest(vec![]).await;
    let result = engine.ingest(vec![a.clone()]).await;

    assert_eq!(result.changed, vec![a]);
    assert_eq!(history.len().await, 2);
}

#[tokio::test]
async fn test_empty_start_marks_everything_changed() {
    let history = Arc::new(MemoryCollection::<HistoryEntry>::default());
    let mut engine = ReconciliationEngine::new(history.clone());
    assert!(engine.current().is_empty());
    assert!(engine.previous().is_empty());

    let result = engine
        .ingest(vec![
            make_session("A", 1, VersionTrack::Stable),
            make_session("B", 1, VersionTrack::PublicTest),
        ])
        .await;

    assert_eq!(result.changed.len(), 2);
    assert_eq!(result.all.len(), 2);
}

#[tokio::test]
async fn test_history_persists_across_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(HISTORY_FILE);
    let mut engine = ReconciliationEngine::new(Arc::new(JsonLinesCollection::<HistoryEntry>::new(
        path.clone(),
    )));

    engine
        .ingest(vec![make_session("A", 3, VersionTrack::Stable)])
        .await;
    engine
        .ingest(vec![make_session("A", 5, VersionTrack::Stable)])
        .await;

    let reopened = JsonLinesCollection::<HistoryEntry>::new(path);
    let counts: Vec<u32> = reopened
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.lobby.player_count)
        .collect();
    assert_eq!(counts, vec![3, 5]);
}

#[tokio::test]
async fn test_history_file_grows_by_one_line_per_change() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(HISTORY_FILE);
    let mut engine = ReconciliationEngine::new(Arc::new(JsonLinesCollection::<HistoryEntry>::new(
        path.clone(),
    )));
    let lines = || std::fs::read_to_string(&path).unwrap().lines().count();

    engine
        .ingest(vec![
            make_session("A", 3, VersionTrack::Stable),
            make_session("B", 2, VersionTrack::Modded),
            make_session("C", 1, VersionTrack::PublicTest),
        ])
        .await;
    assert_eq!(lines(), 3);
    let first_tick = std::fs::read_to_string(&path).unwrap();

    // Unchanged tick appends nothing
    engine
        .ingest(vec![
            make_session("A", 3, VersionTrack::Stable),
            make_session("B", 2, VersionTrack::Modded),
            make_session("C", 1, VersionTrack::PublicTest),
        ])
        .await;
    assert_eq!(lines(), 3);

    engine
        .ingest(vec![
            make_session("A", 4, VersionTrack::Stable),
            make_session("B", 2, VersionTrack::Modded),
            make_session("C", 1, VersionTrack::PublicTest),
        ])
        .await;
    assert_eq!(lines(), 4);

    engine
        .ingest(vec![
            make_session("A", 4, VersionTrack::Stable),
            make_session("B", 3, VersionTrack::Modded),
            make_session("D", 1, VersionTrack::Stable),
        ])
        .await;
    assert_eq!(lines(), 6);

    // Earlier rows are never rewritten
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with(&first_tick));
}

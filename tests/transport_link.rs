//! Tests for the consumer's listening endpoint and sampler supervision
//!
//! A fake launcher stands in for the sampler process; the test itself plays
//! the sampler by connecting to the endpoint.

mod test_utils;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use lobby_relay::config::TransportConfig;
use lobby_relay::data::{PresenceSighting, VersionTrack};
use lobby_relay::transport::{
    decode_frame, FrameError, LaunchedProcess, Launcher, SamplerLink, TransportServer, WireMessage,
};
use pretty_assertions::assert_eq;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use test_utils::make_session;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// Records launches; each launch's process exits when its sender fires
struct FakeLauncher {
    launched: mpsc::UnboundedSender<u16>,
    attempts: AtomicUsize,
    /// Attempts (1-based) that fail to spawn
    failing_attempts: Vec<usize>,
    /// Attempts whose process exits right away
    exiting_attempts: Vec<usize>,
    exits: Mutex<Vec<oneshot::Sender<()>>>,
}

impl FakeLauncher {
    fn new() -> (Self, mpsc::UnboundedReceiver<u16>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                launched: tx,
                attempts: AtomicUsize::new(0),
                failing_attempts: vec![],
                exiting_attempts: vec![],
                exits: Mutex::new(vec![]),
            },
            rx,
        )
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, addr: SocketAddr) -> Result<LaunchedProcess> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_attempts.contains(&attempt) {
            anyhow::bail!("spawn failed on attempt {}", attempt);
        }
        let _ = self.launched.send(addr.port());

        let exit: BoxFuture<'static, String> = if self.exiting_attempts.contains(&attempt) {
            async { "exit status: 1".to_string() }.boxed()
        } else {
            let (tx, rx) = oneshot::channel();
            self.exits.lock().unwrap().push(tx);
            async move {
                let _ = rx.await;
                "exit status: 0".to_string()
            }
            .boxed()
        };

        Ok(LaunchedProcess {
            pid: None,
            exit,
        })
    }
}

fn test_config() -> TransportConfig {
    TransportConfig {
        port: 0,
        heartbeat_interval_secs: 1,
        relaunch_backoff_secs: 0,
        ..TransportConfig::default()
    }
}

async fn start(
    launcher: FakeLauncher,
) -> (SocketAddr, mpsc::Receiver<WireMessage>, tokio::task::JoinHandle<Result<()>>) {
    let server = TransportServer::bind(&test_config()).await.unwrap();
    let addr = server.local_addr();
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(server.run(launcher, tx));
    (addr, rx, handle)
}

async fn expect_launch(launches: &mut mpsc::UnboundedReceiver<u16>) -> u16 {
    tokio::time::timeout(WAIT, launches.recv())
        .await
        .expect("timed out waiting for a launch")
        .expect("launcher dropped")
}

async fn expect_no_launch(launches: &mut mpsc::UnboundedReceiver<u16>) {
    let extra = tokio::time::timeout(Duration::from_millis(500), launches.recv()).await;
    assert!(extra.is_err(), "unexpected extra launch");
}

fn sighting_frame() -> String {
    serde_json::json!({
        "steamId": "76561197960287930",
        "name": "Iceman",
        "lobbyId": "lobby-42",
        "lobbyName": "Friday Night Ops",
        "lobbyMission": "Red Flag"
    })
    .to_string()
}

#[test]
fn test_malformed_frames_are_rejected() {
    assert_eq!(decode_frame(""), Err(FrameError::Empty));
    assert_eq!(decode_frame("ping"), Err(FrameError::Heartbeat));
    assert!(matches!(decode_frame("x"), Err(FrameError::Malformed(_))));
    assert!(matches!(decode_frame("[1, 2]"), Err(FrameError::Malformed(_))));
    assert!(matches!(
        decode_frame(r#"{"lobbies": null}"#),
        Err(FrameError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_launches_sampler_once_listening() {
    let (launcher, mut launches) = FakeLauncher::new();
    let (addr, _inbound, handle) = start(launcher).await;

    let port = expect_launch(&mut launches).await;
    assert_eq!(port, addr.port());
    expect_no_launch(&mut launches).await;

    handle.abort();
}

#[tokio::test]
async fn test_only_valid_frames_are_forwarded() {
    let (launcher, mut launches) = FakeLauncher::new();
    let (addr, mut inbound, handle) = start(launcher).await;
    expect_launch(&mut launches).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();
    for junk in ["", "x", "ping", "{\"lobbies\": 3"] {
        ws.send(Message::Text(junk.into())).await.unwrap();
    }
    ws.send(Message::Text(sighting_frame().into())).await.unwrap();

    let message = tokio::time::timeout(WAIT, inbound.recv())
        .await
        .unwrap()
        .unwrap();
    match message {
        WireMessage::Sighting(PresenceSighting {
            identity_id,
            session_id,
            ..
        }) => {
            assert_eq!(identity_id, "76561197960287930");
            assert_eq!(session_id, "lobby-42");
        }
        other => panic!("expected a sighting, got {:?}", other),
    }
    assert!(inbound.try_recv().is_err());
    expect_no_launch(&mut launches).await;

    handle.abort();
}

#[tokio::test]
async fn test_heartbeat_reaches_sampler() {
    let (launcher, mut launches) = FakeLauncher::new();
    let (addr, _inbound, handle) = start(launcher).await;
    expect_launch(&mut launches).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();

    let beat = tokio::time::timeout(WAIT, async {
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                return Some(text.to_string());
            }
        }
        None
    })
    .await
    .unwrap();
    assert_eq!(beat.as_deref(), Some("ping"));

    handle.abort();
}

#[tokio::test]
async fn test_socket_close_relaunches_exactly_once() {
    let (launcher, mut launches) = FakeLauncher::new();
    let (addr, _inbound, handle) = start(launcher).await;
    expect_launch(&mut launches).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();
    ws.close(None).await.unwrap();
    drop(ws);

    expect_launch(&mut launches).await;
    expect_no_launch(&mut launches).await;

    handle.abort();
}

#[tokio::test]
async fn test_exit_before_connect_relaunches() {
    let (mut launcher, mut launches) = FakeLauncher::new();
    launcher.exiting_attempts = vec![1];
    let (_addr, _inbound, handle) = start(launcher).await;

    expect_launch(&mut launches).await;
    expect_launch(&mut launches).await;
    expect_no_launch(&mut launches).await;

    handle.abort();
}

#[tokio::test]
async fn test_failed_spawn_is_retried() {
    let (mut launcher, mut launches) = FakeLauncher::new();
    launcher.failing_attempts = vec![1];
    let (_addr, _inbound, handle) = start(launcher).await;

    // The first attempt never reports a launch; the retry does
    expect_launch(&mut launches).await;
    expect_no_launch(&mut launches).await;

    handle.abort();
}

#[tokio::test]
async fn test_sampler_link_delivers_snapshot() {
    let (launcher, mut launches) = FakeLauncher::new();
    let (addr, mut inbound, handle) = start(launcher).await;
    expect_launch(&mut launches).await;

    let (mut link, _closed) = SamplerLink::connect(addr.port(), 0).await.unwrap();
    let snapshot = vec![
        make_session("A", 3, VersionTrack::Stable),
        make_session("B", 6, VersionTrack::PublicTest),
    ];
    link.send(&WireMessage::Snapshot(snapshot.clone()))
        .await
        .unwrap();

    let message = tokio::time::timeout(WAIT, inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message, WireMessage::Snapshot(snapshot));

    handle.abort();
}

#[tokio::test]
async fn test_sampler_link_notices_consumer_shutdown() {
    let (launcher, mut launches) = FakeLauncher::new();
    let (addr, inbound, handle) = start(launcher).await;
    expect_launch(&mut launches).await;

    let (_link, closed) = SamplerLink::connect(addr.port(), 0).await.unwrap();
    // Dropping the receiver stops the server, which drops the socket
    drop(inbound);

    tokio::time::timeout(WAIT, closed).await.unwrap().ok();
    let _ = tokio::time::timeout(WAIT, handle).await;
}

#[tokio::test]
async fn test_stalled_handshake_does_not_block_supervision() {
    let (launcher, mut launches) = FakeLauncher::new();
    let (addr, _inbound, handle) = start(launcher).await;
    expect_launch(&mut launches).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();
    // Connects but never sends an upgrade request
    let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    ws.close(None).await.unwrap();
    drop(ws);

    expect_launch(&mut launches).await;

    handle.abort();
}

#[tokio::test]
async fn test_extra_connection_is_turned_away() {
    let (launcher, mut launches) = FakeLauncher::new();
    let (addr, mut inbound, handle) = start(launcher).await;
    expect_launch(&mut launches).await;

    let (mut sampler, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut stray, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();
    let ended = tokio::time::timeout(WAIT, async {
        loop {
            match stray.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "stray connection was not closed");
    drop(stray);

    // The stray going away must not start a second sampler
    expect_no_launch(&mut launches).await;

    sampler
        .send(Message::Text(sighting_frame().into()))
        .await
        .unwrap();
    let message = tokio::time::timeout(WAIT, inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(message, WireMessage::Sighting(_)));

    handle.abort();
}

//! Consumer-side listening endpoint.
//!
//! Owns the supervision loop: binds the socket, launches the sampler, accepts
//! its websocket connection, heartbeats it and relaunches it whenever the
//! socket goes away. Decoded messages are forwarded to the consumer task;
//! nothing else crosses the boundary.
//!
//! The websocket upgrade runs in the per-connection task under a timeout, so
//! a client that never finishes it cannot stall supervision. The connection
//! is only reported to the supervisor once the upgrade succeeded.

use super::codec::{decode_frame, FrameError, WireMessage, HEARTBEAT_FRAME};
use super::launcher::Launcher;
use super::supervisor::{Launch, Supervisor};
use crate::config::TransportConfig;
use crate::util::send_or_log;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

#[derive(Debug)]
enum LinkEvent {
    /// Handshake done; the supervisor answers whether to keep the socket
    Connected {
        connection: u64,
        peer: SocketAddr,
        admit: oneshot::Sender<bool>,
    },
    Closed {
        connection: u64,
        error: Option<String>,
    },
    ChildExited {
        generation: u64,
        pid: Option<u32>,
        status: String,
    },
    RelaunchDue,
}

pub struct TransportServer {
    listener: TcpListener,
    addr: SocketAddr,
    heartbeat: Duration,
    handshake_timeout: Duration,
    relaunch_backoff: Duration,
}

impl TransportServer {
    pub async fn bind(config: &TransportConfig) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("Failed to listen on {}", bind))?;
        let addr = listener.local_addr()?;

        Ok(Self {
            listener,
            addr,
            heartbeat: Duration::from_secs(config.heartbeat_interval_secs.max(1)),
            handshake_timeout: Duration::from_secs(config.handshake_timeout_secs.max(1)),
            relaunch_backoff: Duration::from_secs(config.relaunch_backoff_secs),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run until the consumer drops its receiver
    pub async fn run<L: Launcher>(self, launcher: L, inbound: mpsc::Sender<WireMessage>) -> Result<()> {
        tracing::info!("Transport listening on {}", self.addr);

        let (events_tx, mut events_rx) = mpsc::channel::<LinkEvent>(32);
        let mut supervisor = Supervisor::new();
        let mut next_connection: u64 = 0;

        if let Some(launch) = supervisor.on_listening() {
            self.start_sampler(launch, &launcher, &mut supervisor, &events_tx);
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    next_connection += 1;
                    tracing::debug!("Connection {} accepted from {}", next_connection, peer);

                    tokio::spawn(handle_connection(
                        next_connection,
                        stream,
                        peer,
                        self.handshake_timeout,
                        self.heartbeat,
                        inbound.clone(),
                        events_tx.clone(),
                    ));
                }
                Some(event) = events_rx.recv() => {
                    let launch = match event {
                        LinkEvent::Connected { connection, peer, admit } => {
                            let admitted = supervisor.on_connected(connection);
                            if admitted {
                                tracing::info!("Sampler connected from {}", peer);
                            }
                            // The connection task may have gone away meanwhile
                            if admit.send(admitted).is_err() && admitted {
                                supervisor.on_disconnected(connection)
                            } else {
                                None
                            }
                        }
                        LinkEvent::Closed { connection, error } => {
                            match error {
                                Some(e) => tracing::warn!("Sampler connection {} errored: {}", connection, e),
                                None => tracing::warn!("Sampler connection {} closed", connection),
                            }
                            supervisor.on_disconnected(connection)
                        }
                        LinkEvent::ChildExited { generation, pid, status } => {
                            tracing::info!(
                                "Sampler generation {} (PID: {}) exited: {}",
                                generation,
                                pid.map(|id| id.to_string()).unwrap_or_else(|| "unknown".into()),
                                status
                            );
                            supervisor.on_child_exited(generation)
                        }
                        LinkEvent::RelaunchDue => supervisor.on_relaunch_due(),
                    };
                    if let Some(launch) = launch {
                        self.start_sampler(launch, &launcher, &mut supervisor, &events_tx);
                    }
                }
                _ = inbound.closed() => {
                    tracing::info!("Consumer stopped, shutting down transport");
                    return Ok(());
                }
            }
        }
    }

    fn start_sampler<L: Launcher>(
        &self,
        launch: Launch,
        launcher: &L,
        supervisor: &mut Supervisor,
        events: &mpsc::Sender<LinkEvent>,
    ) {
        let generation = launch.generation;
        match launcher.launch(self.addr) {
            Ok(process) => {
                let events = events.clone();
                let pid = process.pid;
                tokio::spawn(async move {
                    let status = process.exit.await;
                    send_or_log(
                        &events,
                        LinkEvent::ChildExited {
                            generation,
                            pid,
                            status,
                        },
                        "sampler exit event",
                    )
                    .await;
                });
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to launch sampler (retrying in {:?}): {:#}",
                    self.relaunch_backoff,
                    e
                );
                supervisor.on_launch_failed(generation);
                let events = events.clone();
                let backoff = self.relaunch_backoff;
                tokio::spawn(async move {
                    tokio::time::sleep(backoff).await;
                    send_or_log(&events, LinkEvent::RelaunchDue, "relaunch event").await;
                });
            }
        }
    }
}

/// Wait for the next heartbeat; never resolves once the heartbeat stopped
async fn next_beat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn forward_frame(text: &str, inbound: &mpsc::Sender<WireMessage>) {
    match decode_frame(text) {
        Ok(message) => {
            send_or_log(inbound, message, "inbound message").await;
        }
        Err(FrameError::Heartbeat) => {}
        Err(FrameError::Empty) => tracing::debug!("Dropping empty frame"),
        Err(e) => tracing::warn!("Dropping inbound frame: {}", e),
    }
}

/// Finish the websocket upgrade and ask the supervisor to admit the socket
async fn open_connection(
    connection: u64,
    stream: TcpStream,
    peer: SocketAddr,
    handshake_timeout: Duration,
    events: &mpsc::Sender<LinkEvent>,
) -> Option<WebSocketStream<TcpStream>> {
    let handshake = tokio_tungstenite::accept_async(stream);
    let mut ws = match tokio::time::timeout(handshake_timeout, handshake).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            tracing::warn!("Websocket handshake with {} failed: {}", peer, e);
            return None;
        }
        Err(_) => {
            tracing::warn!(
                "Websocket handshake with {} timed out after {:?}",
                peer,
                handshake_timeout
            );
            return None;
        }
    };

    let (admit, admitted) = oneshot::channel();
    let event = LinkEvent::Connected {
        connection,
        peer,
        admit,
    };
    if !send_or_log(events, event, "connection event").await {
        return None;
    }
    if admitted.await.unwrap_or(false) {
        Some(ws)
    } else {
        let _ = ws.close(None).await;
        None
    }
}

async fn handle_connection(
    connection: u64,
    stream: TcpStream,
    peer: SocketAddr,
    handshake_timeout: Duration,
    heartbeat_every: Duration,
    inbound: mpsc::Sender<WireMessage>,
    events: mpsc::Sender<LinkEvent>,
) {
    let Some(ws) = open_connection(connection, stream, peer, handshake_timeout, &events).await else {
        return;
    };
    let (mut sink, mut stream) = ws.split();
    let mut heartbeat = Some(tokio::time::interval_at(
        Instant::now() + heartbeat_every,
        heartbeat_every,
    ));
    let mut error = None;

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => forward_frame(text.as_str(), &inbound).await,
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => forward_frame(text, &inbound).await,
                    Err(_) => tracing::warn!("Dropping non-UTF-8 frame ({} bytes)", bytes.len()),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error = Some(e.to_string());
                    break;
                }
            },
            _ = next_beat(&mut heartbeat) => {
                if sink.send(Message::Text(HEARTBEAT_FRAME.into())).await.is_err() {
                    tracing::debug!("Connection {} no longer open, stopping heartbeat", connection);
                    heartbeat = None;
                }
            }
            _ = inbound.closed() => {
                // Consumer is gone; closing the socket makes the sampler exit
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    send_or_log(
        &events,
        LinkEvent::Closed { connection, error },
        "connection close event",
    )
    .await;
}

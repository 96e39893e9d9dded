//! Sampler supervision state machine.
//!
//! ```text
//!  NotStarted ──listening──▶ Launching ──connected──▶ Connected
//!                              ▲   │                      │
//!                              │   └─child exited─┐       │ closed / error
//!                              │                  ▼       ▼
//!                              └──────launch─── Disconnected
//! ```
//!
//! Every launch gets a new generation number and every accepted socket a
//! connection id, so events belonging to an earlier launch or socket are
//! ignored. A launch is only issued from `NotStarted` or `Disconnected`, and a
//! connection is only admitted while `Launching`, which guarantees at most one
//! sampler starting or connected at a time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Launching { generation: u64 },
    Connected { generation: u64, connection: u64 },
    Disconnected,
}

/// Instruction to start a sampler process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launch {
    pub generation: u64,
}

#[derive(Debug)]
pub struct Supervisor {
    state: SupervisorState,
    generation: u64,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            state: SupervisorState::NotStarted,
            generation: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Number of launches issued so far
    pub fn launches(&self) -> u64 {
        self.generation
    }

    fn launch(&mut self) -> Launch {
        self.generation += 1;
        self.state = SupervisorState::Launching {
            generation: self.generation,
        };
        tracing::info!("Supervisor: launching sampler (generation {})", self.generation);
        Launch {
            generation: self.generation,
        }
    }

    /// The listening endpoint is up
    pub fn on_listening(&mut self) -> Option<Launch> {
        match self.state {
            SupervisorState::NotStarted => Some(self.launch()),
            _ => None,
        }
    }

    /// A sampler finished its handshake. Only the connection answering the
    /// current launch is taken; anything else is turned away so it can
    /// never displace or outlive the active sampler.
    pub fn on_connected(&mut self, connection: u64) -> bool {
        match self.state {
            SupervisorState::Launching { generation } => {
                tracing::info!("Supervisor: sampler connected (connection {})", connection);
                self.state = SupervisorState::Connected {
                    generation,
                    connection,
                };
                true
            }
            state => {
                tracing::warn!(
                    "Supervisor: rejecting connection {} while {:?}",
                    connection,
                    state
                );
                false
            }
        }
    }

    /// The socket closed or errored; relaunch if it was the active one
    pub fn on_disconnected(&mut self, connection: u64) -> Option<Launch> {
        match self.state {
            SupervisorState::Connected {
                connection: active, ..
            } if active == connection => {
                tracing::warn!("Supervisor: sampler connection {} lost", connection);
                self.state = SupervisorState::Disconnected;
                Some(self.launch())
            }
            _ => {
                tracing::debug!("Supervisor: ignoring close of stale connection {}", connection);
                None
            }
        }
    }

    /// A sampler process exited. Only matters if it never connected; a
    /// connected sampler's exit shows up as a socket close.
    pub fn on_child_exited(&mut self, generation: u64) -> Option<Launch> {
        match self.state {
            SupervisorState::Launching { generation: g } if g == generation => {
                tracing::warn!(
                    "Supervisor: sampler generation {} exited before connecting",
                    generation
                );
                self.state = SupervisorState::Disconnected;
                Some(self.launch())
            }
            _ => None,
        }
    }

    /// Spawning the process failed; wait for [`Supervisor::on_relaunch_due`]
    pub fn on_launch_failed(&mut self, generation: u64) {
        if self.state == (SupervisorState::Launching { generation }) {
            self.state = SupervisorState::Disconnected;
        }
    }

    /// The relaunch backoff after a failed spawn elapsed
    pub fn on_relaunch_due(&mut self) -> Option<Launch> {
        match self.state {
            SupervisorState::Disconnected => Some(self.launch()),
            _ => None,
        }
    }
}

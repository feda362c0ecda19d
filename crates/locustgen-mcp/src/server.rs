use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use locustgen_core::session::{SessionId, SessionLimits, SessionRegistry, SweepAction};
use locustgen_core::LocustgenError;

use crate::commands::{self, CommandState};
use crate::protocol::{CommandEnvelope, CommandResponse};

/// Instructions pushed from the manager to a connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// Send a liveness probe.
    Probe,
    /// Close the connection; the session is already gone.
    Close,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the connection.
    Graceful,
    /// The transport failed.
    Abrupt(String),
    /// The liveness sweep gave up on the peer.
    Expired,
    /// The server is shutting down.
    Shutdown,
}

struct Inner {
    registry: SessionRegistry,
    outbound: HashMap<SessionId, mpsc::UnboundedSender<SessionSignal>>,
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owns the live connection set and routes admitted commands to handlers.
///
/// The registry lock is only held for bookkeeping, never across a command,
/// so a long `run` on one connection does not stall the others.
pub struct SessionManager {
    inner: Mutex<Inner>,
    commands: CommandState,
}

impl SessionManager {
    pub fn new(limits: SessionLimits, commands: CommandState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                registry: SessionRegistry::new(limits),
                outbound: HashMap::new(),
            }),
            commands,
        }
    }

    /// Register a connection that is still handshaking. The receiver
    /// carries probe and close requests for it.
    pub async fn connect(
        &self,
        peer: Option<String>,
        now: Instant,
    ) -> (SessionId, mpsc::UnboundedReceiver<SessionSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        let id = inner.registry.register(peer.clone(), now);
        inner.outbound.insert(id, tx);
        tracing::debug!(session = %id, peer = ?peer, "connection registered");
        (id, rx)
    }

    pub async fn limits(&self) -> SessionLimits {
        self.inner.lock().await.registry.limits()
    }

    pub async fn activate(&self, id: SessionId, now: Instant) -> Result<(), LocustgenError> {
        self.inner.lock().await.registry.activate(id, now)?;
        tracing::info!(session = %id, "session active");
        Ok(())
    }

    /// Handle one inbound text message: account for it, and dispatch it if
    /// the session is under its rate limit.
    ///
    /// `now` is when the message arrived; completion is recorded at `now`
    /// plus the time the command took.
    pub async fn handle_message(&self, id: SessionId, text: &str, now: Instant) -> CommandResponse {
        let parsed = serde_json::from_str::<CommandEnvelope>(text);
        let request_id = parsed.as_ref().ok().and_then(|e| e.request_id.clone());

        {
            let mut inner = self.inner.lock().await;
            if let Err(e) = inner.registry.admit(id, now) {
                tracing::warn!(session = %id, error = %e, "command refused");
                return CommandResponse::error(e.to_string()).with_request_id(request_id);
            }
            inner.registry.begin_command(id);
        }

        let started = Instant::now();
        let response = match parsed {
            Ok(envelope) => {
                tracing::debug!(session = %id, command = %envelope.command, "dispatching command");
                match commands::dispatch_command(&envelope.command, envelope.params, &self.commands)
                    .await
                {
                    Ok(result) => CommandResponse::success(result),
                    Err(e) => {
                        tracing::warn!(
                            session = %id,
                            command = %envelope.command,
                            error = %e,
                            "command failed"
                        );
                        CommandResponse::error(e.to_string())
                    }
                }
            }
            Err(e) => CommandResponse::error(format!("Invalid command envelope: {e}")),
        };

        self.inner
            .lock()
            .await
            .registry
            .end_command(id, now + started.elapsed());
        response.with_request_id(request_id)
    }

    /// Control frames keep a session alive without counting as commands.
    pub async fn record_activity(&self, id: SessionId, now: Instant) -> bool {
        self.inner.lock().await.registry.record_activity(id, now)
    }

    /// Purge a session. Safe to call for sessions the sweep already removed.
    pub async fn disconnect(&self, id: SessionId, reason: DisconnectReason) {
        let mut inner = self.inner.lock().await;
        inner.registry.begin_close(id);
        let removed = inner.registry.remove(id);
        inner.outbound.remove(&id);
        drop(inner);

        let peer = removed.as_ref().and_then(|s| s.peer()).unwrap_or("unknown");
        let connected_for = removed.as_ref().map(|s| s.connected_at().elapsed());
        let abandoned = removed.as_ref().map_or(0, |s| s.in_flight());
        if abandoned > 0 {
            tracing::warn!(session = %id, peer, abandoned, "session closed with commands in flight");
        }
        match &reason {
            DisconnectReason::Abrupt(error) => {
                tracing::error!(session = %id, peer, error = %error, "connection lost")
            }
            other => tracing::info!(
                session = %id,
                peer,
                reason = ?other,
                connected_for = ?connected_for,
                "session closed"
            ),
        }
    }

    /// One liveness pass: probe idle sessions, close expired ones. Returns
    /// the actions taken.
    pub async fn sweep(&self, now: Instant) -> Vec<(SessionId, SweepAction)> {
        let mut inner = self.inner.lock().await;
        let actions = inner.registry.sweep(now);
        for (id, action) in &actions {
            match action {
                SweepAction::Probe => {
                    if let Some(tx) = inner.outbound.get(id) {
                        let _ = tx.send(SessionSignal::Probe);
                    }
                }
                SweepAction::Close => {
                    if let Some(tx) = inner.outbound.remove(id) {
                        let _ = tx.send(SessionSignal::Close);
                    }
                    tracing::info!(session = %id, "session expired");
                }
            }
        }
        actions
    }

    /// Sweep every `interval` until `shutdown` fires.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let actions = self.sweep(Instant::now()).await;
                    if !actions.is_empty() {
                        tracing::debug!(actions = actions.len(), "liveness sweep");
                    }
                }
            }
        }
        tracing::debug!("liveness sweeper stopped");
    }

    pub async fn live_sessions(&self) -> usize {
        self.inner.lock().await.registry.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

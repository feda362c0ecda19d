use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::LocustgenError;
use crate::session::rate_limit::SlidingWindowLimiter;

pub type SessionId = Uuid;

/// Lifecycle of one connection. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Connecting,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_requests_per_minute: u32,
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
}

impl From<&SessionConfig> for SessionLimits {
    fn from(config: &SessionConfig) -> Self {
        Self {
            max_requests_per_minute: config.max_requests_per_minute,
            soft_timeout: config.soft_timeout(),
            hard_timeout: config.hard_timeout(),
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// Liveness and rate-limit bookkeeping for one connection.
#[derive(Debug, Clone)]
pub struct SessionState {
    id: SessionId,
    phase: ConnectionPhase,
    peer: Option<String>,
    connected_at: Instant,
    last_liveness_at: Instant,
    limiter: SlidingWindowLimiter,
    in_flight: u32,
}

impl SessionState {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn last_liveness_at(&self) -> Instant {
        self.last_liveness_at
    }

    /// Commands dispatched but not yet answered.
    pub fn in_flight(&self) -> u32 {
        self.in_flight
    }
}

/// What the sweep wants done to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Idle past the soft timeout: send a liveness probe.
    Probe,
    /// Idle past the hard timeout: already removed, close the transport.
    Close,
}

/// The live connection set. Owned by whoever drives the transport; nothing
/// here is global.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    limits: SessionLimits,
    sessions: HashMap<SessionId, SessionState>,
}

impl SessionRegistry {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            sessions: HashMap::new(),
        }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Track a new connection in the `Connecting` phase.
    pub fn register(&mut self, peer: Option<String>, now: Instant) -> SessionId {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionState {
                id,
                phase: ConnectionPhase::Connecting,
                peer,
                connected_at: now,
                last_liveness_at: now,
                limiter: SlidingWindowLimiter::per_minute(self.limits.max_requests_per_minute),
                in_flight: 0,
            },
        );
        id
    }

    /// `Connecting -> Active` once the handshake has been accepted.
    pub fn activate(&mut self, id: SessionId, now: Instant) -> Result<(), LocustgenError> {
        let session = self.session_mut(id)?;
        if session.phase != ConnectionPhase::Connecting {
            return Err(LocustgenError::Transport(format!(
                "session {id} cannot activate from {:?}",
                session.phase
            )));
        }
        session.phase = ConnectionPhase::Active;
        session.last_liveness_at = now;
        Ok(())
    }

    /// Count inbound traffic that is not a command (control frames) as
    /// liveness. Returns `false` for unknown or inactive sessions.
    pub fn record_activity(&mut self, id: SessionId, now: Instant) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) if session.phase == ConnectionPhase::Active => {
                session.last_liveness_at = now;
                true
            }
            _ => false,
        }
    }

    /// Account for an inbound command: refresh liveness, then check the
    /// rate limit. A rejected command still counts as liveness.
    pub fn admit(&mut self, id: SessionId, now: Instant) -> Result<(), LocustgenError> {
        let session = self.session_mut(id)?;
        if session.phase != ConnectionPhase::Active {
            return Err(LocustgenError::Transport(format!(
                "session {id} is not active ({:?})",
                session.phase
            )));
        }
        session.last_liveness_at = now;
        if !session.limiter.try_acquire(now) {
            return Err(LocustgenError::RateLimitExceeded {
                limit: session.limiter.capacity(),
            });
        }
        Ok(())
    }

    pub fn begin_command(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.in_flight += 1;
        }
    }

    /// Finishing a command counts as activity: a long run should not leave
    /// the connection looking idle.
    pub fn end_command(&mut self, id: SessionId, now: Instant) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.in_flight = session.in_flight.saturating_sub(1);
            session.last_liveness_at = session.last_liveness_at.max(now);
        }
    }

    /// Move a session to `Closing`. Returns the phase it was in.
    pub fn begin_close(&mut self, id: SessionId) -> Option<ConnectionPhase> {
        let session = self.sessions.get_mut(&id)?;
        let previous = session.phase;
        if previous != ConnectionPhase::Closed {
            session.phase = ConnectionPhase::Closing;
        }
        Some(previous)
    }

    /// Purge a session. The returned state is marked `Closed`.
    pub fn remove(&mut self, id: SessionId) -> Option<SessionState> {
        let mut session = self.sessions.remove(&id)?;
        session.phase = ConnectionPhase::Closed;
        Some(session)
    }

    /// One liveness pass. Sessions idle past the hard timeout are removed
    /// and reported as [`SweepAction::Close`]; sessions idle past the soft
    /// timeout are reported as [`SweepAction::Probe`]. Sessions with a
    /// command in flight are skipped.
    pub fn sweep(&mut self, now: Instant) -> Vec<(SessionId, SweepAction)> {
        let mut actions = Vec::new();
        for session in self.sessions.values_mut() {
            if session.in_flight > 0 {
                continue;
            }
            if !matches!(
                session.phase,
                ConnectionPhase::Connecting | ConnectionPhase::Active
            ) {
                continue;
            }
            let idle = now.saturating_duration_since(session.last_liveness_at);
            if idle > self.limits.hard_timeout {
                session.phase = ConnectionPhase::Closing;
                actions.push((session.id, SweepAction::Close));
            } else if idle > self.limits.soft_timeout && session.phase == ConnectionPhase::Active {
                actions.push((session.id, SweepAction::Probe));
            }
        }

        for (id, action) in &actions {
            if *action == SweepAction::Close {
                self.remove(*id);
            }
        }
        actions
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionState> {
        self.sessions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut SessionState, LocustgenError> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| LocustgenError::Transport(format!("unknown session {id}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

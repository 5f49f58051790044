//! Per-remote v3 session management.
//!
//! An [`EngineSession`] pairs the remote's [`RemoteEngine`] state with the
//! FIFO of requests parked behind discovery. The [`SessionCache`] keys
//! sessions by remote address and ages them out after an idle period;
//! expiry just drops state, the next request rediscovers transparently.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::instance::RequestId;
use crate::oid::Oid;
use crate::pdu::PduType;
use crate::v3::{RemoteEngine, UsmCredentials};

/// A request parked until the remote's session is ready.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub opcode: PduType,
    pub request_id: RequestId,
    pub oid: Oid,
}

/// Session state for one remote address.
pub(crate) struct EngineSession {
    pub engine: RemoteEngine,
    pending: VecDeque<PendingRequest>,
    last_used: Instant,
}

impl EngineSession {
    pub fn new(credentials: UsmCredentials) -> Self {
        Self {
            engine: RemoteEngine::new(credentials),
            pending: VecDeque::new(),
            last_used: Instant::now(),
        }
    }

    /// Adopt credentials, replacing the engine wholesale when they differ.
    ///
    /// Returns true when the engine was replaced (discovery must rerun).
    pub fn update(&mut self, credentials: &UsmCredentials) -> bool {
        if self.engine.credentials() == credentials {
            return false;
        }
        // Parked requests stay queued; they flush under the new engine
        // once its discovery completes.
        tracing::debug!(target: "snmp_query::client", "credentials changed, discarding session");
        self.engine = RemoteEngine::new(credentials.clone());
        true
    }

    /// Discard the engine and start over with the same credentials
    /// (resync after a stale-session report).
    pub fn reset(&mut self) {
        tracing::debug!(target: "snmp_query::client", "resyncing session");
        self.engine = RemoteEngine::new(self.engine.credentials().clone());
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    /// Park a request behind discovery.
    pub fn queue(&mut self, request: PendingRequest) {
        self.pending.push_back(request);
    }

    /// Drain the parked requests, FIFO.
    pub fn take_pending(&mut self) -> Vec<PendingRequest> {
        self.pending.drain(..).collect()
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
    }
}

/// Remote address -> session, with idle expiry.
pub(crate) struct SessionCache {
    sessions: HashMap<SocketAddr, EngineSession>,
    idle: Duration,
}

impl SessionCache {
    pub fn new(idle: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            idle,
        }
    }

    /// Look up the session for a remote, bumping its idle clock.
    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut EngineSession> {
        let session = self.sessions.get_mut(addr)?;
        session.touch();
        Some(session)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.sessions.contains_key(addr)
    }

    /// Fetch or create the session for a remote+credentials pair.
    ///
    /// Returns the session and whether discovery must (re)start: a fresh
    /// entry, or an existing one whose credentials changed.
    pub fn get_or_insert(
        &mut self,
        addr: SocketAddr,
        credentials: &UsmCredentials,
    ) -> (&mut EngineSession, bool) {
        match self.sessions.entry(addr) {
            std::collections::hash_map::Entry::Occupied(entry) => {
                let session = entry.into_mut();
                session.touch();
                let replaced = session.update(credentials);
                (session, replaced)
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                let session = entry.insert(EngineSession::new(credentials.clone()));
                (session, true)
            }
        }
    }

    /// Drop sessions idle longer than the configured duration.
    pub fn prune(&mut self, now: Instant) {
        let idle = self.idle;
        self.sessions.retain(|addr, session| {
            let keep = now.duration_since(session.last_used) < idle;
            if !keep {
                tracing::debug!(target: "snmp_query::client", remote = %addr, "expiring idle session");
            }
            keep
        });
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

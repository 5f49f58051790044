//! Per-remote authoritative engine state.
//!
//! A [`RemoteEngine`] holds what the client knows about one remote's
//! security engine: its id, boot count and time, plus the localized keys
//! once the id is known. The engine is not usable for authenticated
//! traffic until all three of id/boots/time are known and non-zero;
//! until then requests queue behind discovery.
//!
//! Report PDU classification lives here too: the usmStats OIDs a remote
//! answers with decide between "run discovery again" and "authentication
//! failed".

use std::time::Instant;

use bytes::Bytes;

use super::{LocalizedKey, PrivKey, SaltCounter, UsmCredentials, UsmSecurityParams};
use crate::oid::Oid;
use crate::varbind::VarBind;

/// The reserved identifier queried during engine discovery.
pub const DISCOVERY_OID: [u32; 2] = [1, 1];

/// usmStats subtree (RFC 3414 Section 5): 1.3.6.1.6.3.15.1.1
const USM_STATS: [u32; 9] = [1, 3, 6, 1, 6, 3, 15, 1, 1];
/// usmStatsNotInTimeWindows: 1.3.6.1.6.3.15.1.1.2
const NOT_IN_TIME_WINDOWS: [u32; 10] = [1, 3, 6, 1, 6, 3, 15, 1, 1, 2];
/// usmStatsUnknownEngineIDs: 1.3.6.1.6.3.15.1.1.4
const UNKNOWN_ENGINE_IDS: [u32; 10] = [1, 3, 6, 1, 6, 3, 15, 1, 1, 4];

/// Outcome of classifying a Report PDU's varbinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportClass {
    /// The remote does not recognize our session (unknown engine id or
    /// stale time window). Discovery must run (again).
    NotSynced,
    /// Credentials were rejected. Terminal, no rediscovery.
    AuthFailed,
}

/// Classify a Report PDU by its usmStats varbinds.
///
/// Returns `None` when no varbind falls under the usmStats subtree.
pub fn classify_report(varbinds: &[VarBind]) -> Option<ReportClass> {
    let usm_stats = Oid::from_slice(&USM_STATS);
    let not_in_time = Oid::from_slice(&NOT_IN_TIME_WINDOWS);
    let unknown_engine = Oid::from_slice(&UNKNOWN_ENGINE_IDS);

    for vb in varbinds {
        if vb.oid.starts_with(&unknown_engine) || vb.oid.starts_with(&not_in_time) {
            return Some(ReportClass::NotSynced);
        }
        if vb.oid.starts_with(&usm_stats) {
            return Some(ReportClass::AuthFailed);
        }
    }
    None
}

/// Mutable per-remote session state for SNMPv3.
///
/// Owned by the session manager for exactly one remote address and replaced
/// wholesale whenever credentials change or a resync is required.
pub struct RemoteEngine {
    credentials: UsmCredentials,
    engine_id: Bytes,
    engine_boots: u32,
    engine_time: u32,
    /// Local instant the time value was received, so current_time() can
    /// extrapolate without another exchange.
    synced_at: Instant,
    auth_key: Option<LocalizedKey>,
    priv_key: Option<PrivKey>,
    salt: SaltCounter,
}

impl RemoteEngine {
    /// Fresh, undiscovered engine state for the given credentials.
    pub fn new(credentials: UsmCredentials) -> Self {
        Self {
            credentials,
            engine_id: Bytes::new(),
            engine_boots: 0,
            engine_time: 0,
            synced_at: Instant::now(),
            auth_key: None,
            priv_key: None,
            salt: SaltCounter::new(),
        }
    }

    /// The credentials this engine was created for.
    pub fn credentials(&self) -> &UsmCredentials {
        &self.credentials
    }

    /// Ready for authenticated traffic: id known, boots and time non-zero.
    pub fn is_ready(&self) -> bool {
        !self.engine_id.is_empty() && self.engine_boots != 0 && self.engine_time != 0
    }

    /// Authoritative engine id as last reported.
    pub fn engine_id(&self) -> &Bytes {
        &self.engine_id
    }

    /// Boot counter as last reported.
    pub fn engine_boots(&self) -> u32 {
        self.engine_boots
    }

    /// Engine time extrapolated from the last sync.
    pub fn current_time(&self) -> u32 {
        if self.engine_time == 0 {
            return 0;
        }
        self.engine_time
            .saturating_add(self.synced_at.elapsed().as_secs() as u32)
    }

    /// Absorb engine id/boots/time from a received message's USM params.
    ///
    /// Every v3 packet from the remote carries these; zero/empty fields are
    /// left alone so a sparse header cannot un-discover the session. Keys
    /// are (re)derived when the engine id changes.
    pub fn absorb(&mut self, usm: &UsmSecurityParams) {
        if !usm.engine_id.is_empty() && usm.engine_id != self.engine_id {
            self.engine_id = usm.engine_id.clone();
            self.derive_keys();
        }
        if usm.engine_boots != 0 {
            self.engine_boots = usm.engine_boots;
        }
        if usm.engine_time != 0 {
            self.engine_time = usm.engine_time;
            self.synced_at = Instant::now();
        }
    }

    fn derive_keys(&mut self) {
        self.auth_key = self
            .credentials
            .auth
            .as_ref()
            .map(|(protocol, password)| {
                LocalizedKey::from_password(*protocol, password.as_bytes(), &self.engine_id)
            });
        self.priv_key = match (&self.credentials.auth, &self.credentials.privacy) {
            (Some((auth_protocol, _)), Some((protocol, password))) => Some(PrivKey::from_password(
                *auth_protocol,
                *protocol,
                password.as_bytes(),
                &self.engine_id,
            )),
            _ => None,
        };
    }

    /// Localized authentication key, present once the engine id is known.
    pub fn auth_key(&self) -> Option<&LocalizedKey> {
        self.auth_key.as_ref()
    }

    /// Localized privacy key, present once the engine id is known.
    pub fn priv_key(&self) -> Option<&PrivKey> {
        self.priv_key.as_ref()
    }

    /// Next privacy salt.
    pub fn next_salt(&self) -> u64 {
        self.salt.next()
    }
}

impl std::fmt::Debug for RemoteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEngine")
            .field("engine_id", &self.engine_id)
            .field("engine_boots", &self.engine_boots)
            .field("engine_time", &self.engine_time)
            .field("ready", &self.is_ready())
            .finish()
    }
}

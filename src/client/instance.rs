//! Request-id allocation, per-query state, and response correlation.
//!
//! Every wire exchange carries a [`RequestId`]. An [`Instance`] is one
//! logical query; it may consume several request ids over its life as the
//! walk re-arms. The [`InstanceTable`] maps live ids to instances and is
//! only ever touched from the driver task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::Auth;
use crate::error::Error;
use crate::message::{BROADCAST_REQUEST_ID, ResponseStatus};
use crate::oid::Oid;
use crate::pdu::PduType;
use crate::varbind::VarBind;

/// Correlation id for one wire exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(i32);

impl RequestId {
    /// Reserved id addressed at every in-flight query at once. Discovery
    /// requests go out under it; the allocator never hands it out.
    pub const BROADCAST: RequestId = RequestId(BROADCAST_REQUEST_ID);

    /// Wrap a wire-level id.
    pub fn from_wire(raw: i32) -> Self {
        Self(raw)
    }

    /// The wire-level value.
    pub fn raw(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

const MAX_REQUEST_ID: i32 = 2_000_000_000;
const INITIAL_VARIABILITY: i32 = 100_000;

/// Request id allocator.
///
/// Monotonically increasing from a random offset; wraps back to a fresh
/// random offset long before the broadcast sentinel. Mutex-guarded because
/// several engines may share one provider (ids must stay distinct across
/// them), even though each engine's own state is single-task.
pub struct RequestIdProvider {
    next: Mutex<i32>,
}

impl RequestIdProvider {
    /// Create a provider; the first call to [`next`](Self::next) picks a
    /// random starting offset.
    pub fn new() -> Self {
        Self {
            next: Mutex::new(MAX_REQUEST_ID),
        }
    }

    /// Allocate the next id.
    pub fn next(&self) -> RequestId {
        let mut next = self.next.lock().expect("request id lock");
        if *next >= MAX_REQUEST_ID {
            *next = 1 + random_offset();
        }
        let id = *next;
        *next += 1;
        RequestId(id)
    }
}

impl Default for RequestIdProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn random_offset() -> i32 {
    let mut buf = [0u8; 4];
    // The OS random source not being available is unrecoverable
    getrandom::fill(&mut buf).expect("OS random source");
    (i32::from_ne_bytes(buf) & i32::MAX) % INITIAL_VARIABILITY
}

/// Events a query delivers to its caller.
#[derive(Debug)]
pub(crate) enum QueryEvent {
    Result(VarBind),
    Finished,
    Failed(Error),
}

pub(crate) type QuerySink = mpsc::UnboundedSender<QueryEvent>;

/// Where the walk currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryState {
    /// Initial GET for the caller's identifier is in flight.
    AwaitingGet,
    /// Walking the subtree with GETBULK pages.
    AwaitingBulk,
}

/// What the driver must do with an instance after it handled a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Terminal: the caller has been notified, drop the instance.
    Done,
    /// Not for us to act on; keep the instance registered under its id.
    Keep,
    /// Re-arm under a fresh id and send the current opcode at the cursor.
    Resend,
}

/// One in-flight logical query.
pub(crate) struct Instance {
    pub target: SocketAddr,
    pub auth: Auth,
    /// The caller's identifier, fixed for the life of the query; the
    /// subtree-membership check runs against it.
    initial_oid: Oid,
    /// The walk's cursor; advances as pages are consumed.
    cursor: Oid,
    state: QueryState,
    /// Current wire opcode.
    pub opcode: PduType,
    /// Currently-assigned request id; rewritten on every re-arm.
    pub request_id: RequestId,
    count: usize,
    max_results: Option<usize>,
    sink: Option<QuerySink>,
    pub created: Instant,
    pub last_sent: Instant,
    /// Per-instance resend threshold, jittered to avoid synchronized
    /// repeats across queries started together.
    pub repeat_delay: Duration,
}

impl Instance {
    pub fn new(
        target: SocketAddr,
        auth: Auth,
        oid: Oid,
        max_results: Option<usize>,
        sink: QuerySink,
        repeat_delay: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            target,
            auth,
            initial_oid: oid.clone(),
            cursor: oid,
            state: QueryState::AwaitingGet,
            opcode: PduType::GetRequest,
            request_id: RequestId::BROADCAST,
            count: 0,
            max_results,
            sink: Some(sink),
            created: now,
            last_sent: now,
            repeat_delay,
        }
    }

    /// The identifier the next wire exchange asks for.
    pub fn cursor(&self) -> &Oid {
        &self.cursor
    }

    /// Whether a terminal transition has already run.
    pub fn is_terminated(&self) -> bool {
        self.sink.is_none()
    }

    /// Apply a correlated response and decide what happens next.
    ///
    /// This is the walk/fallback state machine. It never writes to the
    /// wire itself; a [`Disposition::Resend`] tells the driver to re-key
    /// and send.
    pub fn handle(&mut self, status: ResponseStatus, results: &[VarBind]) -> Disposition {
        if self.is_terminated() {
            tracing::trace!(target: "snmp_query::client", "received more but finished");
            return Disposition::Done;
        }

        match status {
            ResponseStatus::NotSynced => {
                // A resync is already in flight on the session manager
                tracing::trace!(target: "snmp_query::client", id = %self.request_id, "not synced, ignored");
                Disposition::Keep
            }
            ResponseStatus::AuthFailed => {
                self.fail(Error::AuthenticationFailed {
                    target: Some(self.target),
                });
                Disposition::Done
            }
            ResponseStatus::Timeout => {
                self.fail(self.timeout_error(Instant::now()));
                Disposition::Done
            }
            ResponseStatus::Retry => {
                tracing::trace!(target: "snmp_query::client", oid = %self.cursor, "session re-established, repeating");
                Disposition::Resend
            }
            ResponseStatus::Success | ResponseStatus::Error { .. } => match self.state {
                QueryState::AwaitingGet => self.handle_get(status, results),
                QueryState::AwaitingBulk => self.handle_bulk(status, results),
            },
        }
    }

    /// GET outcome: a scalar hit ends the query; anything else falls back
    /// to a GETBULK walk from the same identifier.
    fn handle_get(&mut self, status: ResponseStatus, results: &[VarBind]) -> Disposition {
        if status == ResponseStatus::Success
            && results.len() == 1
            && results[0].has_value()
            && results[0].oid == self.cursor
        {
            tracing::trace!(target: "snmp_query::client", result = %results[0], "scalar found");
            self.deliver(results[0].clone());
            self.finish();
            return Disposition::Done;
        }

        tracing::trace!(
            target: "snmp_query::client",
            oid = %self.cursor,
            ?status,
            "falling back to GETBULK"
        );
        self.state = QueryState::AwaitingBulk;
        self.opcode = PduType::GetBulkRequest;
        Disposition::Resend
    }

    /// GETBULK page: deliver in-subtree entries in wire order, then either
    /// continue from the last delivered identifier or finish. Leaving the
    /// subtree mid-page discards the rest of the page; entries are ordered,
    /// so past the subtree means exhausted.
    fn handle_bulk(&mut self, status: ResponseStatus, results: &[VarBind]) -> Disposition {
        if status != ResponseStatus::Success {
            // End of data, not an error to the caller
            self.finish();
            return Disposition::Done;
        }

        let mut last: Option<Oid> = None;
        for result in results {
            if !result.has_value() {
                continue;
            }
            if !result.oid.starts_with(&self.initial_oid) {
                tracing::trace!(
                    target: "snmp_query::client",
                    oid = %result.oid,
                    base = %self.initial_oid,
                    "left subtree"
                );
                last = None;
                break;
            }
            if let Some(max) = self.max_results
                && self.count >= max
            {
                tracing::warn!(target: "snmp_query::client", oid = %self.cursor, max, "result limit reached");
                last = None;
                break;
            }
            self.count += 1;
            self.deliver(result.clone());
            last = Some(result.oid.clone());
        }

        match last {
            Some(oid) => {
                tracing::trace!(target: "snmp_query::client", from = %oid, "continuing walk");
                self.cursor = oid;
                Disposition::Resend
            }
            None => {
                self.finish();
                Disposition::Done
            }
        }
    }

    /// The timeout error for this query as of `now`.
    pub fn timeout_error(&self, now: Instant) -> Error {
        Error::Timeout {
            target: self.target,
            elapsed: now.duration_since(self.created),
            oid: self.initial_oid.clone(),
        }
    }

    fn deliver(&self, result: VarBind) {
        if let Some(sink) = &self.sink {
            let _ = sink.send(QueryEvent::Result(result));
        }
    }

    fn finish(&mut self) {
        if let Some(sink) = self.sink.take() {
            let _ = sink.send(QueryEvent::Finished);
        }
    }

    /// Terminal failure; the sink is cleared so a second terminal
    /// transition is impossible.
    pub fn fail(&mut self, error: Error) {
        if let Some(sink) = self.sink.take() {
            let _ = sink.send(QueryEvent::Failed(error));
        }
    }
}

/// Live request id -> instance mapping.
pub(crate) struct InstanceTable {
    instances: HashMap<RequestId, Instance>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    /// Register an instance under a freshly allocated id.
    ///
    /// Any prior mapping for the instance is removed first, so re-arming
    /// never leaks a stale id. On the (astronomically unlikely) id
    /// collision the request is dropped rather than overwriting a live
    /// mapping; dropping the sink unblocks the caller.
    pub fn register(&mut self, mut instance: Instance, provider: &RequestIdProvider) -> Option<RequestId> {
        self.instances.remove(&instance.request_id);

        let id = provider.next();
        if self.instances.contains_key(&id) {
            tracing::warn!(
                target: "snmp_query::client",
                "the maximum number of simultaneous requests has been reached"
            );
            return None;
        }

        tracing::trace!(target: "snmp_query::client", %id, "new instance id");
        instance.request_id = id;
        self.instances.insert(id, instance);
        Some(id)
    }

    /// Put an instance back under its current id (after a Keep).
    pub fn insert_back(&mut self, instance: Instance) {
        self.instances.insert(instance.request_id, instance);
    }

    pub fn remove(&mut self, id: RequestId) -> Option<Instance> {
        self.instances.remove(&id)
    }

    pub fn get(&self, id: RequestId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut Instance> {
        self.instances.get_mut(&id)
    }

    /// Drain every registered instance (broadcast dispatch).
    pub fn drain(&mut self) -> Vec<Instance> {
        self.instances.drain().map(|(_, v)| v).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RequestId, &Instance)> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Terminate every instance with a closed outcome and clear the map.
    pub fn close_all(&mut self) {
        for (_, mut instance) in self.instances.drain() {
            instance.fail(Error::Closed);
        }
    }
}

//! SNMP query client.
//!
//! One [`Client`] drives any number of concurrent queries against any
//! number of remotes over a single datagram socket. A query starts as a
//! GET for the caller's identifier; when the identifier turns out not to
//! name a scalar, the query transparently mutates into a GETBULK subtree
//! walk. SNMPv3 sessions bootstrap themselves: the first request against a
//! remote parks behind engine discovery and is released once the remote's
//! engine id, boot count and time are known.
//!
//! All protocol state lives in one spawned driver task; clients are cheap
//! clonable handles. Nothing in the driver blocks: a dead remote is a
//! future timeout, never a stuck task.

mod instance;
mod session;
mod timeout;

pub use instance::{RequestId, RequestIdProvider};
pub use timeout::TimedQuery;

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::message::{
    BROADCAST_REQUEST_ID, CommunityMessage, DecodedResponse, ResponseStatus, decode_response, v3,
};
use crate::oid::Oid;
use crate::pdu::{Pdu, PduType};
use crate::transport::{DatagramTransport, UdpTransport};
use crate::v3::{DISCOVERY_OID, UsmCredentials};
use crate::varbind::VarBind;

use instance::{Disposition, Instance, InstanceTable, QueryEvent, QuerySink};
use session::{PendingRequest, SessionCache};

/// Credentials for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// v2c community string.
    Community(Bytes),
    /// v3 USM credentials.
    Usm(UsmCredentials),
}

impl Auth {
    /// v2c community credentials.
    pub fn community(community: impl Into<Bytes>) -> Self {
        Self::Community(community.into())
    }

    /// v3 USM credentials.
    pub fn usm(credentials: UsmCredentials) -> Self {
        Self::Usm(credentials)
    }
}

impl From<UsmCredentials> for Auth {
    fn from(credentials: UsmCredentials) -> Self {
        Self::Usm(credentials)
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Max-repetitions for each GETBULK page (default: 25).
    pub bulk_size: i32,
    /// Ceiling on results delivered by a single query; guards against
    /// unbounded subtrees (default: None, unlimited).
    pub max_results: Option<usize>,
    /// Absolute per-query timeout (default: 10 seconds).
    pub timeout: Duration,
    /// Period of the repeat/timeout tick (default: 250 ms).
    pub repeat_interval: Duration,
    /// Minimum quiet time before a request is re-sent (default: 1 second).
    pub min_repeat_delay: Duration,
    /// Span of the per-query jitter applied to the repeat delay, centered
    /// on zero (default: 500 ms).
    pub repeat_randomization: Duration,
    /// Idle time after which a remote's v3 session state is dropped and
    /// rediscovered on next use (default: 10 minutes).
    pub session_idle: Duration,
    /// Receive buffer size; the maximum UDP payload (default: 65507).
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bulk_size: 25,
            max_results: None,
            timeout: Duration::from_secs(10),
            repeat_interval: Duration::from_millis(250),
            min_repeat_delay: Duration::from_secs(1),
            repeat_randomization: Duration::from_millis(500),
            session_idle: Duration::from_secs(600),
            max_message_size: 65507,
        }
    }
}

enum Command {
    Query {
        target: SocketAddr,
        auth: Auth,
        oid: Oid,
        sink: QuerySink,
    },
}

/// Handle to a running SNMP query engine.
///
/// Cloning is cheap; all clones drive the same engine. The engine shuts
/// down on [`close`](Self::close) or when the last handle is dropped.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
}

impl Client {
    /// Start building a client bound to a UDP socket.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Start an engine over an arbitrary transport.
    ///
    /// Must be called within a Tokio runtime; the driver task is spawned
    /// immediately.
    pub fn with_transport<T: DatagramTransport>(
        transport: T,
        config: ClientConfig,
        request_ids: Arc<RequestIdProvider>,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let driver = Driver {
            transport: Arc::new(transport),
            instances: InstanceTable::new(),
            sessions: SessionCache::new(config.session_idle),
            provider: request_ids,
            config,
        };
        tokio::spawn(driver.run(rx, cancel.clone()));

        Self { commands, cancel }
    }

    /// Query a remote for the value(s) at an identifier.
    ///
    /// Yields zero or more results followed by exactly one terminal
    /// signal: end-of-stream on success, a single `Err` on failure. A
    /// scalar identifier yields its one value; a non-leaf identifier
    /// yields every descendant in ascending order; an identifier with no
    /// entries yields nothing and finishes.
    pub fn get(&self, target: SocketAddr, auth: Auth, oid: Oid) -> QueryStream {
        let (sink, rx) = mpsc::unbounded_channel();
        let stream = QueryStream {
            rx,
            done: false,
            target,
            oid: oid.clone(),
        };
        // A closed engine drops the sink; the stream reports Closed.
        let _ = self.commands.send(Command::Query {
            target,
            auth,
            oid,
            sink,
        });
        stream
    }

    /// Build a callback-style query.
    pub fn request(&self) -> QueryRequest {
        QueryRequest {
            client: self.clone(),
            receiver: None,
            finished: None,
            failure: None,
        }
    }

    /// Terminate every in-flight query and release the transport.
    ///
    /// Idempotent; safe to call from any task.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    bind: SocketAddr,
    config: ClientConfig,
    request_ids: Option<Arc<RequestIdProvider>>,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            config: ClientConfig::default(),
            request_ids: None,
        }
    }

    /// Local bind address (default `0.0.0.0:0`).
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind = addr;
        self
    }

    /// Absolute per-query timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Max-repetitions per GETBULK page.
    pub fn bulk_size(mut self, bulk_size: i32) -> Self {
        self.config.bulk_size = bulk_size;
        self
    }

    /// Ceiling on results delivered by one query.
    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = Some(max);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a request-id allocator between engines.
    ///
    /// By default every engine gets its own; inject one when several
    /// engines answer over the same socket namespace and id collisions
    /// across them would be a correctness hazard.
    pub fn request_ids(mut self, provider: Arc<RequestIdProvider>) -> Self {
        self.request_ids = Some(provider);
        self
    }

    /// Bind the socket and start the engine.
    ///
    /// Must be called within a Tokio runtime.
    pub fn open(self) -> Result<Client> {
        let transport = UdpTransport::bind(self.bind)?;
        let provider = self
            .request_ids
            .unwrap_or_else(|| Arc::new(RequestIdProvider::new()));
        Ok(Client::with_transport(transport, self.config, provider))
    }
}

// ============================================================================
// Caller-facing query surfaces
// ============================================================================

/// Stream of results for one query.
///
/// Zero or more `Ok(VarBind)` items, then either clean end-of-stream
/// (finished) or exactly one `Err` (failed) and end-of-stream.
pub struct QueryStream {
    rx: mpsc::UnboundedReceiver<QueryEvent>,
    done: bool,
    pub(crate) target: SocketAddr,
    pub(crate) oid: Oid,
}

impl QueryStream {
    /// Next result, or `None` when the query finished.
    pub async fn next(&mut self) -> Option<Result<VarBind>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Collect all results.
    pub async fn collect(mut self) -> Result<Vec<VarBind>> {
        let mut results = Vec::new();
        while let Some(item) = self.next().await {
            results.push(item?);
        }
        Ok(results)
    }

    /// Decorate this query with an externally owned timer.
    ///
    /// The timer fires a Timeout failure if no packet arrives within
    /// `duration`; every received result resets it.
    pub fn with_timeout(self, duration: Duration) -> TimedQuery {
        TimedQuery::wrap(duration, self)
    }
}

impl Stream for QueryStream {
    type Item = Result<VarBind>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(QueryEvent::Result(vb))) => Poll::Ready(Some(Ok(vb))),
            Poll::Ready(Some(QueryEvent::Finished)) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(QueryEvent::Failed(e))) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            // Engine dropped the query without a terminal event
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(Some(Err(Error::Closed)))
            }
        }
    }
}

/// Callback-style query builder, for callers that push rather than poll.
pub struct QueryRequest {
    client: Client,
    receiver: Option<Box<dyn FnMut(VarBind) + Send>>,
    finished: Option<Box<dyn FnOnce() + Send>>,
    failure: Option<Box<dyn FnOnce(Error) + Send>>,
}

impl QueryRequest {
    /// Callback invoked per result.
    pub fn receiving(mut self, f: impl FnMut(VarBind) + Send + 'static) -> Self {
        self.receiver = Some(Box::new(f));
        self
    }

    /// Callback invoked once on clean completion.
    pub fn finished(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.finished = Some(Box::new(f));
        self
    }

    /// Callback invoked once on failure.
    pub fn failing(mut self, f: impl FnOnce(Error) + Send + 'static) -> Self {
        self.failure = Some(Box::new(f));
        self
    }

    /// Issue the query; callbacks fire from a background task.
    pub fn get(self, target: SocketAddr, auth: Auth, oid: Oid) {
        let mut stream = self.client.get(target, auth, oid);
        let mut receiver = self.receiver;
        let finished = self.finished;
        let failure = self.failure;

        tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(result)) => {
                        if let Some(f) = receiver.as_mut() {
                            f(result);
                        }
                    }
                    Some(Err(e)) => {
                        if let Some(f) = failure {
                            f(e);
                        }
                        return;
                    }
                    None => {
                        if let Some(f) = finished {
                            f();
                        }
                        return;
                    }
                }
            }
        });
    }
}

// ============================================================================
// Driver
// ============================================================================

struct Driver<T: DatagramTransport> {
    transport: Arc<T>,
    instances: InstanceTable,
    sessions: SessionCache,
    provider: Arc<RequestIdProvider>,
    config: ClientConfig,
}

impl<T: DatagramTransport> Driver<T> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.config.repeat_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut buf = vec![0u8; self.config.max_message_size];
        let transport = self.transport.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(Command::Query { target, auth, oid, sink }) => {
                        self.start_query(target, auth, oid, sink).await;
                    }
                    // All client handles dropped
                    None => break,
                },
                received = transport.recv_from(&mut buf) => match received {
                    Ok((len, source)) => {
                        let data = Bytes::copy_from_slice(&buf[..len]);
                        self.on_packet(data, source).await;
                    }
                    Err(e) => {
                        // A receive error must not take the engine down
                        tracing::error!(target: "snmp_query::client", error = %e, "transport receive error");
                    }
                },
                _ = tick.tick() => self.on_tick().await,
            }
        }

        self.instances.close_all();
    }

    async fn start_query(&mut self, target: SocketAddr, auth: Auth, oid: Oid, sink: QuerySink) {
        tracing::debug!(target: "snmp_query::client", remote = %target, oid = %oid, "starting query");
        let repeat_delay = self.repeat_delay();
        let instance = Instance::new(
            target,
            auth,
            oid,
            self.config.max_results,
            sink,
            repeat_delay,
        );
        if let Some(id) = self.instances.register(instance, &self.provider) {
            self.write_instance(id).await;
        }
    }

    /// Encode and send (or park) the current request of an instance.
    async fn write_instance(&mut self, id: RequestId) {
        enum Plan {
            Community { target: SocketAddr, bytes: Bytes },
            Usm { target: SocketAddr, credentials: UsmCredentials },
        }

        let plan = match self.instances.get(id) {
            None => return,
            Some(inst) => match &inst.auth {
                Auth::Community(community) => {
                    let pdu = build_pdu(inst.opcode, id.raw(), inst.cursor(), self.config.bulk_size);
                    tracing::trace!(
                        target: "snmp_query::client",
                        opcode = %inst.opcode,
                        oid = %inst.cursor(),
                        %id,
                        "writing request"
                    );
                    Plan::Community {
                        target: inst.target,
                        bytes: CommunityMessage::new(community.clone(), pdu).encode(),
                    }
                }
                Auth::Usm(credentials) => Plan::Usm {
                    target: inst.target,
                    credentials: credentials.clone(),
                },
            },
        };

        match plan {
            Plan::Community { target, bytes } => {
                if let Err(e) = self.transport.send_to(&bytes, target).await {
                    tracing::warn!(target: "snmp_query::client", remote = %target, error = %e, "send failed");
                }
            }
            Plan::Usm {
                target,
                credentials,
            } => {
                // An expired session is recreated here; rediscovery is
                // transparent to the caller.
                let (session, _) = self.sessions.get_or_insert(target, &credentials);
                let Some(inst) = self.instances.get(id) else { return };
                session.queue(PendingRequest {
                    opcode: inst.opcode,
                    request_id: id,
                    oid: inst.cursor().clone(),
                });
                self.flush_session(target).await;
            }
        }
    }

    /// Send discovery while a session is unready; once ready, release the
    /// parked requests FIFO, each re-keyed to a fresh request id.
    async fn flush_session(&mut self, target: SocketAddr) {
        let Some(session) = self.sessions.get_mut(&target) else {
            return;
        };

        if !session.is_ready() {
            let discovery = Oid::from_slice(&DISCOVERY_OID);
            let pdu = Pdu::get_request(BROADCAST_REQUEST_ID, &discovery);
            match v3::encode_request(&session.engine, BROADCAST_REQUEST_ID, &pdu) {
                Ok(bytes) => {
                    tracing::trace!(target: "snmp_query::client", remote = %target, "writing discovery GET");
                    if let Err(e) = self.transport.send_to(&bytes, target).await {
                        tracing::warn!(target: "snmp_query::client", remote = %target, error = %e, "discovery send failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "snmp_query::client", remote = %target, error = %e, "discovery encode failed")
                }
            }
            return;
        }

        let pending = session.take_pending();
        for request in pending {
            // The query may have finished or timed out while parked
            let Some(inst) = self.instances.remove(request.request_id) else {
                continue;
            };
            if inst.is_terminated() {
                continue;
            }
            let Some(new_id) = self.instances.register(inst, &self.provider) else {
                continue;
            };

            let Some(session) = self.sessions.get_mut(&target) else {
                continue;
            };
            let pdu = build_pdu(
                request.opcode,
                new_id.raw(),
                &request.oid,
                self.config.bulk_size,
            );
            match v3::encode_request(&session.engine, new_id.raw(), &pdu) {
                Ok(bytes) => {
                    tracing::trace!(
                        target: "snmp_query::client",
                        opcode = %request.opcode,
                        oid = %request.oid,
                        id = %new_id,
                        "writing v3 request"
                    );
                    if let Err(e) = self.transport.send_to(&bytes, target).await {
                        tracing::warn!(target: "snmp_query::client", remote = %target, error = %e, "send failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "snmp_query::client", remote = %target, error = %e, "encode failed")
                }
            }
        }
    }

    async fn on_packet(&mut self, data: Bytes, source: SocketAddr) {
        tracing::trace!(target: "snmp_query::client", remote = %source, bytes = data.len(), "received packet");

        let (decoded, v3_session) = match self.sessions.get_mut(&source) {
            Some(session) => {
                let was_ready = session.is_ready();
                match decode_response(data, Some(&mut session.engine)) {
                    Ok(mut decoded) => {
                        if was_ready && decoded.status == ResponseStatus::NotSynced {
                            // The remote no longer recognizes our session:
                            // discard it and let in-flight queries re-arm
                            session.reset();
                            decoded.status = ResponseStatus::Retry;
                        }
                        (decoded, true)
                    }
                    Err(e) => {
                        tracing::error!(target: "snmp_query::client", remote = %source, error = %e, "invalid packet");
                        return;
                    }
                }
            }
            None => match decode_response(data, None) {
                Ok(decoded) => (decoded, false),
                Err(e) => {
                    tracing::error!(target: "snmp_query::client", remote = %source, error = %e, "invalid packet");
                    return;
                }
            },
        };

        if v3_session {
            // Discovery may have just completed; release parked requests
            self.flush_session(source).await;
        }

        self.dispatch(decoded).await;
    }

    async fn dispatch(&mut self, decoded: DecodedResponse) {
        let id = RequestId::from_wire(decoded.request_id);

        if id == RequestId::BROADCAST {
            tracing::trace!(target: "snmp_query::client", status = ?decoded.status, "calling all instances");
            for mut inst in self.instances.drain() {
                let disposition = inst.handle(decoded.status, &decoded.results);
                self.settle(inst, disposition).await;
            }
            return;
        }

        let Some(mut inst) = self.instances.remove(id) else {
            // Late, duplicate, or foreign response
            tracing::trace!(target: "snmp_query::client", %id, "response for unknown request id");
            return;
        };
        tracing::trace!(
            target: "snmp_query::client",
            %id,
            ?decoded.status,
            error_index = decoded.error_index,
            results = decoded.results.len(),
            "dispatching response"
        );
        let disposition = inst.handle(decoded.status, &decoded.results);
        self.settle(inst, disposition).await;
    }

    async fn settle(&mut self, mut inst: Instance, disposition: Disposition) {
        match disposition {
            Disposition::Done => {}
            Disposition::Keep => self.instances.insert_back(inst),
            Disposition::Resend => {
                inst.last_sent = Instant::now();
                if let Some(id) = self.instances.register(inst, &self.provider) {
                    self.write_instance(id).await;
                }
            }
        }
    }

    /// Periodic pass: fail queries past their budget, re-send quiet ones,
    /// age out idle sessions.
    async fn on_tick(&mut self) {
        let now = Instant::now();
        self.sessions.prune(now);

        let mut failed = Vec::new();
        let mut resend = Vec::new();
        for (id, inst) in self.instances.iter() {
            if now.duration_since(inst.created) >= self.config.timeout {
                failed.push(*id);
            } else if now.duration_since(inst.last_sent) >= inst.repeat_delay {
                resend.push(*id);
            }
        }

        for id in failed {
            if let Some(mut inst) = self.instances.remove(id) {
                let error = inst.timeout_error(now);
                tracing::debug!(target: "snmp_query::client", %id, "query timed out");
                inst.fail(error);
            }
        }

        for id in resend {
            if let Some(inst) = self.instances.get_mut(id) {
                tracing::trace!(target: "snmp_query::client", remote = %inst.target, oid = %inst.cursor(), "repeating");
                inst.last_sent = now;
            }
            self.write_instance(id).await;
        }
    }

    /// Per-query repeat threshold: the configured minimum plus a jitter
    /// drawn from `[-randomization/2, +randomization/2)`.
    fn repeat_delay(&self) -> Duration {
        let span = self.config.repeat_randomization;
        if span.is_zero() {
            return self.config.min_repeat_delay;
        }
        let offset = span.mul_f64(jitter_fraction());
        (self.config.min_repeat_delay + offset).saturating_sub(span / 2)
    }
}

fn build_pdu(opcode: PduType, request_id: i32, oid: &Oid, bulk_size: i32) -> Pdu {
    match opcode {
        PduType::GetNextRequest => Pdu::get_next_request(request_id, oid),
        PduType::GetBulkRequest => Pdu::get_bulk_request(request_id, oid, bulk_size),
        _ => Pdu::get_request(request_id, oid),
    }
}

static JITTER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Pseudo-random fraction in `[0, 1)` from a multiplicative hash of an
/// atomic counter; enough to desynchronize repeats without an RNG.
fn jitter_fraction() -> f64 {
    let counter = JITTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    let hash = counter.wrapping_mul(0x5851f42d4c957f2d);
    (hash >> 11) as f64 / ((1u64 << 53) as f64)
}

//! In-process SNMP v2c agent for testing.
//!
//! A small UDP responder serving GET/GETNEXT/GETBULK from a
//! `BTreeMap<Oid, Value>`. Binds an ephemeral localhost port, records
//! every request PDU type it sees, and shuts down on drop.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use snmp_query::message::CommunityMessage;
use snmp_query::pdu::{Pdu, PduType};
use snmp_query::{Oid, Value, VarBind};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// An in-process SNMP agent for testing.
///
/// Starts on creation, stops on drop.
pub struct TestAgent {
    addr: SocketAddr,
    data: Arc<Mutex<BTreeMap<Oid, Value>>>,
    requests: Arc<Mutex<Vec<PduType>>>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl TestAgent {
    /// Create an agent serving the given store.
    pub async fn with_data(initial: BTreeMap<Oid, Value>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("bind test agent");
        let addr = socket.local_addr().expect("agent local addr");
        let data = Arc::new(Mutex::new(initial));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(serve(
            socket,
            data.clone(),
            requests.clone(),
            cancel.clone(),
        ));

        Self {
            addr,
            data,
            requests,
            cancel,
            _task: task,
        }
    }

    /// The agent's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// PDU types of every request received so far.
    pub fn requests(&self) -> Vec<PduType> {
        self.requests.lock().unwrap().clone()
    }

    /// Insert or update a value.
    pub fn set(&self, oid: Oid, value: Value) {
        self.data.lock().unwrap().insert(oid, value);
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve(
    socket: UdpSocket,
    data: Arc<Mutex<BTreeMap<Oid, Value>>>,
    requests: Arc<Mutex<Vec<PduType>>>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; 65507];
    loop {
        let (len, peer) = tokio::select! {
            _ = cancel.cancelled() => return,
            received = socket.recv_from(&mut buf) => match received {
                Ok(r) => r,
                Err(_) => return,
            },
        };

        let Ok(message) = CommunityMessage::decode(Bytes::copy_from_slice(&buf[..len])) else {
            continue;
        };
        requests.lock().unwrap().push(message.pdu.pdu_type);

        let response = {
            let store = data.lock().unwrap();
            answer(&store, &message.pdu)
        };
        let Some(response) = response else { continue };

        let reply = CommunityMessage::new(message.community, response).encode();
        let _ = socket.send_to(&reply, peer).await;
    }
}

fn answer(store: &BTreeMap<Oid, Value>, request: &Pdu) -> Option<Pdu> {
    let varbinds = match request.pdu_type {
        PduType::GetRequest => request
            .varbinds
            .iter()
            .map(|vb| match store.get(&vb.oid) {
                Some(value) => VarBind::new(vb.oid.clone(), value.clone()),
                None => VarBind::new(vb.oid.clone(), Value::NoSuchObject),
            })
            .collect(),
        PduType::GetNextRequest => request
            .varbinds
            .iter()
            .map(|vb| next_entry(store, &vb.oid))
            .collect(),
        PduType::GetBulkRequest => {
            // non-repeaters is always 0 in these tests; every varbind repeats
            let max_repetitions = request.error_index.max(0) as usize;
            let mut out = Vec::new();
            for vb in &request.varbinds {
                let mut cursor = vb.oid.clone();
                for _ in 0..max_repetitions {
                    let entry = next_entry(store, &cursor);
                    let done = matches!(entry.value, Value::EndOfMibView);
                    cursor = entry.oid.clone();
                    out.push(entry);
                    if done {
                        break;
                    }
                }
            }
            out
        }
        _ => return None,
    };

    Some(Pdu::response(request.request_id, 0, 0, varbinds))
}

fn next_entry(store: &BTreeMap<Oid, Value>, after: &Oid) -> VarBind {
    match store
        .range((Bound::Excluded(after.clone()), Bound::Unbounded))
        .next()
    {
        Some((oid, value)) => VarBind::new(oid.clone(), value.clone()),
        None => VarBind::new(after.clone(), Value::EndOfMibView),
    }
}

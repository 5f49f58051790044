//! SNMP message framing.
//!
//! [`community`] handles v2c (community string) messages, [`v3`] handles
//! USM-secured v3 messages. [`decode_response`] is the single entry point
//! the engine feeds inbound datagrams through: the caller picks the
//! dialect by whether it holds session state for the source address.

pub mod community;
pub mod v3;

pub use community::CommunityMessage;

use bytes::Bytes;

use crate::error::Result;
use crate::v3::RemoteEngine;
use crate::varbind::VarBind;

/// Reserved request id.
///
/// Discovery requests go out under it, and session-level failures fan back
/// in under it, addressed to every in-flight query on the engine. The
/// request-id allocator never hands it out.
pub const BROADCAST_REQUEST_ID: i32 = i32::MAX;

/// Protocol-level outcome attached to a decoded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// error-status was zero.
    Success,
    /// Non-zero error-status from the remote (walk terminator, GET fallback
    /// trigger; never fatal to the engine).
    Error { status: i32 },
    /// The remote's security engine does not recognize our session yet.
    /// Silently absorbed by queries; the session manager reacts.
    NotSynced,
    /// Credentials rejected. Terminal for the affected queries.
    AuthFailed,
    /// Session re-established; the query should re-arm and resend.
    Retry,
    /// Protocol-signaled timeout (injected by upstream layers, never
    /// produced from the wire here).
    Timeout,
}

/// A decoded response as handed to the correlation layer.
#[derive(Debug)]
pub struct DecodedResponse {
    /// Correlation id, possibly [`BROADCAST_REQUEST_ID`].
    pub request_id: i32,
    /// Protocol-level outcome.
    pub status: ResponseStatus,
    /// error-index as reported (1-based; 0 = whole PDU).
    pub error_index: i32,
    /// Returned varbinds in wire order.
    pub results: Vec<VarBind>,
}

/// Decode an inbound datagram.
///
/// With no session state the datagram is parsed as v2c; with a
/// [`RemoteEngine`] it is parsed as v3, the engine absorbing any reported
/// id/boots/time and verifying/decrypting as its keys dictate.
pub fn decode_response(
    data: Bytes,
    engine: Option<&mut RemoteEngine>,
) -> Result<DecodedResponse> {
    match engine {
        None => {
            let msg = CommunityMessage::decode(data)?;
            let pdu = msg.pdu;
            let status = if pdu.error_status == 0 {
                ResponseStatus::Success
            } else {
                ResponseStatus::Error {
                    status: pdu.error_status,
                }
            };
            Ok(DecodedResponse {
                request_id: pdu.request_id,
                status,
                error_index: pdu.error_index,
                results: pdu.varbinds,
            })
        }
        Some(engine) => v3::decode(data, engine),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::pdu::Pdu;
    use crate::value::Value;
    use crate::varbind::VarBind;

    #[test]
    fn v2c_success_response() {
        let msg = CommunityMessage::new(
            Bytes::from_static(b"public"),
            Pdu::response(
                41,
                0,
                0,
                vec![VarBind::new(oid!(1, 1, 1), Value::from("x"))],
            ),
        );

        let decoded = decode_response(msg.encode(), None).unwrap();
        assert_eq!(decoded.request_id, 41);
        assert_eq!(decoded.status, ResponseStatus::Success);
        assert_eq!(decoded.results.len(), 1);
    }

    #[test]
    fn v2c_error_status_mapped() {
        let msg = CommunityMessage::new(
            Bytes::from_static(b"public"),
            Pdu::response(42, 2, 1, vec![]),
        );

        let decoded = decode_response(msg.encode(), None).unwrap();
        assert_eq!(decoded.status, ResponseStatus::Error { status: 2 });
        assert_eq!(decoded.error_index, 1);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(decode_response(Bytes::from_static(&[0xFF, 0x01, 0x02]), None).is_err());
    }
}

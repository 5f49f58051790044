//! SNMPv3 message framing (RFC 3412) over USM security (RFC 3414).
//!
//! Wire layout:
//!
//! ```text
//! SEQUENCE {
//!     INTEGER      msgVersion (3)
//!     SEQUENCE     msgGlobalData { msgID, msgMaxSize, msgFlags, msgSecurityModel }
//!     OCTET STRING msgSecurityParameters (BER-wrapped UsmSecurityParameters)
//!     ScopedPduData: plaintext SEQUENCE or OCTET STRING (encrypted)
//! }
//! ```
//!
//! The msgID and the scoped PDU's request-id are kept identical, so the
//! correlation layer only ever sees one id. Report PDUs answering a
//! discovery (or signaling a stale session) are rewritten to the broadcast
//! id here, the way the session manager expects them.

use bytes::Bytes;

use super::{BROADCAST_REQUEST_ID, DecodedResponse, ResponseStatus};
use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::{Pdu, PduType};
use crate::v3::{RemoteEngine, ReportClass, UsmSecurityParams, classify_report};

/// USM security model number (RFC 3411).
pub const USM_SECURITY_MODEL: i32 = 3;

/// msgMaxSize we advertise (maximum UDP payload).
pub const MSG_MAX_SIZE: i32 = 65507;

const FLAG_AUTH: u8 = 0x01;
const FLAG_PRIV: u8 = 0x02;
const FLAG_REPORTABLE: u8 = 0x04;

/// msgFlags of a v3 message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V3Flags {
    pub auth: bool,
    pub privacy: bool,
    pub reportable: bool,
}

impl V3Flags {
    fn to_byte(self) -> u8 {
        let mut b = 0;
        if self.auth {
            b |= FLAG_AUTH;
        }
        if self.privacy {
            b |= FLAG_PRIV;
        }
        if self.reportable {
            b |= FLAG_REPORTABLE;
        }
        b
    }

    fn from_byte(b: u8) -> Result<Self> {
        let flags = Self {
            auth: b & FLAG_AUTH != 0,
            privacy: b & FLAG_PRIV != 0,
            reportable: b & FLAG_REPORTABLE != 0,
        };
        if flags.privacy && !flags.auth {
            return Err(Error::decode(0, DecodeErrorKind::InvalidMsgFlags));
        }
        Ok(flags)
    }
}

/// Encode a scoped PDU (plaintext form).
pub fn encode_scoped_pdu(context_engine_id: &[u8], pdu: &Pdu) -> Bytes {
    let mut buf = EncodeBuf::new();
    buf.push_sequence(|buf| {
        pdu.encode(buf);
        buf.push_octet_string(b""); // contextName
        buf.push_octet_string(context_engine_id);
    });
    buf.finish()
}

/// Assemble a full v3 message from already-encoded parts.
///
/// `scoped` must be a complete TLV: the plaintext SEQUENCE, or the
/// OCTET STRING holding the ciphertext.
pub fn encode_message(
    msg_id: i32,
    flags: V3Flags,
    usm: &UsmSecurityParams,
    scoped: &[u8],
) -> Bytes {
    let usm_blob = usm.encode();

    let mut buf = EncodeBuf::new();
    buf.push_sequence(|buf| {
        buf.push_bytes(scoped);
        buf.push_octet_string(&usm_blob);
        buf.push_sequence(|buf| {
            buf.push_integer(USM_SECURITY_MODEL);
            buf.push_octet_string(&[flags.to_byte()]);
            buf.push_integer(MSG_MAX_SIZE);
            buf.push_integer(msg_id);
        });
        buf.push_integer(crate::version::Version::V3.as_i32());
    });
    buf.finish()
}

/// Encode an outgoing request (or, for a scripted responder, any PDU)
/// under the engine's current session state.
///
/// An unready engine produces the discovery form: noAuthNoPriv, empty
/// engine id and user name, zero boots/time. A ready engine applies
/// whatever authentication and privacy its credentials call for.
pub fn encode_request(engine: &RemoteEngine, request_id: i32, pdu: &Pdu) -> Result<Bytes> {
    let ready = engine.is_ready();
    let auth_key = if ready { engine.auth_key() } else { None };
    let priv_key = if ready { engine.priv_key() } else { None };

    let flags = V3Flags {
        auth: auth_key.is_some(),
        privacy: auth_key.is_some() && priv_key.is_some(),
        reportable: true,
    };

    let engine_id = if ready {
        engine.engine_id().clone()
    } else {
        Bytes::new()
    };
    let (boots, time) = if flags.auth {
        (engine.engine_boots(), engine.current_time())
    } else {
        (0, 0)
    };

    let scoped_plain = encode_scoped_pdu(&engine_id, pdu);

    let (scoped, priv_params) = if flags.privacy {
        // Checked above
        let key = priv_key.expect("privacy key");
        let (ciphertext, salt) = key.encrypt(&scoped_plain, boots, time, engine.next_salt())?;
        let mut buf = EncodeBuf::new();
        buf.push_octet_string(&ciphertext);
        (buf.finish(), Bytes::from(salt))
    } else {
        (scoped_plain, Bytes::new())
    };

    let mut usm = UsmSecurityParams {
        engine_id,
        engine_boots: boots,
        engine_time: time,
        username: if ready {
            engine.credentials().security_name.clone()
        } else {
            Bytes::new()
        },
        auth_params: Bytes::new(),
        priv_params,
    };

    match auth_key {
        None => Ok(encode_message(request_id, flags, &usm, &scoped)),
        Some(key) => {
            let mac_len = key.mac_len();
            usm.auth_params = Bytes::from(vec![0u8; mac_len]);

            let mut out = encode_message(request_id, flags, &usm, &scoped).to_vec();

            // The zeroed auth params sit a fixed distance from the end:
            // [.. auth zeros][privParams TLV][scoped]. privParams is at most
            // 8 bytes, so its TLV header is always 2 bytes.
            let tail = scoped.len() + 2 + usm.priv_params.len() + mac_len;
            let offset = out.len() - tail;

            let mac = key.compute_hmac(&out);
            out[offset..offset + mac_len].copy_from_slice(&mac);
            Ok(Bytes::from(out))
        }
    }
}

/// Decode an inbound v3 datagram against the session's engine state.
///
/// The engine absorbs any engine id/boots/time the message reports (that
/// is how discovery completes), then the message is authenticated and
/// decrypted as the flags dictate. Report PDUs under the usmStats subtree
/// are rewritten to the broadcast id with the matching status.
pub fn decode(data: Bytes, engine: &mut RemoteEngine) -> Result<DecodedResponse> {
    let mut decoder = Decoder::new(data.clone());
    let mut seq = decoder.read_sequence()?;

    let raw_version = seq.read_integer()?;
    if raw_version != crate::version::Version::V3.as_i32() {
        return Err(Error::decode(
            seq.offset(),
            DecodeErrorKind::UnknownVersion(raw_version),
        ));
    }

    let mut global = seq.read_sequence()?;
    let _msg_id = global.read_integer()?;
    let _msg_max_size = global.read_integer()?;
    let flags_bytes = global.read_octet_string()?;
    let flags = V3Flags::from_byte(*flags_bytes.first().ok_or_else(|| {
        Error::decode(global.offset(), DecodeErrorKind::TruncatedData)
    })?)?;
    let security_model = global.read_integer()?;
    if security_model != USM_SECURITY_MODEL {
        return Err(Error::decode(
            global.offset(),
            DecodeErrorKind::UnknownSecurityModel(security_model),
        ));
    }

    let usm_blob = seq.read_octet_string()?;
    let usm = UsmSecurityParams::decode(usm_blob)?;

    // A response for a different user than ours is not ours to interpret
    if !usm.username.is_empty() && usm.username != engine.credentials().security_name {
        return Err(Error::decode(0, DecodeErrorKind::UsernameMismatch));
    }

    engine.absorb(&usm);

    if flags.auth {
        let key = engine
            .auth_key()
            .ok_or_else(|| Error::decode(0, DecodeErrorKind::BadDigest))?;
        if usm.auth_params.len() != key.mac_len() {
            return Err(Error::decode(0, DecodeErrorKind::BadDigest));
        }

        // usm.auth_params is a zero-copy slice of `data`; its offset in the
        // datagram is the pointer distance between the two buffers.
        let offset = usm.auth_params.as_ptr() as usize - data.as_ptr() as usize;
        let mut zeroed = data.to_vec();
        zeroed[offset..offset + key.mac_len()].fill(0);

        if !key.verify_hmac(&zeroed, &usm.auth_params) {
            return Err(Error::decode(offset, DecodeErrorKind::BadDigest));
        }
    }

    let pdu = if flags.privacy {
        let ciphertext = seq.read_octet_string()?;
        let key = engine
            .priv_key()
            .ok_or_else(|| Error::decode(0, DecodeErrorKind::BadCiphertext))?;
        let plaintext = key.decrypt(
            &ciphertext,
            &usm.priv_params,
            usm.engine_boots,
            usm.engine_time,
        )?;
        let mut scoped = Decoder::new(Bytes::from(plaintext));
        read_scoped_pdu(&mut scoped)?
    } else {
        read_scoped_pdu(&mut seq)?
    };

    Ok(interpret_pdu(pdu))
}

fn read_scoped_pdu(decoder: &mut Decoder) -> Result<Pdu> {
    let mut scoped = decoder.read_sequence()?;
    let _context_engine_id = scoped.read_octet_string()?;
    let _context_name = scoped.read_octet_string()?;
    Pdu::decode(&mut scoped)
}

fn interpret_pdu(pdu: Pdu) -> DecodedResponse {
    if pdu.pdu_type == PduType::Report {
        match classify_report(&pdu.varbinds) {
            Some(ReportClass::NotSynced) => {
                return DecodedResponse {
                    request_id: BROADCAST_REQUEST_ID,
                    status: ResponseStatus::NotSynced,
                    error_index: 0,
                    results: pdu.varbinds,
                };
            }
            Some(ReportClass::AuthFailed) => {
                tracing::error!(target: "snmp_query::v3", "authentication failed report");
                return DecodedResponse {
                    request_id: BROADCAST_REQUEST_ID,
                    status: ResponseStatus::AuthFailed,
                    error_index: 0,
                    results: pdu.varbinds,
                };
            }
            None => {}
        }
    }

    let status = if pdu.error_status == 0 {
        ResponseStatus::Success
    } else {
        ResponseStatus::Error {
            status: pdu.error_status,
        }
    };
    DecodedResponse {
        request_id: pdu.request_id,
        status,
        error_index: pdu.error_index,
        results: pdu.varbinds,
    }
}

//! SNMP Protocol Data Units (PDUs).
//!
//! For GETBULK the `error_status`/`error_index` slots carry non-repeaters
//! and max-repetitions, per RFC 3416.

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};

/// PDU type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    GetRequest = 0xA0,
    GetNextRequest = 0xA1,
    Response = 0xA2,
    SetRequest = 0xA3,
    GetBulkRequest = 0xA5,
    InformRequest = 0xA6,
    TrapV2 = 0xA7,
    Report = 0xA8,
}

impl PduType {
    /// Create from tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::Response),
            0xA3 => Some(Self::SetRequest),
            0xA5 => Some(Self::GetBulkRequest),
            0xA6 => Some(Self::InformRequest),
            0xA7 => Some(Self::TrapV2),
            0xA8 => Some(Self::Report),
            _ => None,
        }
    }

    /// Get the tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
            Self::Response => write!(f, "Response"),
            Self::SetRequest => write!(f, "SetRequest"),
            Self::GetBulkRequest => write!(f, "GetBulkRequest"),
            Self::InformRequest => write!(f, "InformRequest"),
            Self::TrapV2 => write!(f, "TrapV2"),
            Self::Report => write!(f, "Report"),
        }
    }
}

/// Generic PDU structure for request/response operations.
#[derive(Debug, Clone)]
pub struct Pdu {
    /// PDU type
    pub pdu_type: PduType,
    /// Request ID correlating requests and responses
    pub request_id: i32,
    /// Error status (or non-repeaters for GETBULK)
    pub error_status: i32,
    /// Error index (or max-repetitions for GETBULK)
    pub error_index: i32,
    /// Variable bindings
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// Create a GET request for a single OID.
    pub fn get_request(request_id: i32, oid: &Oid) -> Self {
        Self {
            pdu_type: PduType::GetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind::null(oid.clone())],
        }
    }

    /// Create a GETNEXT request for a single OID.
    pub fn get_next_request(request_id: i32, oid: &Oid) -> Self {
        Self {
            pdu_type: PduType::GetNextRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind::null(oid.clone())],
        }
    }

    /// Create a GETBULK request for a single repeating OID.
    pub fn get_bulk_request(request_id: i32, oid: &Oid, max_repetitions: i32) -> Self {
        Self {
            pdu_type: PduType::GetBulkRequest,
            request_id,
            error_status: 0,
            error_index: max_repetitions,
            varbinds: vec![VarBind::null(oid.clone())],
        }
    }

    /// Create a Response PDU.
    pub fn response(
        request_id: i32,
        error_status: i32,
        error_index: i32,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Self {
            pdu_type: PduType::Response,
            request_id,
            error_status,
            error_index,
            varbinds,
        }
    }

    /// Create a Report PDU (v3 engine reports).
    pub fn report(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::Report,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.error_index);
            buf.push_integer(self.error_status);
            buf.push_integer(self.request_id);
        });
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let tag = decoder.read_tag()?;
        let pdu_type = PduType::from_tag(tag)
            .ok_or_else(|| Error::decode(decoder.offset(), DecodeErrorKind::UnknownPduType(tag)))?;

        let len = decoder.read_length()?;
        let mut pdu = decoder.sub_decoder(len)?;

        let request_id = pdu.read_integer()?;
        let error_status = pdu.read_integer()?;
        let error_index = pdu.read_integer()?;
        let varbinds = decode_varbind_list(&mut pdu)?;

        Ok(Pdu {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::value::Value;

    fn roundtrip(pdu: &Pdu) -> Pdu {
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let mut decoder = Decoder::new(buf.finish());
        Pdu::decode(&mut decoder).unwrap()
    }

    #[test]
    fn get_request_roundtrip() {
        let pdu = Pdu::get_request(12345, &oid!(1, 3, 6, 1, 2, 1, 1, 1, 0));
        let back = roundtrip(&pdu);
        assert_eq!(back.pdu_type, PduType::GetRequest);
        assert_eq!(back.request_id, 12345);
        assert_eq!(back.varbinds.len(), 1);
        assert_eq!(back.varbinds[0].value, Value::Null);
    }

    #[test]
    fn getbulk_carries_repetitions_in_error_index() {
        let pdu = Pdu::get_bulk_request(7, &oid!(1, 1), 25);
        let back = roundtrip(&pdu);
        assert_eq!(back.pdu_type, PduType::GetBulkRequest);
        assert_eq!(back.error_status, 0); // non-repeaters
        assert_eq!(back.error_index, 25); // max-repetitions
    }

    #[test]
    fn response_with_error_status() {
        let pdu = Pdu::response(9, 2, 1, vec![VarBind::null(oid!(1, 1))]);
        let back = roundtrip(&pdu);
        assert_eq!(back.error_status, 2);
        assert_eq!(back.error_index, 1);
    }

    #[test]
    fn unknown_pdu_tag_rejected() {
        let mut buf = EncodeBuf::new();
        buf.push_constructed(0xAF, |buf| buf.push_integer(1));
        let mut decoder = Decoder::new(buf.finish());
        assert!(matches!(
            Pdu::decode(&mut decoder),
            Err(Error::Decode {
                kind: DecodeErrorKind::UnknownPduType(0xAF),
                ..
            })
        ));
    }
}

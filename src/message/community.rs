//! Community-string messages (SNMPv2c).

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::version::Version;

/// An SNMPv2c message: version, community string, PDU.
#[derive(Debug, Clone)]
pub struct CommunityMessage {
    /// Protocol version.
    pub version: Version,
    /// Community string.
    pub community: Bytes,
    /// The wrapped PDU.
    pub pdu: Pdu,
}

impl CommunityMessage {
    /// Create a v2c message.
    pub fn new(community: Bytes, pdu: Pdu) -> Self {
        Self {
            version: Version::V2c,
            community,
            pdu,
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.community);
            buf.push_integer(self.version.as_i32());
        });
        buf.finish()
    }

    /// Decode from wire bytes.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;

        let raw_version = seq.read_integer()?;
        let version = Version::from_i32(raw_version).ok_or_else(|| {
            Error::decode(seq.offset(), DecodeErrorKind::UnknownVersion(raw_version))
        })?;
        if version != Version::V2c {
            return Err(Error::decode(
                seq.offset(),
                DecodeErrorKind::UnknownVersion(raw_version),
            ));
        }

        let community = seq.read_octet_string()?;
        let pdu = Pdu::decode(&mut seq)?;

        Ok(Self {
            version,
            community,
            pdu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::pdu::PduType;
    use crate::value::Value;
    use crate::varbind::VarBind;

    #[test]
    fn encode_decode_roundtrip() {
        let msg = CommunityMessage::new(
            Bytes::from_static(b"public"),
            Pdu::get_request(12345, &oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)),
        );

        let decoded = CommunityMessage::decode(msg.encode()).unwrap();
        assert_eq!(decoded.community.as_ref(), b"public");
        assert_eq!(decoded.pdu.pdu_type, PduType::GetRequest);
        assert_eq!(decoded.pdu.request_id, 12345);
    }

    #[test]
    fn response_with_payload() {
        let msg = CommunityMessage::new(
            Bytes::from_static(b"community"),
            Pdu::response(
                7,
                0,
                0,
                vec![VarBind::new(oid!(1, 1, 1), Value::from("val1.1.1"))],
            ),
        );

        let decoded = CommunityMessage::decode(msg.encode()).unwrap();
        assert_eq!(decoded.pdu.varbinds.len(), 1);
        assert_eq!(decoded.pdu.varbinds[0].value, Value::from("val1.1.1"));
    }

    #[test]
    fn v3_header_rejected_here() {
        // version 3 at the community layer is a decode error
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_octet_string(b"x");
            buf.push_integer(3);
        });
        assert!(CommunityMessage::decode(buf.finish()).is_err());
    }
}

//! Variable binding (VarBind) type.
//!
//! A VarBind pairs an OID with a value. Exception values
//! ([`Value::is_exception`]) mean the agent had no value at that OID.

use crate::ber::{Decoder, EncodeBuf};
use crate::error::Result;
use crate::oid::Oid;
use crate::value::Value;

/// Variable binding - an OID-value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    /// The object identifier.
    pub oid: Oid,
    /// The value.
    pub value: Value,
}

impl VarBind {
    /// Create a new VarBind.
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// Create a VarBind with a NULL value (for request PDUs).
    pub fn null(oid: Oid) -> Self {
        Self {
            oid,
            value: Value::Null,
        }
    }

    /// Whether the value is an actual payload rather than an exception marker.
    pub fn has_value(&self) -> bool {
        !self.value.is_exception()
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.value.encode(buf);
            buf.push_oid(&self.oid);
        });
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let oid = seq.read_oid()?;
        let value = Value::decode(&mut seq)?;
        Ok(VarBind { oid, value })
    }
}

impl std::fmt::Display for VarBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.oid, self.value)
    }
}

/// Encode a list of VarBinds as a SEQUENCE OF VarBind.
pub fn encode_varbind_list(buf: &mut EncodeBuf, varbinds: &[VarBind]) {
    buf.push_sequence(|buf| {
        // Reverse buffer: push last varbind first
        for vb in varbinds.iter().rev() {
            vb.encode(buf);
        }
    });
}

/// Decode a SEQUENCE OF VarBind.
pub fn decode_varbind_list(decoder: &mut Decoder) -> Result<Vec<VarBind>> {
    let mut seq = decoder.read_sequence()?;
    let mut varbinds = Vec::with_capacity((seq.remaining() / 16).max(1));

    while !seq.is_empty() {
        varbinds.push(VarBind::decode(&mut seq)?);
    }

    Ok(varbinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn varbind_roundtrip() {
        let vb = VarBind::new(oid!(1, 3, 6, 1), Value::Integer(42));

        let mut buf = EncodeBuf::new();
        vb.encode(&mut buf);
        let mut decoder = Decoder::new(buf.finish());
        assert_eq!(VarBind::decode(&mut decoder).unwrap(), vb);
    }

    #[test]
    fn list_preserves_wire_order() {
        let varbinds = vec![
            VarBind::new(oid!(1, 1, 1), Value::from("a")),
            VarBind::new(oid!(1, 1, 2), Value::from("b")),
            VarBind::new(oid!(1, 1, 3), Value::from("c")),
        ];

        let mut buf = EncodeBuf::new();
        encode_varbind_list(&mut buf, &varbinds);
        let mut decoder = Decoder::new(buf.finish());
        assert_eq!(decode_varbind_list(&mut decoder).unwrap(), varbinds);
    }

    #[test]
    fn empty_list() {
        let mut buf = EncodeBuf::new();
        encode_varbind_list(&mut buf, &[]);
        let mut decoder = Decoder::new(buf.finish());
        assert!(decode_varbind_list(&mut decoder).unwrap().is_empty());
    }

    #[test]
    fn has_value_distinguishes_exceptions() {
        assert!(VarBind::new(oid!(1, 1), Value::Integer(1)).has_value());
        assert!(VarBind::new(oid!(1, 1), Value::Null).has_value());
        assert!(!VarBind::new(oid!(1, 1), Value::EndOfMibView).has_value());
        assert!(!VarBind::new(oid!(1, 1), Value::NoSuchObject).has_value());
    }
}

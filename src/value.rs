//! SNMP value types.
//!
//! [`Value`] covers the SMIv2 type lattice plus the v2c/v3 exception
//! markers. The exceptions (`NoSuchObject`, `NoSuchInstance`,
//! `EndOfMibView`) are the protocol's "no value here" sentinels; they are
//! modeled as enum variants so they can never be confused with a payload.

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::Result;
use crate::oid::Oid;
use bytes::Bytes;

/// SNMP value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// INTEGER (signed 32-bit)
    Integer(i32),
    /// OCTET STRING (arbitrary bytes)
    OctetString(Bytes),
    /// NULL
    Null,
    /// OBJECT IDENTIFIER
    ObjectIdentifier(Oid),
    /// IpAddress (4 bytes, big-endian)
    IpAddress([u8; 4]),
    /// Counter32 (unsigned 32-bit, wrapping)
    Counter32(u32),
    /// Gauge32 / Unsigned32
    Gauge32(u32),
    /// TimeTicks (hundredths of seconds)
    TimeTicks(u32),
    /// Opaque (legacy, arbitrary bytes)
    Opaque(Bytes),
    /// Counter64 (unsigned 64-bit, wrapping; v2c/v3 only)
    Counter64(u64),
    /// noSuchObject exception - the OID names no managed object.
    NoSuchObject,
    /// noSuchInstance exception - the object exists but this instance does not.
    NoSuchInstance,
    /// endOfMibView exception - no OID lexicographically follows.
    EndOfMibView,
    /// Unrecognized value type, kept verbatim for forward compatibility.
    Unknown { tag: u8, data: Bytes },
}

impl Value {
    /// Whether this is one of the exception markers, i.e. the protocol's
    /// "no such value here" sentinel rather than a real payload.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    /// Encode to BER.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Value::Integer(v) => buf.push_integer(*v),
            Value::OctetString(data) => buf.push_octet_string(data),
            Value::Null => buf.push_null(),
            Value::ObjectIdentifier(oid) => buf.push_oid(oid),
            Value::IpAddress(addr) => buf.push_tlv(tag::IP_ADDRESS, addr),
            Value::Counter32(v) => buf.push_unsigned32(tag::COUNTER32, *v),
            Value::Gauge32(v) => buf.push_unsigned32(tag::GAUGE32, *v),
            Value::TimeTicks(v) => buf.push_unsigned32(tag::TIME_TICKS, *v),
            Value::Opaque(data) => buf.push_tlv(tag::OPAQUE, data),
            Value::Counter64(v) => buf.push_unsigned64(tag::COUNTER64, *v),
            Value::NoSuchObject => buf.push_empty(tag::NO_SUCH_OBJECT),
            Value::NoSuchInstance => buf.push_empty(tag::NO_SUCH_INSTANCE),
            Value::EndOfMibView => buf.push_empty(tag::END_OF_MIB_VIEW),
            Value::Unknown { tag, data } => buf.push_tlv(*tag, data),
        }
    }

    /// Decode from BER.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let t = decoder.read_tag()?;
        let len = decoder.read_length()?;

        match t {
            tag::INTEGER => Ok(Value::Integer(decoder.read_integer_value(len)?)),
            tag::OCTET_STRING => Ok(Value::OctetString(decoder.read_bytes(len)?)),
            tag::NULL => {
                decoder.skip(len)?;
                Ok(Value::Null)
            }
            tag::OBJECT_IDENTIFIER => {
                let data = decoder.read_bytes(len)?;
                Ok(Value::ObjectIdentifier(Oid::from_ber(&data)?))
            }
            tag::IP_ADDRESS => {
                let data = decoder.read_bytes(len)?;
                let mut addr = [0u8; 4];
                if data.len() == 4 {
                    addr.copy_from_slice(&data);
                    Ok(Value::IpAddress(addr))
                } else {
                    // Permissive: keep malformed lengths verbatim
                    Ok(Value::Unknown {
                        tag: t,
                        data,
                    })
                }
            }
            tag::COUNTER32 => Ok(Value::Counter32(decoder.read_unsigned32_value(len)?)),
            tag::GAUGE32 => Ok(Value::Gauge32(decoder.read_unsigned32_value(len)?)),
            tag::TIME_TICKS => Ok(Value::TimeTicks(decoder.read_unsigned32_value(len)?)),
            tag::OPAQUE => Ok(Value::Opaque(decoder.read_bytes(len)?)),
            tag::COUNTER64 => Ok(Value::Counter64(decoder.read_unsigned64_value(len)?)),
            tag::NO_SUCH_OBJECT => {
                decoder.skip(len)?;
                Ok(Value::NoSuchObject)
            }
            tag::NO_SUCH_INSTANCE => {
                decoder.skip(len)?;
                Ok(Value::NoSuchInstance)
            }
            tag::END_OF_MIB_VIEW => {
                decoder.skip(len)?;
                Ok(Value::EndOfMibView)
            }
            other => Ok(Value::Unknown {
                tag: other,
                data: decoder.read_bytes(len)?,
            }),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "{}", s),
                Err(_) => {
                    for b in data.iter() {
                        write!(f, "{:02x}", b)?;
                    }
                    Ok(())
                }
            },
            Value::Null => write!(f, "null"),
            Value::ObjectIdentifier(oid) => write!(f, "{}", oid),
            Value::IpAddress(a) => write!(f, "{}.{}.{}.{}", a[0], a[1], a[2], a[3]),
            Value::Counter32(v) => write!(f, "{}", v),
            Value::Gauge32(v) => write!(f, "{}", v),
            Value::TimeTicks(v) => write!(f, "{}", v),
            Value::Opaque(data) => write!(f, "opaque[{} bytes]", data.len()),
            Value::Counter64(v) => write!(f, "{}", v),
            Value::NoSuchObject => write!(f, "noSuchObject"),
            Value::NoSuchInstance => write!(f, "noSuchInstance"),
            Value::EndOfMibView => write!(f, "endOfMibView"),
            Value::Unknown { tag, data } => write!(f, "unknown[0x{:02x}, {} bytes]", tag, data.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::OctetString(Bytes::from(s.into_bytes()))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    fn roundtrip(value: Value) -> Value {
        let mut buf = EncodeBuf::new();
        value.encode(&mut buf);
        let bytes = buf.finish();
        let mut decoder = Decoder::new(bytes);
        Value::decode(&mut decoder).unwrap()
    }

    #[test]
    fn integer_negative() {
        assert_eq!(roundtrip(Value::Integer(-42)), Value::Integer(-42));
    }

    #[test]
    fn counter64_large() {
        let v = Value::Counter64(u64::MAX - 1);
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn exceptions_are_absent_values() {
        for v in [Value::NoSuchObject, Value::NoSuchInstance, Value::EndOfMibView] {
            assert!(v.is_exception());
            assert_eq!(roundtrip(v.clone()), v);
        }
        assert!(!Value::Null.is_exception());
        assert!(!Value::Integer(0).is_exception());
    }

    #[test]
    fn oid_value() {
        let v = Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 8072));
        assert_eq!(roundtrip(v.clone()), v);
    }

    #[test]
    fn unknown_tag_is_preserved() {
        let v = Value::Unknown {
            tag: 0x47,
            data: Bytes::from_static(&[1, 2, 3]),
        };
        assert_eq!(roundtrip(v.clone()), v);
    }
}

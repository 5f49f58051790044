//! Object Identifier (OID) type.
//!
//! OIDs are stored as `SmallVec<[u32; 16]>` to avoid heap allocation for
//! common OIDs. Ordering is lexicographic arc-by-arc; a strict prefix sorts
//! before any of its descendants, which is the order agents return subtree
//! entries in.

use crate::error::{Error, OidErrorKind, Result};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// Maximum number of arcs (subidentifiers) allowed in an OID.
///
/// Per RFC 2578 Section 3.5: "there are at most 128 sub-identifiers in a value".
pub const MAX_OID_LEN: usize = 128;

/// Object Identifier.
///
/// A sequence of arc values (u32). Uses SmallVec to avoid heap allocation
/// for OIDs with 16 or fewer arcs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: SmallVec<[u32; 16]>,
}

impl Oid {
    /// Create an empty OID.
    pub fn empty() -> Self {
        Self {
            arcs: SmallVec::new(),
        }
    }

    /// Create an OID from arc values.
    ///
    /// # Examples
    ///
    /// ```
    /// use snmp_query::oid::Oid;
    ///
    /// let oid = Oid::new(vec![1, 3, 6, 1, 2, 1]);
    /// assert_eq!(oid.arcs(), &[1, 3, 6, 1, 2, 1]);
    /// ```
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    /// Create an OID from a slice of arcs.
    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: SmallVec::from_slice(arcs),
        }
    }

    /// Parse an OID from dotted string notation (e.g., "1.3.6.1.2.1.1.1.0").
    ///
    /// # Examples
    ///
    /// ```
    /// use snmp_query::oid::Oid;
    ///
    /// let oid = Oid::parse("1.3.6.1.2.1.1.1.0").unwrap();
    /// assert_eq!(oid.len(), 9);
    /// assert!(Oid::parse("1.x.3").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::empty());
        }

        let mut arcs = SmallVec::new();

        for part in s.split('.') {
            if part.is_empty() {
                continue;
            }

            let arc: u32 = part.parse().map_err(|_| {
                Error::invalid_oid_with_input(OidErrorKind::InvalidArc, s.to_string())
            })?;

            arcs.push(arc);
        }

        Ok(Self { arcs })
    }

    /// Get the arc values.
    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Get the number of arcs.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// Check if the OID is empty.
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Check if this OID starts with another OID.
    ///
    /// Returns `true` if `self` begins with the same arcs as `other`. Every
    /// OID starts with itself and with the empty OID. This is the subtree
    /// membership test used to detect walk termination.
    ///
    /// # Examples
    ///
    /// ```
    /// use snmp_query::oid::Oid;
    ///
    /// let system = Oid::parse("1.3.6.1.2.1.1").unwrap();
    /// let sys_descr = Oid::parse("1.3.6.1.2.1.1.1.0").unwrap();
    ///
    /// assert!(sys_descr.starts_with(&system));
    /// assert!(!system.starts_with(&sys_descr));
    /// assert!(sys_descr.starts_with(&sys_descr));
    /// ```
    pub fn starts_with(&self, other: &Oid) -> bool {
        self.arcs.len() >= other.arcs.len() && self.arcs[..other.arcs.len()] == other.arcs[..]
    }

    /// Create a child OID by appending an arc.
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.arcs.clone();
        arcs.push(arc);
        Oid { arcs }
    }

    /// Validate that the OID doesn't exceed the maximum arc count.
    ///
    /// SNMP implementations commonly limit OIDs to 128 subidentifiers; the
    /// check guards against maliciously long OIDs from the wire.
    pub fn validate_length(&self) -> Result<()> {
        if self.arcs.len() > MAX_OID_LEN {
            return Err(Error::invalid_oid(OidErrorKind::TooManyArcs {
                count: self.arcs.len(),
                max: MAX_OID_LEN,
            }));
        }
        Ok(())
    }

    /// Encode to BER format (X.690 Section 8.19).
    ///
    /// The first two arcs combine into one subidentifier (`arc1 * 40 + arc2`);
    /// every subidentifier is base-128 variable length.
    pub fn to_ber(&self) -> SmallVec<[u8; 64]> {
        let mut bytes = SmallVec::new();

        if self.arcs.is_empty() {
            return bytes;
        }

        if self.arcs.len() >= 2 {
            encode_subidentifier(&mut bytes, self.arcs[0] * 40 + self.arcs[1]);
        } else {
            encode_subidentifier(&mut bytes, self.arcs[0] * 40);
        }

        for &arc in self.arcs.iter().skip(2) {
            encode_subidentifier(&mut bytes, arc);
        }

        bytes
    }

    /// Decode from BER format.
    ///
    /// Enforces [`MAX_OID_LEN`] per RFC 2578 Section 3.5.
    pub fn from_ber(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::empty());
        }

        let mut arcs = SmallVec::new();

        let (first_subid, consumed) = decode_subidentifier(data)?;
        if first_subid < 40 {
            arcs.push(0);
            arcs.push(first_subid);
        } else if first_subid < 80 {
            arcs.push(1);
            arcs.push(first_subid - 40);
        } else {
            arcs.push(2);
            arcs.push(first_subid - 80);
        }

        let mut i = consumed;
        while i < data.len() {
            let (arc, n) = decode_subidentifier(&data[i..])?;
            arcs.push(arc);
            i += n;

            if arcs.len() > MAX_OID_LEN {
                return Err(Error::invalid_oid(OidErrorKind::TooManyArcs {
                    count: arcs.len(),
                    max: MAX_OID_LEN,
                }));
            }
        }

        Ok(Self { arcs })
    }
}

/// Encode a subidentifier in base-128 variable length.
#[inline]
fn encode_subidentifier(bytes: &mut SmallVec<[u8; 64]>, value: u32) {
    if value == 0 {
        bytes.push(0);
        return;
    }

    let mut temp = value;
    let mut count = 0;
    while temp > 0 {
        count += 1;
        temp >>= 7;
    }

    for i in (0..count).rev() {
        let mut byte = ((value >> (i * 7)) & 0x7F) as u8;
        if i > 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
    }
}

/// Decode a subidentifier, returning (value, bytes_consumed).
fn decode_subidentifier(data: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    let mut i = 0;

    loop {
        if i >= data.len() {
            return Err(Error::invalid_oid(OidErrorKind::Truncated));
        }

        let byte = data[i];
        i += 1;

        if value > (u32::MAX >> 7) {
            return Err(Error::invalid_oid(OidErrorKind::SubidentifierOverflow));
        }

        value = (value << 7) | ((byte & 0x7F) as u32);

        if byte & 0x80 == 0 {
            break;
        }
    }

    Ok((value, i))
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.arcs.cmp(&other.arcs)
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.arcs {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", arc)?;
            first = false;
        }
        Ok(())
    }
}

impl std::str::FromStr for Oid {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Self::from_slice(arcs)
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(arcs: [u32; N]) -> Self {
        Self::new(arcs)
    }
}

/// Construct an [`Oid`] from a comma-separated list of arcs.
///
/// ```
/// use snmp_query::{Oid, oid};
///
/// let sys_descr = oid!(1, 3, 6, 1, 2, 1, 1, 1, 0);
/// assert_eq!(sys_descr, Oid::parse("1.3.6.1.2.1.1.1.0").unwrap());
/// ```
#[macro_export]
macro_rules! oid {
    ($($arc:expr),+ $(,)?) => {
        $crate::Oid::from_slice(&[$($arc),+])
    };
}

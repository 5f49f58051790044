//! SNMP protocol versions.

/// SNMP version numbers as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    /// SNMPv2c (wire value 1)
    V2c,
    /// SNMPv3 (wire value 3)
    V3,
}

impl Version {
    /// Create from the wire integer.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::V2c),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    /// Get the wire integer.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::V2c => 1,
            Self::V3 => 3,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V2c => write!(f, "v2c"),
            Self::V3 => write!(f, "v3"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values() {
        assert_eq!(Version::V2c.as_i32(), 1);
        assert_eq!(Version::V3.as_i32(), 3);
        assert_eq!(Version::from_i32(1), Some(Version::V2c));
        assert_eq!(Version::from_i32(3), Some(Version::V3));
        assert_eq!(Version::from_i32(0), None);
        assert_eq!(Version::from_i32(2), None);
    }
}

//! ETH protocol versions.

use core::fmt;

/// The ETH protocol versions this codec understands.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EthVersion {
    /// eth/64: fork identifiers in STATUS.
    Eth64 = 64,
    /// eth/65: pooled transaction announcements.
    Eth65 = 65,
    /// eth/66: request ids on every request/response pair.
    Eth66 = 66,
    /// eth/67: GetNodeData withdrawn.
    Eth67 = 67,
    /// eth/68: typed hash announcements with sizes.
    Eth68 = 68,
}

impl EthVersion {
    /// The versions a node advertises by default, lowest first.
    ///
    /// Versions 64 and 65 predate request ids and are decodable but no
    /// longer negotiated.
    pub const ADVERTISED: [Self; 3] = [Self::Eth66, Self::Eth67, Self::Eth68];

    /// The latest version.
    pub const LATEST: Self = Self::Eth68;

    /// True from eth/66: requests and responses carry a request id.
    pub const fn has_request_ids(&self) -> bool {
        *self as u8 >= 66
    }

    /// True while GetNodeData/NodeData exist, up to eth/66.
    pub const fn has_get_node_data(&self) -> bool {
        *self as u8 <= 66
    }

    /// True from eth/68: hash announcements carry types and sizes.
    pub const fn has_typed_announcements(&self) -> bool {
        *self as u8 >= 68
    }
}

impl From<EthVersion> for u8 {
    fn from(version: EthVersion) -> Self {
        version as Self
    }
}

impl TryFrom<u8> for EthVersion {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            64 => Self::Eth64,
            65 => Self::Eth65,
            66 => Self::Eth66,
            67 => Self::Eth67,
            68 => Self::Eth68,
            other => return Err(other),
        })
    }
}

impl fmt::Display for EthVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eth/{}", *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_gates() {
        assert!(!EthVersion::Eth65.has_request_ids());
        assert!(EthVersion::Eth66.has_request_ids());
        assert!(EthVersion::Eth66.has_get_node_data());
        assert!(!EthVersion::Eth67.has_get_node_data());
        assert!(!EthVersion::Eth67.has_typed_announcements());
        assert!(EthVersion::Eth68.has_typed_announcements());
    }

    #[test]
    fn u8_roundtrip() {
        for version in [64u8, 65, 66, 67, 68] {
            assert_eq!(u8::from(EthVersion::try_from(version).unwrap()), version);
        }
        assert!(EthVersion::try_from(63u8).is_err());
        assert!(EthVersion::try_from(69u8).is_err());
    }
}

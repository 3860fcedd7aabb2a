//! Offset-based sub-protocol multiplexing.

use crate::{Capability, P2PError, BASE_PROTOCOL_LENGTH};
use std::collections::BTreeMap;

/// A capability both sides advertised, positioned in the shared message-id
/// space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedCapability {
    /// The capability, at the highest version both sides speak.
    pub capability: Capability,
    /// First message id of the capability's range.
    pub offset: u8,
    /// Number of message ids the capability occupies.
    pub length: u8,
}

impl SharedCapability {
    /// True if the absolute message id falls into this capability's range.
    pub const fn contains(&self, message_id: u8) -> bool {
        message_id >= self.offset && (message_id - self.offset) < self.length
    }
}

/// Result of routing an absolute message id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutedCode<'a> {
    /// A base-protocol message.
    Base(u8),
    /// A sub-protocol message, with the capability and the
    /// capability-relative id.
    Subprotocol {
        /// The capability the id belongs to.
        cap: &'a SharedCapability,
        /// The message id relative to the capability's offset.
        message_id: u8,
    },
}

/// Number of message ids a known protocol occupies.
///
/// Unknown protocols are shared for offset purposes but never routed to, so
/// a conservative length keeps the id space consistent with peers that know
/// them.
fn protocol_length(cap: &Capability) -> u8 {
    match (cap.name.as_str(), cap.version) {
        // Status..Receipts, ids 0x00 to 0x10
        ("eth", _) => 17,
        _ => 0,
    }
}

/// Intersects the two capability lists and assigns message-id offsets.
///
/// For every shared name the highest version both sides advertise wins.
/// Offsets are assigned in name order starting at
/// [`BASE_PROTOCOL_LENGTH`](crate::BASE_PROTOCOL_LENGTH), each capability
/// occupying its message-count range.
pub fn negotiate_capabilities(
    local: &[Capability],
    remote: &[Capability],
) -> Result<Vec<SharedCapability>, P2PError> {
    let mut best: BTreeMap<&str, u8> = BTreeMap::new();
    for ours in local {
        for theirs in remote {
            if ours.name == theirs.name && ours.version == theirs.version {
                let version = best.entry(ours.name.as_str()).or_insert(ours.version);
                if ours.version > *version {
                    *version = ours.version;
                }
            }
        }
    }

    let mut shared = Vec::with_capacity(best.len());
    let mut offset = BASE_PROTOCOL_LENGTH;
    for (name, version) in best {
        let capability = Capability::new(name, version);
        let length = protocol_length(&capability);
        if length == 0 {
            continue;
        }
        shared.push(SharedCapability { capability, offset, length });
        offset = offset
            .checked_add(length)
            .ok_or(P2PError::UnknownMessageId(u8::MAX))?;
    }

    if shared.is_empty() {
        return Err(P2PError::NoSharedCapabilities);
    }
    Ok(shared)
}

/// Routes an absolute message id to the base protocol or a negotiated
/// capability. Ids outside every range are a protocol error.
pub fn route_message_id(
    shared: &[SharedCapability],
    message_id: u8,
) -> Result<RoutedCode<'_>, P2PError> {
    if message_id < BASE_PROTOCOL_LENGTH {
        return Ok(RoutedCode::Base(message_id));
    }
    shared
        .iter()
        .find(|cap| cap.contains(message_id))
        .map(|cap| RoutedCode::Subprotocol { cap, message_id: message_id - cap.offset })
        .ok_or(P2PError::UnknownMessageId(message_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn highest_shared_version_wins() {
        let local = vec![Capability::eth(66), Capability::eth(67), Capability::eth(68)];
        let remote = vec![Capability::eth(66), Capability::eth(67)];

        let shared = negotiate_capabilities(&local, &remote).unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].capability, Capability::eth(67));
        assert_eq!(shared[0].offset, 16);
        assert_eq!(shared[0].length, 17);
    }

    #[test]
    fn no_overlap_is_an_error() {
        let local = vec![Capability::eth(68)];
        let remote = vec![Capability::eth(64)];
        assert_matches!(
            negotiate_capabilities(&local, &remote),
            Err(P2PError::NoSharedCapabilities)
        );
    }

    #[test]
    fn routing_splits_base_and_subprotocol() {
        let shared =
            negotiate_capabilities(&[Capability::eth(68)], &[Capability::eth(68)]).unwrap();

        assert_matches!(route_message_id(&shared, 0x02), Ok(RoutedCode::Base(0x02)));
        assert_matches!(
            route_message_id(&shared, 16),
            Ok(RoutedCode::Subprotocol { message_id: 0, .. })
        );
        assert_matches!(
            route_message_id(&shared, 16 + 16),
            Ok(RoutedCode::Subprotocol { message_id: 16, .. })
        );
        // one past the eth range
        assert_matches!(route_message_id(&shared, 16 + 17), Err(P2PError::UnknownMessageId(33)));
    }
}

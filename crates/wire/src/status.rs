//! The STATUS handshake payload and its validation.

use crate::{EthVersion, StatusError};
use alloy_eip2124::{ForkFilter, ForkHash, ForkId};
use alloy_primitives::{B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// The ETH STATUS message, exchanged once per session before any other
/// sub-protocol message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Status {
    /// The negotiated protocol version.
    pub version: u8,
    /// The chain id, e.g. 1 for mainnet.
    pub chain: u64,
    /// Total difficulty of the best chain.
    pub total_difficulty: U256,
    /// Hash of the best known block.
    pub blockhash: B256,
    /// Hash of the genesis block.
    pub genesis: B256,
    /// The fork identifier
    /// ([EIP-2124](https://eips.ethereum.org/EIPS/eip-2124)), carried from
    /// eth/64.
    pub forkid: ForkId,
}

impl Status {
    /// Starts building a STATUS from the local chain view.
    pub fn builder() -> StatusBuilder {
        StatusBuilder::default()
    }

    /// Validates a peer STATUS against ours: equal version, chain and
    /// genesis, and a fork id our [`ForkFilter`] accepts.
    pub fn validate(&self, peer: &Self, fork_filter: &ForkFilter) -> Result<(), StatusError> {
        if peer.version != self.version {
            return Err(StatusError::VersionMismatch { ours: self.version, peer: peer.version });
        }
        if peer.chain != self.chain {
            return Err(StatusError::ChainMismatch { ours: self.chain, peer: peer.chain });
        }
        if peer.genesis != self.genesis {
            return Err(StatusError::GenesisMismatch { ours: self.genesis, peer: peer.genesis });
        }
        // a peer cannot plausibly have accumulated more difficulty than fits
        // into 160 bits
        if peer.total_difficulty.bit_len() > 160 {
            return Err(StatusError::ImplausibleTotalDifficulty(peer.total_difficulty));
        }
        fork_filter.validate(peer.forkid).map_err(StatusError::ForkIdRejected)?;
        Ok(())
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Status {{ version: {}, chain: {}, td: {}, best: {}, genesis: {} }}",
            self.version, self.chain, self.total_difficulty, self.blockhash, self.genesis
        )
    }
}

/// Builder assembling a [`Status`] from the local chain view.
#[derive(Clone, Debug, Default)]
pub struct StatusBuilder {
    version: Option<EthVersion>,
    chain: u64,
    total_difficulty: U256,
    blockhash: B256,
    genesis: B256,
    forkid: Option<ForkId>,
}

impl StatusBuilder {
    /// Sets the negotiated protocol version.
    pub const fn version(mut self, version: EthVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the chain id.
    pub const fn chain(mut self, chain: u64) -> Self {
        self.chain = chain;
        self
    }

    /// Sets the total difficulty of the best chain.
    pub const fn total_difficulty(mut self, td: U256) -> Self {
        self.total_difficulty = td;
        self
    }

    /// Sets the best block hash.
    pub const fn blockhash(mut self, blockhash: B256) -> Self {
        self.blockhash = blockhash;
        self
    }

    /// Sets the genesis hash.
    pub const fn genesis(mut self, genesis: B256) -> Self {
        self.genesis = genesis;
        self
    }

    /// Sets the fork id.
    pub const fn forkid(mut self, forkid: ForkId) -> Self {
        self.forkid = Some(forkid);
        self
    }

    /// Builds the STATUS; version defaults to the latest, the fork id to an
    /// empty hash.
    pub fn build(self) -> Status {
        Status {
            version: self.version.unwrap_or(EthVersion::LATEST) as u8,
            chain: self.chain,
            total_difficulty: self.total_difficulty,
            blockhash: self.blockhash,
            genesis: self.genesis,
            forkid: self.forkid.unwrap_or(ForkId { hash: ForkHash([0; 4]), next: 0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_eip2124::{ForkFilterKey, Head};
    use alloy_primitives::b256;
    use alloy_rlp::{Decodable, Encodable};
    use assert_matches::assert_matches;

    const MAINNET_GENESIS: B256 =
        b256!("d4e56740f876aef8c010b86a09d5855b5224d130569fbc8b7b2bd0dcdfb6eea4");

    fn fork_filter(genesis: B256) -> ForkFilter {
        ForkFilter::new(
            Head { number: 15_000_000, ..Default::default() },
            genesis,
            0,
            Vec::<ForkFilterKey>::new(),
        )
    }

    fn local_status() -> Status {
        Status::builder()
            .version(EthVersion::Eth68)
            .chain(1)
            .total_difficulty(U256::from(17_000_000_000_000_000u64))
            .blockhash(B256::repeat_byte(0xbb))
            .genesis(MAINNET_GENESIS)
            .forkid(ForkId { hash: ForkHash::from(MAINNET_GENESIS), next: 0 })
            .build()
    }

    #[test]
    fn rlp_roundtrip() {
        let status = local_status();
        let mut buf = Vec::new();
        status.encode(&mut buf);
        let decoded = Status::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, status);
    }

    #[test]
    fn validate_accepts_identical_view() {
        let local = local_status();
        local.validate(&local, &fork_filter(MAINNET_GENESIS)).unwrap();
    }

    #[test]
    fn validate_rejects_mismatches() {
        let local = local_status();
        let filter = fork_filter(MAINNET_GENESIS);

        let peer = Status { version: 67, ..local };
        assert_matches!(
            local.validate(&peer, &filter),
            Err(StatusError::VersionMismatch { ours: 68, peer: 67 })
        );

        let peer = Status { chain: 5, ..local };
        assert_matches!(
            local.validate(&peer, &filter),
            Err(StatusError::ChainMismatch { ours: 1, peer: 5 })
        );

        let peer = Status { genesis: B256::repeat_byte(0x01), ..local };
        assert_matches!(local.validate(&peer, &filter), Err(StatusError::GenesisMismatch { .. }));

        let peer = Status { total_difficulty: U256::MAX, ..local };
        assert_matches!(
            local.validate(&peer, &filter),
            Err(StatusError::ImplausibleTotalDifficulty(_))
        );

        let peer = Status {
            forkid: ForkId { hash: ForkHash([0xde, 0xad, 0xbe, 0xef]), next: 0 },
            ..local
        };
        assert_matches!(local.validate(&peer, &filter), Err(StatusError::ForkIdRejected(_)));
    }

    #[test]
    // STATUS validation does not depend on the validation's own outcome:
    // encode, decode, validate must behave the same on the decoded value.
    fn validate_is_idempotent_across_roundtrip() {
        let local = local_status();
        let filter = fork_filter(MAINNET_GENESIS);

        let mut buf = Vec::new();
        local.encode(&mut buf);
        let decoded = Status::decode(&mut buf.as_slice()).unwrap();

        local.validate(&decoded, &filter).unwrap();
        decoded.validate(&local, &filter).unwrap();
    }
}

//! The signer capability table.

use crate::SignerError;
use alloy_primitives::{Address, ChainId, Signature, B256, U256};
use ethp2p_consensus::{
    crypto::{self, SECP256K1N_HALF},
    to_eip155_value, Hardfork, SignableTransaction, Signed, Transaction, TxType, Typed2718,
};

/// How the wire `v` value of a signature is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VEncoding {
    /// `v = recovery id + 27`, pre-EIP-155 legacy transactions.
    Legacy,
    /// `v = recovery id + 35 + 2·chain_id`
    /// ([EIP-155](https://eips.ethereum.org/EIPS/eip-155)); unprotected
    /// `v ∈ {27, 28}` is still accepted and handled by the Homestead rule.
    Eip155,
    /// `v = recovery id`, typed transactions.
    Parity,
}

/// A signer capability set: the transaction variants accepted at a hardfork,
/// the `v` encoding, the low-s rule, and the chain id.
///
/// Selection is a table lookup keyed by [`Hardfork`]; a more permissive
/// signer accepts every variant its predecessors accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signer {
    hardfork: Hardfork,
    chain_id: ChainId,
    accepted: &'static [TxType],
    legacy_v: VEncoding,
    strict_s: bool,
}

const FRONTIER_TYPES: &[TxType] = &[TxType::Legacy];
const BERLIN_TYPES: &[TxType] = &[TxType::Legacy, TxType::Eip2930];
const LONDON_TYPES: &[TxType] = &[TxType::Legacy, TxType::Eip2930, TxType::Eip1559];
const CANCUN_TYPES: &[TxType] =
    &[TxType::Legacy, TxType::Eip2930, TxType::Eip1559, TxType::Eip4844];
const PRAGUE_TYPES: &[TxType] =
    &[TxType::Legacy, TxType::Eip2930, TxType::Eip1559, TxType::Eip4844, TxType::Eip7702];

impl Signer {
    /// Builds the signer in force at the given hardfork, most permissive
    /// rule set first.
    pub const fn for_hardfork(hardfork: Hardfork, chain_id: ChainId) -> Self {
        let (accepted, legacy_v) = if hardfork.is_enabled_in(Hardfork::Prague) {
            (PRAGUE_TYPES, VEncoding::Eip155)
        } else if hardfork.is_enabled_in(Hardfork::Cancun) {
            (CANCUN_TYPES, VEncoding::Eip155)
        } else if hardfork.is_enabled_in(Hardfork::London) {
            (LONDON_TYPES, VEncoding::Eip155)
        } else if hardfork.is_enabled_in(Hardfork::Berlin) {
            (BERLIN_TYPES, VEncoding::Eip155)
        } else if hardfork.is_enabled_in(Hardfork::SpuriousDragon) {
            (FRONTIER_TYPES, VEncoding::Eip155)
        } else {
            (FRONTIER_TYPES, VEncoding::Legacy)
        };
        Self {
            hardfork,
            chain_id,
            accepted,
            legacy_v,
            strict_s: hardfork.is_enabled_in(Hardfork::Homestead),
        }
    }

    /// The hardfork the signer was selected for.
    pub const fn hardfork(&self) -> Hardfork {
        self.hardfork
    }

    /// The chain id the signer operates on.
    pub const fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// True if the signer accepts the given transaction variant.
    pub fn accepts(&self, ty: TxType) -> bool {
        self.accepted.contains(&ty)
    }

    /// The `v` encoding applied to the given variant.
    pub const fn v_encoding(&self, ty: TxType) -> VEncoding {
        match ty {
            TxType::Legacy => self.legacy_v,
            _ => VEncoding::Parity,
        }
    }

    fn check_variant<T: Transaction>(&self, tx: &T) -> Result<TxType, SignerError> {
        let ty = TxType::try_from(tx.ty())
            .map_err(|_| SignerError::UnsupportedVariant(TxType::Legacy))?;
        if !self.accepts(ty) {
            return Err(SignerError::UnsupportedVariant(ty));
        }
        match tx.chain_id() {
            // unprotected legacy carries no chain id and stays valid forever
            None if ty == TxType::Legacy => {}
            None => {
                return Err(SignerError::ChainIdMismatch { tx: None, signer: self.chain_id })
            }
            Some(id) => {
                if ty == TxType::Legacy && !matches!(self.legacy_v, VEncoding::Eip155) {
                    return Err(SignerError::ReplayProtectionUnsupported);
                }
                if id != self.chain_id {
                    return Err(SignerError::ChainIdMismatch {
                        tx: Some(id),
                        signer: self.chain_id,
                    });
                }
            }
        }
        Ok(ty)
    }

    /// The signing hash of the transaction under this signer's rules.
    pub fn signature_hash<T: SignableTransaction>(&self, tx: &T) -> Result<B256, SignerError> {
        self.check_variant(tx)?;
        Ok(tx.signature_hash())
    }

    /// Splits a raw 65-byte `r ∥ s ∥ recid` signature into the signature
    /// value and the wire `v` under this signer's encoding rule.
    ///
    /// Recovery bytes of 27/28 are accepted as aliases of 0/1.
    pub fn decode_signature<T: SignableTransaction>(
        &self,
        sig: &[u8; 65],
        tx: &T,
    ) -> Result<(Signature, u64), SignerError> {
        let ty = self.check_variant(tx)?;
        let rec_id = match sig[64] {
            id @ (0 | 1) => id,
            id @ (27 | 28) => id - 27,
            id => return Err(SignerError::InvalidRecoveryId(id)),
        };
        let parity = rec_id != 0;
        let r = U256::from_be_slice(&sig[..32]);
        let s = U256::from_be_slice(&sig[32..64]);
        if self.strict_s && s > SECP256K1N_HALF {
            return Err(SignerError::HighS);
        }
        let v = match self.v_encoding(ty) {
            VEncoding::Legacy => to_eip155_value(parity, None),
            VEncoding::Eip155 => to_eip155_value(parity, tx.chain_id()),
            VEncoding::Parity => parity as u64,
        };
        Ok((Signature::new(r, s, parity), v))
    }

    /// Hashes and signs the transaction with the given secret key, producing
    /// a new sealed transaction.
    ///
    /// A legacy transaction without a chain id is stamped with the signer's
    /// chain id when replay protection is active.
    pub fn sign<T: SignableTransaction>(
        &self,
        mut tx: T,
        secret: B256,
    ) -> Result<Signed<T>, SignerError> {
        if tx.ty() == TxType::Legacy as u8
            && tx.chain_id().is_none()
            && matches!(self.legacy_v, VEncoding::Eip155)
        {
            tx.set_chain_id(self.chain_id);
        }
        let hash = self.signature_hash(&tx)?;
        let signature = crypto::sign_message(secret, hash)?;
        Ok(tx.into_signed(signature))
    }

    /// Recovers the sender of a sealed transaction, enforcing the low-s rule
    /// where it applies. The result is memoised on the seal.
    pub fn sender<T: SignableTransaction>(&self, tx: &Signed<T>) -> Result<Address, SignerError> {
        self.check_variant(tx.tx())?;
        if self.strict_s && tx.signature().s() > SECP256K1N_HALF {
            return Err(SignerError::HighS);
        }
        Ok(tx.recover_signer_unchecked()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, Bytes, TxKind};
    use assert_matches::assert_matches;
    use ethp2p_consensus::{TxEip1559, TxEip4844, TxEip7702, TxLegacy};

    fn legacy_tx(chain_id: Option<ChainId>) -> TxLegacy {
        TxLegacy {
            chain_id,
            nonce: 0,
            gas_price: 1000,
            gas_limit: 21_000,
            to: TxKind::Call(address!("3535353535353535353535353535353535353535")),
            value: U256::from(10u128.pow(18)),
            input: Bytes::new(),
        }
    }

    #[test]
    fn permissiveness_grows_with_forks() {
        let frontier = Signer::for_hardfork(Hardfork::Frontier, 1);
        let berlin = Signer::for_hardfork(Hardfork::Berlin, 1);
        let prague = Signer::for_hardfork(Hardfork::Prague, 1);

        assert!(frontier.accepts(TxType::Legacy));
        assert!(!frontier.accepts(TxType::Eip2930));
        assert!(berlin.accepts(TxType::Eip2930));
        assert!(!berlin.accepts(TxType::Eip1559));
        for ty in [TxType::Legacy, TxType::Eip2930, TxType::Eip1559, TxType::Eip4844, TxType::Eip7702]
        {
            assert!(prague.accepts(ty));
        }
    }

    #[test]
    fn sign_and_recover_eip155() {
        let signer = Signer::for_hardfork(Hardfork::Prague, 1);
        let secret = B256::repeat_byte(0x46);

        let signed = signer.sign(legacy_tx(None), secret).unwrap();
        // the signer stamps its chain id
        assert_eq!(signed.tx().chain_id, Some(1));

        let sender = signer.sender(&signed).unwrap();
        assert_eq!(sender, crypto::secret_key_to_address(secret).unwrap());
    }

    #[test]
    fn chain_id_mismatch_rejected() {
        let signer = Signer::for_hardfork(Hardfork::Prague, 1);
        let secret = B256::repeat_byte(0x46);
        assert_matches!(
            signer.sign(legacy_tx(Some(5)), secret),
            Err(SignerError::ChainIdMismatch { tx: Some(5), signer: 1 })
        );
    }

    #[test]
    fn unsupported_variant_rejected() {
        let berlin = Signer::for_hardfork(Hardfork::Berlin, 1);
        let secret = B256::repeat_byte(0x01);
        let tx = TxEip1559 { chain_id: 1, gas_limit: 21_000, ..Default::default() };
        assert_matches!(
            berlin.sign(tx, secret),
            Err(SignerError::UnsupportedVariant(TxType::Eip1559))
        );

        let cancun = Signer::for_hardfork(Hardfork::Cancun, 1);
        let tx = TxEip7702 { chain_id: 1, ..Default::default() };
        assert_matches!(
            cancun.sign(tx, secret),
            Err(SignerError::UnsupportedVariant(TxType::Eip7702))
        );
        let tx = TxEip4844 { chain_id: 1, ..Default::default() };
        assert!(cancun.sign(tx, secret).is_ok());
    }

    #[test]
    fn protected_legacy_rejected_pre_spurious_dragon() {
        let homestead = Signer::for_hardfork(Hardfork::Homestead, 1);
        let secret = B256::repeat_byte(0x02);
        assert_matches!(
            homestead.sign(legacy_tx(Some(1)), secret),
            Err(SignerError::ReplayProtectionUnsupported)
        );
        // unprotected stays unprotected: no chain id is stamped
        let signed = homestead.sign(legacy_tx(None), secret).unwrap();
        assert_eq!(signed.tx().chain_id, None);
    }

    #[test]
    fn unprotected_legacy_accepted_under_eip155() {
        let signer = Signer::for_hardfork(Hardfork::SpuriousDragon, 1);
        let secret = B256::repeat_byte(0x03);
        let homestead = Signer::for_hardfork(Hardfork::Homestead, 1);

        let signed = homestead.sign(legacy_tx(None), secret).unwrap();
        let sender = signer.sender(&signed).unwrap();
        assert_eq!(sender, crypto::secret_key_to_address(secret).unwrap());
    }

    #[test]
    fn high_s_rejected_from_homestead() {
        let secret = B256::repeat_byte(0x04);
        let tx = legacy_tx(None);
        let frontier = Signer::for_hardfork(Hardfork::Frontier, 1);
        let signature = crypto::sign_message(secret, tx.signature_hash()).unwrap();

        // flip s into the high half of the order
        let order = U256::from_be_bytes(
            alloy_primitives::b256!(
                "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141"
            )
            .0,
        );
        let high = Signature::new(signature.r(), order - signature.s(), !signature.v());
        let sealed = tx.into_signed(high);

        let homestead = Signer::for_hardfork(Hardfork::Homestead, 1);
        assert_matches!(homestead.sender(&sealed), Err(SignerError::HighS));
        // Frontier accepts malleable signatures
        assert!(frontier.sender(&sealed).is_ok());
    }

    #[test]
    fn decode_signature_v_rules() {
        let secret = B256::repeat_byte(0x05);
        let prague = Signer::for_hardfork(Hardfork::Prague, 1);

        let legacy = legacy_tx(Some(1));
        let signature = crypto::sign_message(secret, legacy.signature_hash()).unwrap();
        let mut raw = [0u8; 65];
        raw[..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
        raw[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
        raw[64] = signature.v() as u8;

        let (decoded, v) = prague.decode_signature(&raw, &legacy).unwrap();
        assert_eq!(&decoded, &signature);
        assert_eq!(v, 35 + 2 + signature.v() as u64);

        let typed = TxEip1559 { chain_id: 1, gas_limit: 21_000, ..Default::default() };
        let (_, v) = prague.decode_signature(&raw, &typed).unwrap();
        assert_eq!(v, signature.v() as u64);

        raw[64] = 29;
        assert_matches!(
            prague.decode_signature(&raw, &legacy),
            Err(SignerError::InvalidRecoveryId(29))
        );
    }

    #[test]
    fn sender_requires_known_variant_even_when_unsigned_fields_ok() {
        // an EIP-4844 transaction sealed under a pre-Cancun signer
        let secret = B256::repeat_byte(0x06);
        let tx = TxEip4844 { chain_id: 1, ..Default::default() };
        let cancun = Signer::for_hardfork(Hardfork::Cancun, 1);
        let sealed = cancun.sign(tx, secret).unwrap();

        let london = Signer::for_hardfork(Hardfork::London, 1);
        assert_matches!(
            london.sender(&sealed),
            Err(SignerError::UnsupportedVariant(TxType::Eip4844))
        );
    }
}

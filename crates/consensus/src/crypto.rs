//! Secp256k1 helpers for signing transactions and recovering senders.

use alloy_primitives::{keccak256, Address, Signature, B256, U256};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, SecretKey, SECP256K1,
};

/// Opaque error type for sender recovery.
#[derive(Debug, Default, thiserror::Error)]
#[error("failed to recover the signer")]
pub struct RecoveryError;

/// The order of the secp256k1 curve, divided by two. Signatures that should be
/// checked according to [EIP-2](https://eips.ethereum.org/EIPS/eip-2) must
/// have an S value less than or equal to this.
pub const SECP256K1N_HALF: U256 = U256::from_be_bytes([
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
]);

/// Recover the signer from a message hash, _without ensuring that the
/// signature has a low `s` value_.
///
/// This is provided for compatibility with pre-Homestead signatures which may
/// have large `s` values.
pub fn recover_signer_unchecked(
    signature: &Signature,
    hash: B256,
) -> Result<Address, RecoveryError> {
    let mut sig: [u8; 64] = [0; 64];
    sig[0..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
    sig[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());

    let rec_id = RecoveryId::try_from(signature.v() as i32).map_err(|_| RecoveryError)?;
    let sig = RecoverableSignature::from_compact(&sig, rec_id).map_err(|_| RecoveryError)?;

    let public = SECP256K1
        .recover_ecdsa(&Message::from_digest(hash.0), &sig)
        .map_err(|_| RecoveryError)?;
    Ok(public_key_to_address(public))
}

/// Recover the signer address from a message hash, rejecting signatures whose
/// S value exceeds `secp256k1n / 2` as specified in
/// [EIP-2](https://eips.ethereum.org/EIPS/eip-2).
pub fn recover_signer(signature: &Signature, hash: B256) -> Result<Address, RecoveryError> {
    if signature.s() > SECP256K1N_HALF {
        return Err(RecoveryError);
    }
    recover_signer_unchecked(signature, hash)
}

/// Signs the message hash with the given secret key and returns the
/// corresponding recoverable signature.
pub fn sign_message(secret: B256, message: B256) -> Result<Signature, secp256k1::Error> {
    let sec = SecretKey::from_slice(secret.as_ref())?;
    let s = SECP256K1.sign_ecdsa_recoverable(&Message::from_digest(message.0), &sec);
    let (rec_id, data) = s.serialize_compact();

    let signature = Signature::new(
        U256::try_from_be_slice(&data[..32]).expect("The slice has at most 32 bytes"),
        U256::try_from_be_slice(&data[32..64]).expect("The slice has at most 32 bytes"),
        i32::from(rec_id) != 0,
    );
    Ok(signature)
}

/// Converts a public key into an ethereum address by hashing the encoded
/// public key with keccak256.
pub fn public_key_to_address(public: PublicKey) -> Address {
    // strip out the first byte because that should be the SECP256K1_TAG_PUBKEY_UNCOMPRESSED
    // tag returned by libsecp's uncompressed pubkey serialization
    let hash = keccak256(&public.serialize_uncompressed()[1..]);
    Address::from_slice(&hash[12..])
}

/// Derives the address that corresponds to the given secret key.
pub fn secret_key_to_address(secret: B256) -> Result<Address, secp256k1::Error> {
    let sec = SecretKey::from_slice(secret.as_ref())?;
    Ok(public_key_to_address(sec.public_key(SECP256K1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanity_ecrecover_roundtrip() {
        let (secret, public) = secp256k1::generate_keypair(&mut rand::thread_rng());
        let signer = public_key_to_address(public);

        let message = b"hello world";
        let hash = keccak256(message);
        let signature =
            sign_message(B256::from_slice(&secret.secret_bytes()[..]), hash).expect("sign message");

        assert_eq!(recover_signer_unchecked(&signature, hash).ok(), Some(signer));
    }

    #[test]
    fn rejects_high_s() {
        let (secret, _) = secp256k1::generate_keypair(&mut rand::thread_rng());
        let hash = keccak256(b"payload");
        let sig =
            sign_message(B256::from_slice(&secret.secret_bytes()[..]), hash).expect("sign message");

        // flip s to the high half of the curve order
        let order = U256::from_be_bytes([
            0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
            0xFF, 0xFE, 0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C,
            0xD0, 0x36, 0x41, 0x41,
        ]);
        let high_s = Signature::new(sig.r(), order - sig.s(), !sig.v());

        assert!(recover_signer(&high_s, hash).is_err());
        assert!(recover_signer_unchecked(&high_s, hash).is_ok());
    }
}

//! The ECIES handshake: auth/ack message construction and parsing, in the
//! [EIP-8](https://eips.ethereum.org/EIPS/eip-8) tagged form by default and
//! the legacy plain form for old peers.

use crate::{pk2id, EciesError, PeerId, SessionSecrets};
use aes::Aes128;
use alloy_primitives::{keccak256, B256};
use bytes::BytesMut;
use alloy_rlp::{Decodable, Encodable, Header, RlpDecodable, RlpEncodable};
use cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use ctr::Ctr64BE;
use hmac::{Hmac, Mac};
use rand::{thread_rng, Rng};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, SecretKey, SECP256K1,
};
use sha2::{Digest, Sha256};

type Aes128Ctr = Ctr64BE<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// ECIES overhead: ephemeral public key, IV and tag.
const ECIES_OVERHEAD: usize = 65 + 16 + 32;

/// Size of a legacy (pre-EIP-8) auth message on the wire.
pub const LEGACY_AUTH_SIZE: usize = 65 + 32 + 64 + 32 + 1 + ECIES_OVERHEAD;

/// Size of a legacy (pre-EIP-8) ack message on the wire.
pub const LEGACY_ACK_SIZE: usize = 64 + 32 + 1 + ECIES_OVERHEAD;

/// The devp2p protocol version advertised in auth and ack bodies.
const AUTH_VERSION: u8 = 4;

/// NIST SP 800-56 concatenation KDF, one round of SHA-256 for the 32 bytes
/// of key material the scheme needs.
fn kdf(shared: B256) -> B256 {
    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(shared.as_slice());
    B256::from_slice(&hasher.finalize())
}

/// The x coordinate of the ECDH shared point.
fn ecdh_x(public: &PublicKey, secret: &SecretKey) -> B256 {
    B256::from_slice(&secp256k1::ecdh::shared_secret_point(public, secret)[..32])
}

/// Encrypts `plaintext` to `remote` with a fresh ephemeral key:
/// `R(65) ∥ iv(16) ∥ AES128-CTR(kE, iv, plaintext) ∥ HMAC-SHA256(kM, iv ∥ c ∥ aad)`.
fn encrypt_message(remote: &PublicKey, plaintext: &[u8], aad: &[u8]) -> Vec<u8> {
    let mut rng = thread_rng();
    let ephemeral = SecretKey::new(&mut rng);
    let shared = kdf(ecdh_x(remote, &ephemeral));

    let enc_key = &shared[..16];
    let mac_key = Sha256::digest(&shared[16..32]);

    let iv: [u8; 16] = rng.gen();
    let mut ciphertext = plaintext.to_vec();
    Aes128Ctr::new(GenericArray::from_slice(enc_key), GenericArray::from_slice(&iv))
        .apply_keystream(&mut ciphertext);

    let mut hmac =
        HmacSha256::new_from_slice(mac_key.as_slice()).expect("HMAC accepts any key length");
    hmac.update(&iv);
    hmac.update(&ciphertext);
    hmac.update(aad);
    let tag = hmac.finalize().into_bytes();

    let mut out = Vec::with_capacity(ECIES_OVERHEAD + plaintext.len());
    out.extend_from_slice(
        &ephemeral.public_key(SECP256K1).serialize_uncompressed(),
    );
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    out
}

/// Decrypts an ECIES message addressed to `secret`.
fn decrypt_message(secret: &SecretKey, data: &[u8], aad: &[u8]) -> Result<Vec<u8>, EciesError> {
    if data.len() < ECIES_OVERHEAD {
        return Err(EciesError::MessageTooShort);
    }
    let (ephemeral, rest) = data.split_at(65);
    let (iv, rest) = rest.split_at(16);
    let (ciphertext, tag) = rest.split_at(rest.len() - 32);

    let ephemeral = PublicKey::from_slice(ephemeral)?;
    let shared = kdf(ecdh_x(&ephemeral, secret));
    let enc_key = &shared[..16];
    let mac_key = Sha256::digest(&shared[16..32]);

    let mut hmac =
        HmacSha256::new_from_slice(mac_key.as_slice()).expect("HMAC accepts any key length");
    hmac.update(iv);
    hmac.update(ciphertext);
    hmac.update(aad);
    if hmac.verify_slice(tag).is_err() {
        return Err(EciesError::TagMismatch);
    }

    let mut plaintext = ciphertext.to_vec();
    Aes128Ctr::new(GenericArray::from_slice(enc_key), GenericArray::from_slice(iv))
        .apply_keystream(&mut plaintext);
    Ok(plaintext)
}

#[derive(RlpEncodable)]
struct AuthBody<'a> {
    signature: &'a [u8],
    initiator_id: PeerId,
    nonce: B256,
    version: u8,
}

#[derive(RlpEncodable, RlpDecodable)]
struct AckBody {
    ephemeral_id: PeerId,
    nonce: B256,
    version: u8,
}

/// Which side of the connection performs the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Initiator,
    Recipient,
}

/// Handshake state: static and ephemeral keys, nonces, and the raw auth/ack
/// ciphertexts that seed the session MACs.
pub struct Handshake {
    secret_key: SecretKey,
    public_key: PublicKey,
    ephemeral_secret: SecretKey,
    ephemeral_public: PublicKey,
    nonce: B256,
    role: Role,
    eip8: bool,
    remote_public: Option<PublicKey>,
    remote_ephemeral: Option<PublicKey>,
    remote_nonce: Option<B256>,
    sent_msg: Option<Vec<u8>>,
    received_msg: Option<Vec<u8>>,
}

impl std::fmt::Debug for Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handshake")
            .field("role", &self.role)
            .field("eip8", &self.eip8)
            .field("node_id", &pk2id(&self.public_key))
            .finish_non_exhaustive()
    }
}

impl Handshake {
    /// Creates the initiator half of a handshake towards `remote_id`.
    pub fn initiator(secret_key: B256, remote_id: PeerId) -> Result<Self, EciesError> {
        let secret_key = SecretKey::from_slice(secret_key.as_slice())?;
        let remote_public = crate::id2pk(remote_id)?;
        Ok(Self::new(secret_key, Role::Initiator, Some(remote_public)))
    }

    /// Creates the recipient half of a handshake; the remote identity is
    /// learnt from the auth message.
    pub fn recipient(secret_key: B256) -> Result<Self, EciesError> {
        let secret_key = SecretKey::from_slice(secret_key.as_slice())?;
        Ok(Self::new(secret_key, Role::Recipient, None))
    }

    fn new(secret_key: SecretKey, role: Role, remote_public: Option<PublicKey>) -> Self {
        let mut rng = thread_rng();
        let ephemeral_secret = SecretKey::new(&mut rng);
        Self {
            public_key: secret_key.public_key(SECP256K1),
            secret_key,
            ephemeral_public: ephemeral_secret.public_key(SECP256K1),
            ephemeral_secret,
            nonce: B256::from(rng.gen::<[u8; 32]>()),
            role,
            eip8: true,
            remote_public,
            remote_ephemeral: None,
            remote_nonce: None,
            sent_msg: None,
            received_msg: None,
        }
    }

    /// Requests the legacy plain auth/ack format instead of EIP-8.
    pub fn with_legacy_format(mut self) -> Self {
        self.eip8 = false;
        self
    }

    /// The local node id.
    pub fn local_id(&self) -> PeerId {
        pk2id(&self.public_key)
    }

    /// The remote node id, once known.
    pub fn remote_id(&self) -> Option<PeerId> {
        self.remote_public.as_ref().map(pk2id)
    }

    fn signature(&self) -> [u8; 65] {
        let remote = self.remote_public.as_ref().expect("remote key set before signing");
        let token = ecdh_x(remote, &self.secret_key);
        let msg = token ^ self.nonce;

        let (rec_id, sig) = SECP256K1
            .sign_ecdsa_recoverable(
                &Message::from_digest(msg.0),
                &self.ephemeral_secret,
            )
            .serialize_compact();

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig);
        out[64] = i32::from(rec_id) as u8;
        out
    }

    /// Builds the auth message: size-prefixed EIP-8 by default, the plain
    /// fixed-size form when legacy format was requested.
    pub fn create_auth(&mut self) -> BytesMut {
        let wire = if self.eip8 { self.create_auth_eip8() } else { self.create_auth_plain() };
        self.sent_msg = Some(wire.to_vec());
        wire
    }

    fn create_auth_eip8(&mut self) -> BytesMut {
        let signature = self.signature();
        let body = AuthBody {
            signature: &signature[..],
            initiator_id: self.local_id(),
            nonce: self.nonce,
            version: AUTH_VERSION,
        };
        let mut plain = Vec::new();
        body.encode(&mut plain);
        // random padding makes the message length non-distinguishing
        let pad_len = thread_rng().gen_range(100..=300);
        plain.extend(std::iter::repeat_with(|| thread_rng().gen::<u8>()).take(pad_len));

        self.seal_eip8(&plain)
    }

    fn create_auth_plain(&mut self) -> BytesMut {
        let signature = self.signature();
        let mut plain = Vec::with_capacity(65 + 32 + 64 + 32 + 1);
        plain.extend_from_slice(&signature);
        plain.extend_from_slice(keccak256(pk2id(&self.ephemeral_public)).as_slice());
        plain.extend_from_slice(self.local_id().as_slice());
        plain.extend_from_slice(self.nonce.as_slice());
        plain.push(0x00);

        let remote = self.remote_public.as_ref().expect("initiator knows the remote key");
        BytesMut::from(&encrypt_message(remote, &plain, &[])[..])
    }

    /// Builds the ack message in the format the auth arrived in.
    pub fn create_ack(&mut self) -> BytesMut {
        let wire = if self.eip8 { self.create_ack_eip8() } else { self.create_ack_plain() };
        self.sent_msg = Some(wire.to_vec());
        wire
    }

    fn create_ack_eip8(&mut self) -> BytesMut {
        let body = AckBody {
            ephemeral_id: pk2id(&self.ephemeral_public),
            nonce: self.nonce,
            version: AUTH_VERSION,
        };
        let mut plain = Vec::new();
        body.encode(&mut plain);
        let pad_len = thread_rng().gen_range(100..=300);
        plain.extend(std::iter::repeat_with(|| thread_rng().gen::<u8>()).take(pad_len));

        self.seal_eip8(&plain)
    }

    fn create_ack_plain(&mut self) -> BytesMut {
        let mut plain = Vec::with_capacity(64 + 32 + 1);
        plain.extend_from_slice(pk2id(&self.ephemeral_public).as_slice());
        plain.extend_from_slice(self.nonce.as_slice());
        plain.push(0x00);

        let remote = self.remote_public.as_ref().expect("recipient learnt the remote key");
        BytesMut::from(&encrypt_message(remote, &plain, &[])[..])
    }

    fn seal_eip8(&self, plain: &[u8]) -> BytesMut {
        let remote = self.remote_public.as_ref().expect("remote key set before sealing");
        let size = (plain.len() + ECIES_OVERHEAD) as u16;
        let prefix = size.to_be_bytes();
        let ciphertext = encrypt_message(remote, plain, &prefix);

        let mut out = BytesMut::with_capacity(2 + ciphertext.len());
        out.extend_from_slice(&prefix);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Parses an EIP-8 auth message, `data` including the size prefix.
    pub fn parse_auth_eip8(&mut self, data: &[u8]) -> Result<(), EciesError> {
        let (prefix, ciphertext) = data.split_at(2);
        let plain = decrypt_message(&self.secret_key, ciphertext, prefix)?;
        self.received_msg = Some(data.to_vec());
        self.handle_auth_body(&plain)
    }

    /// Parses a legacy plain auth message.
    pub fn parse_auth_plain(&mut self, data: &[u8]) -> Result<(), EciesError> {
        let plain = decrypt_message(&self.secret_key, data, &[])?;
        if plain.len() < 65 + 32 + 64 + 32 {
            return Err(EciesError::MessageTooShort);
        }
        self.received_msg = Some(data.to_vec());
        self.eip8 = false;

        let signature: [u8; 65] = plain[..65].try_into().expect("length checked");
        let initiator_id = PeerId::from_slice(&plain[65 + 32..65 + 32 + 64]);
        let nonce = B256::from_slice(&plain[65 + 32 + 64..65 + 32 + 64 + 32]);
        self.finish_auth(signature, initiator_id, nonce)
    }

    fn handle_auth_body(&mut self, plain: &[u8]) -> Result<(), EciesError> {
        // EIP-8 bodies are RLP lists that may carry trailing items
        let mut buf = plain;
        let header = Header::decode(&mut buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString.into());
        }
        let mut body = &buf[..header.payload_length];

        let signature_bytes = Header::decode_bytes(&mut body, false)?;
        let signature: [u8; 65] =
            signature_bytes.try_into().map_err(|_| EciesError::MessageTooShort)?;
        let initiator_id = PeerId::decode(&mut body)?;
        let nonce = B256::decode(&mut body)?;

        self.finish_auth(signature, initiator_id, nonce)
    }

    fn finish_auth(
        &mut self,
        signature: [u8; 65],
        initiator_id: PeerId,
        nonce: B256,
    ) -> Result<(), EciesError> {
        let remote_public = crate::id2pk(initiator_id)?;
        self.remote_public = Some(remote_public);
        self.remote_nonce = Some(nonce);

        // the signature is by the initiator's ephemeral key over
        // (static-shared-secret ^ initiator-nonce)
        let token = ecdh_x(&remote_public, &self.secret_key);
        let msg = token ^ nonce;

        let rec_id = RecoveryId::try_from(signature[64] as i32)?;
        let sig = RecoverableSignature::from_compact(&signature[..64], rec_id)?;
        let remote_ephemeral = SECP256K1.recover_ecdsa(&Message::from_digest(msg.0), &sig)?;
        self.remote_ephemeral = Some(remote_ephemeral);
        Ok(())
    }

    /// Parses an EIP-8 ack message, `data` including the size prefix.
    pub fn parse_ack_eip8(&mut self, data: &[u8]) -> Result<(), EciesError> {
        let (prefix, ciphertext) = data.split_at(2);
        let plain = decrypt_message(&self.secret_key, ciphertext, prefix)?;
        self.received_msg = Some(data.to_vec());

        let mut buf = plain.as_slice();
        let header = Header::decode(&mut buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString.into());
        }
        let mut body = &buf[..header.payload_length];
        let ephemeral_id = PeerId::decode(&mut body)?;
        let nonce = B256::decode(&mut body)?;

        self.remote_ephemeral = Some(crate::id2pk(ephemeral_id)?);
        self.remote_nonce = Some(nonce);
        Ok(())
    }

    /// Parses a legacy plain ack message.
    pub fn parse_ack_plain(&mut self, data: &[u8]) -> Result<(), EciesError> {
        let plain = decrypt_message(&self.secret_key, data, &[])?;
        if plain.len() < 64 + 32 {
            return Err(EciesError::MessageTooShort);
        }
        self.received_msg = Some(data.to_vec());
        self.eip8 = false;

        self.remote_ephemeral = Some(crate::id2pk(PeerId::from_slice(&plain[..64]))?);
        self.remote_nonce = Some(B256::from_slice(&plain[64..96]));
        Ok(())
    }

    /// Derives the session secrets once auth and ack have both been seen.
    ///
    /// The ingress/egress assignment depends on the role: the initiator's
    /// egress MAC is seeded with the auth it sent, the recipient's with the
    /// ack.
    pub fn secrets(&self) -> SessionSecrets {
        let remote_ephemeral =
            self.remote_ephemeral.as_ref().expect("handshake completed before secrets");
        let remote_nonce = self.remote_nonce.expect("handshake completed before secrets");
        let sent = self.sent_msg.as_ref().expect("handshake completed before secrets");
        let received = self.received_msg.as_ref().expect("handshake completed before secrets");

        let ephemeral_shared = ecdh_x(remote_ephemeral, &self.ephemeral_secret);

        let (initiator_nonce, recipient_nonce) = match self.role {
            Role::Initiator => (self.nonce, remote_nonce),
            Role::Recipient => (remote_nonce, self.nonce),
        };

        let h_nonce = keccak256([recipient_nonce.as_slice(), initiator_nonce.as_slice()].concat());
        let shared_secret = keccak256([ephemeral_shared.as_slice(), h_nonce.as_slice()].concat());
        let aes_secret = keccak256([ephemeral_shared.as_slice(), shared_secret.as_slice()].concat());
        let mac_secret = keccak256([ephemeral_shared.as_slice(), aes_secret.as_slice()].concat());

        SessionSecrets::new(aes_secret, mac_secret, self.nonce, remote_nonce, sent, received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;

    fn keypair() -> (B256, PeerId) {
        let (secret, public) = secp256k1::generate_keypair(&mut thread_rng());
        (B256::from_slice(&secret.secret_bytes()), pk2id(&public))
    }

    #[test]
    fn ecies_message_roundtrip() {
        let secret = SecretKey::new(&mut thread_rng());
        let public = secret.public_key(SECP256K1);

        let encrypted = encrypt_message(&public, b"hello rlpx", b"aad");
        let decrypted = decrypt_message(&secret, &encrypted, b"aad").unwrap();
        assert_eq!(decrypted, b"hello rlpx");

        // tag covers the aad
        assert_matches::assert_matches!(
            decrypt_message(&secret, &encrypted, b"bad"),
            Err(EciesError::TagMismatch)
        );
    }

    #[test]
    fn ecies_rejects_tampering() {
        let secret = SecretKey::new(&mut thread_rng());
        let public = secret.public_key(SECP256K1);

        let mut encrypted = encrypt_message(&public, b"payload", &[]);
        let mid = encrypted.len() / 2;
        encrypted[mid] ^= 0x01;
        assert!(decrypt_message(&secret, &encrypted, &[]).is_err());
    }

    #[test]
    fn handshake_eip8_derives_matching_secrets() {
        let (initiator_secret, initiator_id) = keypair();
        let (recipient_secret, recipient_id) = keypair();

        let mut initiator = Handshake::initiator(initiator_secret, recipient_id).unwrap();
        let mut recipient = Handshake::recipient(recipient_secret).unwrap();

        let auth = initiator.create_auth();
        recipient.parse_auth_eip8(&auth).unwrap();
        assert_eq!(recipient.remote_id(), Some(initiator_id));

        let ack = recipient.create_ack();
        initiator.parse_ack_eip8(&ack).unwrap();

        let mut initiator_secrets = initiator.secrets();
        let mut recipient_secrets = recipient.secrets();

        // the initiator's egress stream is the recipient's ingress stream
        let mut frame = *b"0123456789abcdef";
        initiator_secrets.egress_aes().apply_keystream(&mut frame);
        recipient_secrets.ingress_aes().apply_keystream(&mut frame);
        assert_eq!(&frame, b"0123456789abcdef");

        assert_eq!(
            initiator_secrets.egress_mac_mut().header_mac(&[0u8; 16]),
            recipient_secrets.ingress_mac_mut().header_mac(&[0u8; 16]),
        );
    }

    #[test]
    fn handshake_legacy_roundtrip() {
        let (initiator_secret, _) = keypair();
        let (recipient_secret, recipient_id) = keypair();

        let mut initiator =
            Handshake::initiator(initiator_secret, recipient_id).unwrap().with_legacy_format();
        let mut recipient = Handshake::recipient(recipient_secret).unwrap();

        let auth = initiator.create_auth();
        assert_eq!(auth.len(), LEGACY_AUTH_SIZE);
        recipient.parse_auth_plain(&auth).unwrap();

        let ack = recipient.create_ack();
        assert_eq!(ack.len(), LEGACY_ACK_SIZE);
        initiator.parse_ack_plain(&ack).unwrap();

        let mut a = initiator.secrets();
        let mut b = recipient.secrets();
        let mut frame = *b"legacy handshake";
        a.egress_aes().apply_keystream(&mut frame);
        b.ingress_aes().apply_keystream(&mut frame);
        assert_eq!(&frame, b"legacy handshake");
    }

    #[test]
    // EIP-8 test vector: the auth body must stay parseable with trailing
    // list elements, per https://eips.ethereum.org/EIPS/eip-8
    fn parse_auth_with_trailing_fields() {
        let (recipient_secret, recipient_id) = keypair();
        let (initiator_secret, _) = keypair();

        let mut initiator = Handshake::initiator(initiator_secret, recipient_id).unwrap();
        let signature = initiator.signature();

        // hand-build a body with an extra trailing element
        let mut fields = Vec::new();
        signature.as_slice().encode(&mut fields);
        initiator.local_id().encode(&mut fields);
        initiator.nonce.encode(&mut fields);
        AUTH_VERSION.encode(&mut fields);
        hex!("c104").as_slice().encode(&mut fields); // future extension
        let mut plain = Vec::new();
        Header { list: true, payload_length: fields.len() }.encode(&mut plain);
        plain.extend_from_slice(&fields);

        let sealed = initiator.seal_eip8(&plain);
        let mut recipient = Handshake::recipient(recipient_secret).unwrap();
        recipient.parse_auth_eip8(&sealed).unwrap();
        assert_eq!(recipient.remote_id(), Some(initiator.local_id()));
    }
}

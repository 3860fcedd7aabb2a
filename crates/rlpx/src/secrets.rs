//! Session secrets and the chained frame MAC.

use aes::Aes256;
use alloy_primitives::B256;
use cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit, KeyIvInit};
use ctr::Ctr64BE;
use sha3::{Digest, Keccak256};

/// The continuous AES-256-CTR keystream used for frame encryption, one per
/// direction, IV zero.
pub type Aes256Ctr = Ctr64BE<Aes256>;

/// The keccak-based frame MAC state of one direction.
///
/// Header and body MACs are chained: each update whitens the running digest
/// with an AES-256 encryption under the mac-secret before absorbing it, so a
/// MAC depends on every frame that went before.
#[derive(Clone)]
pub struct MacState {
    secret: B256,
    hasher: Keccak256,
}

impl std::fmt::Debug for MacState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacState").finish_non_exhaustive()
    }
}

impl MacState {
    /// Creates a MAC state keyed with the session mac-secret.
    pub fn new(secret: B256) -> Self {
        Self { secret, hasher: Keccak256::new() }
    }

    /// Absorbs raw bytes into the state, used for seeding only.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// The current 16-byte digest.
    pub fn digest(&self) -> [u8; 16] {
        let full: [u8; 32] = self.hasher.clone().finalize().into();
        full[..16].try_into().expect("slice of fixed length")
    }

    fn aes_digest(&self) -> [u8; 16] {
        let aes = Aes256::new(GenericArray::from_slice(self.secret.as_slice()));
        let mut block = GenericArray::clone_from_slice(&self.digest());
        aes.encrypt_block(&mut block);
        block.into()
    }

    /// Absorbs an encrypted frame header and returns its MAC.
    pub fn header_mac(&mut self, encrypted_header: &[u8; 16]) -> [u8; 16] {
        let mut seed = self.aes_digest();
        for (byte, header_byte) in seed.iter_mut().zip(encrypted_header) {
            *byte ^= header_byte;
        }
        self.hasher.update(seed);
        self.digest()
    }

    /// Absorbs an encrypted frame body and returns its MAC.
    pub fn body_mac(&mut self, encrypted_body: &[u8]) -> [u8; 16] {
        self.hasher.update(encrypted_body);
        let prev = self.digest();
        let mut seed = self.aes_digest();
        for (byte, prev_byte) in seed.iter_mut().zip(&prev) {
            *byte ^= prev_byte;
        }
        self.hasher.update(seed);
        self.digest()
    }
}

/// The secrets of an authenticated session: frame ciphers and MAC states for
/// both directions.
pub struct SessionSecrets {
    egress_aes: Aes256Ctr,
    ingress_aes: Aes256Ctr,
    egress_mac: MacState,
    ingress_mac: MacState,
}

impl std::fmt::Debug for SessionSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSecrets").finish_non_exhaustive()
    }
}

impl SessionSecrets {
    /// Assembles the secrets from the derived keys and the handshake
    /// transcript.
    ///
    /// The egress MAC is seeded with `(mac-secret ⊕ remote-nonce)` and the
    /// raw handshake message this side sent; the ingress MAC mirrors it with
    /// the local nonce and the received message.
    pub fn new(
        aes_secret: B256,
        mac_secret: B256,
        local_nonce: B256,
        remote_nonce: B256,
        sent_msg: &[u8],
        received_msg: &[u8],
    ) -> Self {
        let iv = [0u8; 16];
        let egress_aes = Aes256Ctr::new(
            GenericArray::from_slice(aes_secret.as_slice()),
            GenericArray::from_slice(&iv),
        );
        let ingress_aes = Aes256Ctr::new(
            GenericArray::from_slice(aes_secret.as_slice()),
            GenericArray::from_slice(&iv),
        );

        let mut egress_mac = MacState::new(mac_secret);
        egress_mac.update((mac_secret ^ remote_nonce).as_slice());
        egress_mac.update(sent_msg);

        let mut ingress_mac = MacState::new(mac_secret);
        ingress_mac.update((mac_secret ^ local_nonce).as_slice());
        ingress_mac.update(received_msg);

        Self { egress_aes, ingress_aes, egress_mac, ingress_mac }
    }

    /// The egress frame cipher.
    pub fn egress_aes(&mut self) -> &mut Aes256Ctr {
        &mut self.egress_aes
    }

    /// The ingress frame cipher.
    pub fn ingress_aes(&mut self) -> &mut Aes256Ctr {
        &mut self.ingress_aes
    }

    /// The egress MAC state.
    pub fn egress_mac_mut(&mut self) -> &mut MacState {
        &mut self.egress_mac
    }

    /// The ingress MAC state.
    pub fn ingress_mac_mut(&mut self) -> &mut MacState {
        &mut self.ingress_mac
    }

    /// Splits the secrets into their directional halves for the codec.
    pub fn split(self) -> ((Aes256Ctr, MacState), (Aes256Ctr, MacState)) {
        ((self.egress_aes, self.egress_mac), (self.ingress_aes, self.ingress_mac))
    }
}

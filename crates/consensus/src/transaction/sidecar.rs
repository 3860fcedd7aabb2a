//! Blob sidecars carried by pooled EIP-4844 transactions.

use crate::{constants::CELLS_PER_EXT_BLOB, TxError};
use alloy_primitives::FixedBytes;
use alloy_rlp::{BufMut, Decodable, Encodable, Header};

/// An opaque blob payload. KZG validation is a collaborator concern; the wire
/// layer only carries the bytes.
pub type Blob = FixedBytes<{ crate::constants::BYTES_PER_BLOB }>;

/// A KZG commitment or proof.
pub type Bytes48 = FixedBytes<{ crate::constants::BYTES_PER_COMMITMENT }>;

/// The [EIP-4844](https://eips.ethereum.org/EIPS/eip-4844) blob sidecar: one
/// proof per blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlobTransactionSidecar {
    /// The blob data.
    pub blobs: Vec<Blob>,
    /// One KZG commitment per blob.
    pub commitments: Vec<Bytes48>,
    /// One KZG proof per blob.
    pub proofs: Vec<Bytes48>,
}

/// The [EIP-7594](https://eips.ethereum.org/EIPS/eip-7594) cell-proof sidecar:
/// `CELLS_PER_EXT_BLOB` proofs per blob, tagged with wrapper version 1 on the
/// wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlobTransactionSidecarV1 {
    /// The blob data.
    pub blobs: Vec<Blob>,
    /// One KZG commitment per blob.
    pub commitments: Vec<Bytes48>,
    /// `CELLS_PER_EXT_BLOB` cell proofs per blob.
    pub cell_proofs: Vec<Bytes48>,
}

impl BlobTransactionSidecar {
    /// Checks that the per-blob field counts agree.
    pub fn validate(&self) -> Result<(), TxError> {
        if self.blobs.len() != self.commitments.len() || self.blobs.len() != self.proofs.len() {
            return Err(TxError::SidecarLengthMismatch);
        }
        Ok(())
    }

    pub(crate) fn fields_len(&self) -> usize {
        self.blobs.length() + self.commitments.length() + self.proofs.length()
    }

    pub(crate) fn encode_fields(&self, out: &mut dyn BufMut) {
        self.blobs.encode(out);
        self.commitments.encode(out);
        self.proofs.encode(out);
    }

    pub(crate) fn decode_fields(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self {
            blobs: Decodable::decode(buf)?,
            commitments: Decodable::decode(buf)?,
            proofs: Decodable::decode(buf)?,
        })
    }
}

impl BlobTransactionSidecarV1 {
    /// The wrapper version byte preceding the sidecar fields on the wire.
    pub const WRAPPER_VERSION: u8 = 1;

    /// Checks that the per-blob field counts agree.
    pub fn validate(&self) -> Result<(), TxError> {
        if self.blobs.len() != self.commitments.len()
            || self.cell_proofs.len() != self.blobs.len() * CELLS_PER_EXT_BLOB
        {
            return Err(TxError::SidecarLengthMismatch);
        }
        Ok(())
    }

    pub(crate) fn fields_len(&self) -> usize {
        Self::WRAPPER_VERSION.length()
            + self.blobs.length()
            + self.commitments.length()
            + self.cell_proofs.length()
    }

    pub(crate) fn encode_fields(&self, out: &mut dyn BufMut) {
        Self::WRAPPER_VERSION.encode(out);
        self.blobs.encode(out);
        self.commitments.encode(out);
        self.cell_proofs.encode(out);
    }

    /// Decodes the sidecar fields following the wrapper version byte.
    pub(crate) fn decode_fields(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self {
            blobs: Decodable::decode(buf)?,
            commitments: Decodable::decode(buf)?,
            cell_proofs: Decodable::decode(buf)?,
        })
    }
}

/// Either sidecar flavour a pooled blob transaction may carry.
///
/// Version 0 is the EIP-4844 blob-proof form, version 1 the EIP-7594
/// cell-proof form. On the wire the v1 form is distinguished by a wrapper
/// version byte between the transaction payload and the blobs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TxSidecar {
    /// EIP-4844 sidecar, wrapper version 0.
    Eip4844(BlobTransactionSidecar),
    /// EIP-7594 sidecar, wrapper version 1.
    Eip7594(BlobTransactionSidecarV1),
}

impl TxSidecar {
    /// The wrapper version advertised on the wire.
    pub const fn version(&self) -> u8 {
        match self {
            Self::Eip4844(_) => 0,
            Self::Eip7594(_) => 1,
        }
    }

    /// Number of blobs the sidecar carries.
    pub fn blob_count(&self) -> usize {
        match self {
            Self::Eip4844(sidecar) => sidecar.blobs.len(),
            Self::Eip7594(sidecar) => sidecar.blobs.len(),
        }
    }

    /// Checks the sidecar's internal consistency.
    pub fn validate(&self) -> Result<(), TxError> {
        match self {
            Self::Eip4844(sidecar) => sidecar.validate(),
            Self::Eip7594(sidecar) => sidecar.validate(),
        }
    }

    pub(crate) fn fields_len(&self) -> usize {
        match self {
            Self::Eip4844(sidecar) => sidecar.fields_len(),
            Self::Eip7594(sidecar) => sidecar.fields_len(),
        }
    }

    pub(crate) fn encode_fields(&self, out: &mut dyn BufMut) {
        match self {
            Self::Eip4844(sidecar) => sidecar.encode_fields(out),
            Self::Eip7594(sidecar) => sidecar.encode_fields(out),
        }
    }

    /// Decodes the sidecar fields following the transaction payload of a
    /// pooled blob transaction.
    ///
    /// Version 0 has no tag and starts directly with the blob list; any
    /// non-list item is read as the wrapper version byte, of which only
    /// version 1 is known.
    pub(crate) fn decode_fields(buf: &mut &[u8]) -> Result<Self, TxError> {
        let is_list = {
            let mut peek = *buf;
            Header::decode(&mut peek)?.list
        };
        if is_list {
            return Ok(Self::Eip4844(BlobTransactionSidecar::decode_fields(buf)?));
        }
        let version = u8::decode(buf)?;
        if version != BlobTransactionSidecarV1::WRAPPER_VERSION {
            return Err(TxError::UnsupportedSidecarVersion(version));
        }
        Ok(Self::Eip7594(BlobTransactionSidecarV1::decode_fields(buf)?))
    }
}

impl Default for TxSidecar {
    fn default() -> Self {
        Self::Eip4844(BlobTransactionSidecar::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn v0_sidecar(blobs: usize) -> BlobTransactionSidecar {
        BlobTransactionSidecar {
            blobs: vec![Blob::repeat_byte(1); blobs],
            commitments: vec![Bytes48::repeat_byte(2); blobs],
            proofs: vec![Bytes48::repeat_byte(3); blobs],
        }
    }

    #[test]
    fn v0_roundtrip() {
        let sidecar = TxSidecar::Eip4844(v0_sidecar(2));
        let mut buf = Vec::new();
        sidecar.encode_fields(&mut buf);
        let decoded = TxSidecar::decode_fields(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, sidecar);
        assert_eq!(decoded.version(), 0);
    }

    #[test]
    fn v1_roundtrip() {
        let sidecar = TxSidecar::Eip7594(BlobTransactionSidecarV1 {
            blobs: vec![Blob::repeat_byte(1)],
            commitments: vec![Bytes48::repeat_byte(2)],
            cell_proofs: vec![Bytes48::repeat_byte(3); CELLS_PER_EXT_BLOB],
        });
        sidecar.validate().unwrap();

        let mut buf = Vec::new();
        sidecar.encode_fields(&mut buf);
        let decoded = TxSidecar::decode_fields(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, sidecar);
        assert_eq!(decoded.version(), 1);
    }

    #[test]
    fn unknown_wrapper_version_rejected() {
        let mut buf = Vec::new();
        2u8.encode(&mut buf);
        v0_sidecar(1).encode_fields(&mut buf);
        assert_matches!(
            TxSidecar::decode_fields(&mut buf.as_slice()),
            Err(TxError::UnsupportedSidecarVersion(2))
        );
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let mut sidecar = v0_sidecar(2);
        sidecar.proofs.pop();
        assert_matches!(sidecar.validate(), Err(TxError::SidecarLengthMismatch));
    }
}

//! Protocol constants used by the transaction codec and gas accounting.

use alloy_primitives::{b256, B256};

/// Gas charged for every transaction.
pub const TX_GAS: u64 = 21_000;

/// Additional gas charged for contract-creation transactions since Homestead
/// ([EIP-2](https://eips.ethereum.org/EIPS/eip-2)).
pub const TX_CREATION_GAS: u64 = 32_000;

/// Gas per zero byte of transaction data.
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Gas per non-zero byte of transaction data before Istanbul.
pub const TX_DATA_NON_ZERO_GAS_FRONTIER: u64 = 68;

/// Gas per non-zero byte of transaction data since Istanbul
/// ([EIP-2028](https://eips.ethereum.org/EIPS/eip-2028)).
pub const TX_DATA_NON_ZERO_GAS_EIP2028: u64 = 16;

/// Gas per address in an access list ([EIP-2930](https://eips.ethereum.org/EIPS/eip-2930)).
pub const ACCESS_LIST_ADDRESS_GAS: u64 = 2_400;

/// Gas per storage key in an access list.
pub const ACCESS_LIST_STORAGE_KEY_GAS: u64 = 1_900;

/// Gas per 32-byte word of initcode since Shanghai
/// ([EIP-3860](https://eips.ethereum.org/EIPS/eip-3860)).
pub const INITCODE_WORD_GAS: u64 = 2;

/// Gas per empty account authorization
/// ([EIP-7702](https://eips.ethereum.org/EIPS/eip-7702)).
pub const PER_EMPTY_ACCOUNT_GAS: u64 = 25_000;

/// Floor cost per calldata token since Prague
/// ([EIP-7623](https://eips.ethereum.org/EIPS/eip-7623)).
pub const TOTAL_COST_FLOOR_PER_TOKEN: u64 = 10;

/// Calldata token weight of a non-zero byte under EIP-7623.
pub const NON_ZERO_BYTE_TOKEN_WEIGHT: u64 = 4;

/// Gas consumed per blob ([EIP-4844](https://eips.ethereum.org/EIPS/eip-4844)).
pub const DATA_GAS_PER_BLOB: u64 = 131_072;

/// Size of a single blob in bytes.
pub const BYTES_PER_BLOB: usize = 131_072;

/// Size of a KZG commitment or proof in bytes.
pub const BYTES_PER_COMMITMENT: usize = 48;

/// Maximum number of blobs a single transaction may carry.
pub const MAX_BLOBS_PER_TX: usize = 6;

/// Number of cells in an extended blob
/// ([EIP-7594](https://eips.ethereum.org/EIPS/eip-7594)).
pub const CELLS_PER_EXT_BLOB: usize = 128;

/// The only valid version byte of a blob versioned hash.
pub const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;

/// Keccak-256 hash of the RLP encoding of an empty ommer list.
pub const EMPTY_OMMER_ROOT_HASH: B256 =
    b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");

/// Root hash of an empty merkle-patricia trie.
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

//! The normalized block document.

use alloy_rpc_types::Block;

/// A block as persisted to the document store.
///
/// Integer header fields are rendered to base-10 strings; `number` is
/// additionally carried as an `i64` so the store can index and order on it.
/// Hash-like fields keep their `0x`-prefixed hex rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockDocument {
    /// Block hash, unique per block.
    pub hash: String,
    /// Block height, unique and monotonically increasing.
    pub number: i64,
    /// Unix timestamp of the block, decimal string.
    pub timestamp: String,
    /// Hash of the parent block.
    pub parent_hash: String,
    /// Block difficulty, decimal string.
    pub difficulty: String,
    /// Total chain difficulty at this block, decimal string. Empty when the
    /// node no longer serves it.
    pub total_difficulty: String,
    /// Gas used by all transactions in the block, decimal string.
    pub gas_used: String,
    /// Block gas limit, decimal string.
    pub gas_limit: String,
    /// EIP-1559 base fee, decimal string. Empty for pre-London blocks.
    pub base_fee_per_gas: String,
    /// Proof-of-work nonce, decimal string.
    pub nonce: String,
    /// Address of the block producer.
    pub miner: String,
    /// Block size in bytes, decimal string.
    pub size: String,
    /// State trie root hash.
    pub state_root: String,
    /// Hash of the ommers list.
    pub sha3_uncles: String,
    /// Transaction trie root hash.
    pub transactions_root: String,
    /// Receipt trie root hash.
    pub receipts_root: String,
    /// Bloom filter over the block's logs.
    pub logs_bloom: String,
    /// Arbitrary extra data supplied by the producer.
    pub extra_data: String,
    /// Mix hash from the sealing algorithm.
    pub mix_hash: String,
    /// Ordered ommer block hashes.
    pub uncles: Vec<String>,
}

impl BlockDocument {
    /// Converts an RPC block into its document form.
    pub fn from_rpc(block: &Block) -> Self {
        let header = &block.header;
        Self {
            hash: header.hash.to_string(),
            number: header.number as i64,
            timestamp: header.timestamp.to_string(),
            parent_hash: header.parent_hash.to_string(),
            difficulty: header.difficulty.to_string(),
            total_difficulty: header
                .total_difficulty
                .map(|td| td.to_string())
                .unwrap_or_default(),
            gas_used: header.gas_used.to_string(),
            gas_limit: header.gas_limit.to_string(),
            base_fee_per_gas: header
                .base_fee_per_gas
                .map(|fee| fee.to_string())
                .unwrap_or_default(),
            nonce: header
                .nonce
                .map(|n| u64::from_be_bytes(n.0).to_string())
                .unwrap_or_default(),
            miner: header.miner.to_string(),
            size: block.size.map(|s| s.to_string()).unwrap_or_default(),
            state_root: header.state_root.to_string(),
            sha3_uncles: header.uncles_hash.to_string(),
            transactions_root: header.transactions_root.to_string(),
            receipts_root: header.receipts_root.to_string(),
            logs_bloom: header.logs_bloom.to_string(),
            extra_data: header.extra_data.to_string(),
            mix_hash: header.mix_hash.map(|h| h.to_string()).unwrap_or_default(),
            uncles: block.uncles.iter().map(|u| u.to_string()).collect(),
        }
    }
}

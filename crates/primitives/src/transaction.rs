//! The normalized transaction and access-list documents.

use crate::ReceiptRecord;
use alloy_consensus::TxEnvelope;
use alloy_primitives::Address;
use alloy_rpc_types::Transaction;
use tracing::warn;

/// A transaction as persisted to the document store.
///
/// Receipt-derived fields (`cumulative_gas_used`, `effective_gas_price`,
/// `status`) are empty until [TransactionDocument::apply_receipt] merges the
/// matching receipt in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionDocument {
    /// Transaction hash, unique.
    pub hash: String,
    /// Number of the enclosing block.
    pub block_number: i64,
    /// Hash of the enclosing block.
    pub block_hash: String,
    /// Position of the transaction within its block.
    pub transaction_index: i64,
    /// Sender address.
    pub from: String,
    /// Recipient address. Empty for contract creations.
    pub to: String,
    /// Transferred value in wei, decimal string.
    pub value: String,
    /// Gas limit of the transaction, decimal string.
    pub gas: String,
    /// Gas price, decimal string. For type-2 transactions this carries the
    /// fee cap.
    pub gas_price: String,
    /// EIP-1559 max fee per gas, decimal string. Empty for legacy types.
    pub max_fee_per_gas: String,
    /// EIP-1559 max priority fee per gas, decimal string.
    pub max_priority_fee_per_gas: String,
    /// Call data.
    pub input: String,
    /// Sender nonce, decimal string.
    pub nonce: String,
    /// Transaction type discriminator: "0", "1", or "2".
    pub tx_type: String,
    /// Chain id, decimal string. Empty for unprotected legacy transactions.
    pub chain_id: String,
    /// Signature `v`, decimal string.
    pub v: String,
    /// Signature `r`, hex string.
    pub r: String,
    /// Signature `s`, hex string.
    pub s: String,
    /// Cumulative gas used up to and including this transaction.
    pub cumulative_gas_used: String,
    /// Effective gas price paid, decimal string.
    pub effective_gas_price: String,
    /// Execution status from the receipt.
    pub status: bool,
    /// Access list entries. Only populated for transaction types >= 1.
    pub access_list: Vec<AccessListEntryDocument>,
}

/// An EIP-2930 access-list entry owned by a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessListEntryDocument {
    /// The address whose storage is declared.
    pub address: String,
    /// Ordered 32-byte storage keys, hex strings.
    pub storage_keys: Vec<String>,
}

impl TransactionDocument {
    /// Converts an RPC transaction into its document form.
    pub fn from_rpc(tx: &Transaction) -> Self {
        let tx_type = tx.transaction_type.unwrap_or(0);
        // Mined type-2 transactions carry the fee cap in the gas price slot.
        let gas_price = if tx_type >= 2 {
            tx.max_fee_per_gas.map(|fee| fee.to_string()).unwrap_or_default()
        } else {
            tx.gas_price.map(|price| price.to_string()).unwrap_or_default()
        };
        let (v, r, s) = match &tx.signature {
            Some(sig) => {
                (sig.v.to_string(), format!("{:#x}", sig.r), format!("{:#x}", sig.s))
            }
            None => Default::default(),
        };
        let access_list = if tx_type >= 1 {
            tx.access_list
                .as_ref()
                .map(|list| {
                    list.0
                        .iter()
                        .map(|item| AccessListEntryDocument {
                            address: item.address.to_string(),
                            storage_keys: item
                                .storage_keys
                                .iter()
                                .map(|key| key.to_string())
                                .collect(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Self {
            hash: tx.hash.to_string(),
            block_number: tx.block_number.unwrap_or_default() as i64,
            block_hash: tx.block_hash.map(|h| h.to_string()).unwrap_or_default(),
            transaction_index: tx.transaction_index.unwrap_or_default() as i64,
            from: recover_sender(tx).to_string(),
            to: tx.to.map(|addr| addr.to_string()).unwrap_or_default(),
            value: tx.value.to_string(),
            gas: tx.gas.to_string(),
            gas_price,
            max_fee_per_gas: tx.max_fee_per_gas.map(|fee| fee.to_string()).unwrap_or_default(),
            max_priority_fee_per_gas: tx
                .max_priority_fee_per_gas
                .map(|fee| fee.to_string())
                .unwrap_or_default(),
            input: tx.input.to_string(),
            nonce: tx.nonce.to_string(),
            tx_type: tx_type.to_string(),
            chain_id: tx.chain_id.map(|id| id.to_string()).unwrap_or_default(),
            v,
            r,
            s,
            cumulative_gas_used: String::new(),
            effective_gas_price: String::new(),
            status: false,
            access_list,
        }
    }

    /// Merges the matching receipt's fields into the document.
    pub fn apply_receipt(&mut self, receipt: &ReceiptRecord) {
        self.cumulative_gas_used = receipt.cumulative_gas_used.clone();
        self.effective_gas_price = receipt.effective_gas_price.clone();
        self.status = receipt.status;
    }
}

/// Recovers the sender address from the transaction signature, falling back
/// to the wire-provided sender and finally the zero address.
fn recover_sender(tx: &Transaction) -> Address {
    if tx.signature.is_none() {
        warn!(target: "primitives", hash = %tx.hash, "transaction carries no signature, using wire sender");
        return tx.from;
    }
    let envelope: TxEnvelope = match tx.clone().try_into() {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(target: "primitives", hash = %tx.hash, "failed to build envelope: {err}, using wire sender");
            return tx.from;
        }
    };
    let recovered = match &envelope {
        TxEnvelope::Legacy(signed) => signed.recover_signer(),
        TxEnvelope::Eip2930(signed) => signed.recover_signer(),
        TxEnvelope::Eip1559(signed) => signed.recover_signer(),
        TxEnvelope::Eip4844(signed) => signed.recover_signer(),
        TxEnvelope::Eip7702(signed) => signed.recover_signer(),
        _ => Ok(tx.from),
    };
    match recovered {
        Ok(sender) => sender,
        Err(err) => {
            warn!(target: "primitives", hash = %tx.hash, "failed to recover sender: {err}, using wire sender");
            tx.from
        }
    }
}

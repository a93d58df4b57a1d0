//! GraphQL mutation rendering for the document collections.
//!
//! Mutations are rendered by string templating with stable aliases; the
//! serialization rules here are the write-side contract with the store:
//! strings escaped and quoted, integers and booleans bare, string arrays as
//! JSON arrays, empty arrays as `[]`.

use silt_primitives::{AccessListEntryDocument, BlockDocument, LogDocument, TransactionDocument};
use std::fmt::Write;

/// A GraphQL input value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GqlValue {
    /// A quoted, escaped string.
    Str(String),
    /// A bare integer.
    Int(i64),
    /// A bare boolean.
    Bool(bool),
    /// An array of quoted, escaped strings.
    StrList(Vec<String>),
}

/// Escapes a string for embedding in a GraphQL document: backslashes first,
/// then quotes.
pub fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

impl GqlValue {
    fn render(&self, out: &mut String) {
        match self {
            Self::Str(s) => {
                out.push('"');
                out.push_str(&escape(s));
                out.push('"');
            }
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::StrList(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push('"');
                    out.push_str(&escape(item));
                    out.push('"');
                }
                out.push(']');
            }
        }
    }
}

/// Builds a mutation document from aliased `create_*` / `update_*` fields.
#[derive(Debug, Default)]
pub struct MutationBuilder {
    parts: Vec<String>,
}

impl MutationBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an aliased `create_<collection>` field.
    pub fn create(&mut self, alias: &str, collection: &str, fields: &[(&str, GqlValue)]) {
        let mut part = format!("{alias}: create_{collection}(input: {{");
        render_fields(&mut part, fields);
        part.push_str("}) { _docID }");
        self.parts.push(part);
    }

    /// Appends an aliased `update_<collection>` field with an equality
    /// filter.
    pub fn update(
        &mut self,
        alias: &str,
        collection: &str,
        filter: &[(&str, GqlValue)],
        fields: &[(&str, GqlValue)],
    ) {
        let mut part = format!("{alias}: update_{collection}(filter: {{");
        for (i, (name, value)) in filter.iter().enumerate() {
            if i > 0 {
                part.push_str(", ");
            }
            let _ = write!(part, "{name}: {{_eq: ");
            value.render(&mut part);
            part.push('}');
        }
        part.push_str("}, input: {");
        render_fields(&mut part, fields);
        part.push_str("}) { _docID }");
        self.parts.push(part);
    }

    /// Whether no fields have been appended.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Renders the complete mutation document.
    pub fn build(&self) -> String {
        format!("mutation {{ {} }}", self.parts.join(" "))
    }
}

fn render_fields(out: &mut String, fields: &[(&str, GqlValue)]) {
    for (i, (name, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{name}: ");
        value.render(out);
    }
}

/// Input fields for a block document.
pub fn block_fields(block: &BlockDocument) -> Vec<(&'static str, GqlValue)> {
    vec![
        ("hash", GqlValue::Str(block.hash.clone())),
        ("number", GqlValue::Int(block.number)),
        ("timestamp", GqlValue::Str(block.timestamp.clone())),
        ("parentHash", GqlValue::Str(block.parent_hash.clone())),
        ("difficulty", GqlValue::Str(block.difficulty.clone())),
        ("totalDifficulty", GqlValue::Str(block.total_difficulty.clone())),
        ("gasUsed", GqlValue::Str(block.gas_used.clone())),
        ("gasLimit", GqlValue::Str(block.gas_limit.clone())),
        ("baseFeePerGas", GqlValue::Str(block.base_fee_per_gas.clone())),
        ("nonce", GqlValue::Str(block.nonce.clone())),
        ("miner", GqlValue::Str(block.miner.clone())),
        ("size", GqlValue::Str(block.size.clone())),
        ("stateRoot", GqlValue::Str(block.state_root.clone())),
        ("sha3Uncles", GqlValue::Str(block.sha3_uncles.clone())),
        ("transactionsRoot", GqlValue::Str(block.transactions_root.clone())),
        ("receiptsRoot", GqlValue::Str(block.receipts_root.clone())),
        ("logsBloom", GqlValue::Str(block.logs_bloom.clone())),
        ("extraData", GqlValue::Str(block.extra_data.clone())),
        ("mixHash", GqlValue::Str(block.mix_hash.clone())),
        ("uncles", GqlValue::StrList(block.uncles.clone())),
    ]
}

/// Input fields for a transaction document. `block_doc_id` fills the
/// foreign reference to the owning block when known at creation time.
pub fn transaction_fields(
    tx: &TransactionDocument,
    block_doc_id: Option<&str>,
) -> Vec<(&'static str, GqlValue)> {
    let mut fields = vec![
        ("hash", GqlValue::Str(tx.hash.clone())),
        ("blockNumber", GqlValue::Int(tx.block_number)),
        ("blockHash", GqlValue::Str(tx.block_hash.clone())),
        ("transactionIndex", GqlValue::Int(tx.transaction_index)),
        ("from", GqlValue::Str(tx.from.clone())),
        ("to", GqlValue::Str(tx.to.clone())),
        ("value", GqlValue::Str(tx.value.clone())),
        ("gas", GqlValue::Str(tx.gas.clone())),
        ("gasPrice", GqlValue::Str(tx.gas_price.clone())),
        ("maxFeePerGas", GqlValue::Str(tx.max_fee_per_gas.clone())),
        ("maxPriorityFeePerGas", GqlValue::Str(tx.max_priority_fee_per_gas.clone())),
        ("input", GqlValue::Str(tx.input.clone())),
        ("nonce", GqlValue::Str(tx.nonce.clone())),
        ("type", GqlValue::Str(tx.tx_type.clone())),
        ("chainId", GqlValue::Str(tx.chain_id.clone())),
        ("v", GqlValue::Str(tx.v.clone())),
        ("r", GqlValue::Str(tx.r.clone())),
        ("s", GqlValue::Str(tx.s.clone())),
        ("cumulativeGasUsed", GqlValue::Str(tx.cumulative_gas_used.clone())),
        ("effectiveGasPrice", GqlValue::Str(tx.effective_gas_price.clone())),
        ("status", GqlValue::Bool(tx.status)),
    ];
    if let Some(id) = block_doc_id {
        fields.push(("block", GqlValue::Str(id.to_string())));
    }
    fields
}

/// Input fields for a log document with optional foreign references to its
/// block and transaction.
pub fn log_fields(
    log: &LogDocument,
    block_doc_id: Option<&str>,
    tx_doc_id: Option<&str>,
) -> Vec<(&'static str, GqlValue)> {
    let mut fields = vec![
        ("address", GqlValue::Str(log.address.clone())),
        ("topics", GqlValue::StrList(log.topics.clone())),
        ("data", GqlValue::Str(log.data.clone())),
        ("blockNumber", GqlValue::Int(log.block_number)),
        ("transactionHash", GqlValue::Str(log.transaction_hash.clone())),
        ("transactionIndex", GqlValue::Int(log.transaction_index)),
        ("blockHash", GqlValue::Str(log.block_hash.clone())),
        ("logIndex", GqlValue::Int(log.log_index)),
        // `removed` travels as a string in the document schema.
        ("removed", GqlValue::Str(if log.removed { "true" } else { "false" }.to_string())),
    ];
    if let Some(id) = block_doc_id {
        fields.push(("block", GqlValue::Str(id.to_string())));
    }
    if let Some(id) = tx_doc_id {
        fields.push(("transaction", GqlValue::Str(id.to_string())));
    }
    fields
}

/// Input fields for an access-list entry with an optional foreign reference
/// to its transaction.
pub fn access_list_entry_fields(
    entry: &AccessListEntryDocument,
    tx_doc_id: Option<&str>,
) -> Vec<(&'static str, GqlValue)> {
    let mut fields = vec![
        ("address", GqlValue::Str(entry.address.clone())),
        ("storageKeys", GqlValue::StrList(entry.storage_keys.clone())),
    ];
    if let Some(id) = tx_doc_id {
        fields.push(("transaction", GqlValue::Str(id.to_string())));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape(r"a\b"), r"a\\b");
        assert_eq!(escape(r#"\""#), r#"\\\""#);
    }

    #[test]
    fn test_value_rendering() {
        let mut builder = MutationBuilder::new();
        builder.create(
            "block0",
            "Block",
            &[
                ("hash", GqlValue::Str("0xabc".to_string())),
                ("number", GqlValue::Int(7)),
                ("status", GqlValue::Bool(true)),
                ("uncles", GqlValue::StrList(vec![])),
                ("topics", GqlValue::StrList(vec!["0x1".to_string(), "0x2".to_string()])),
            ],
        );
        let rendered = builder.build();
        assert_eq!(
            rendered,
            "mutation { block0: create_Block(input: {hash: \"0xabc\", number: 7, \
             status: true, uncles: [], topics: [\"0x1\", \"0x2\"]}) { _docID } }"
        );
    }

    #[test]
    fn test_multiple_aliases_in_one_document() {
        let mut builder = MutationBuilder::new();
        builder.create("tx0", "Transaction", &[("hash", GqlValue::Str("0x1".to_string()))]);
        builder.create("tx1", "Transaction", &[("hash", GqlValue::Str("0x2".to_string()))]);
        let rendered = builder.build();
        assert!(rendered.contains("tx0: create_Transaction"));
        assert!(rendered.contains("tx1: create_Transaction"));
    }

    #[test]
    fn test_update_with_filter() {
        let mut builder = MutationBuilder::new();
        builder.update(
            "tx0",
            "Transaction",
            &[("hash", GqlValue::Str("0xaa".to_string()))],
            &[("block", GqlValue::Str("bae-1".to_string()))],
        );
        assert_eq!(
            builder.build(),
            "mutation { tx0: update_Transaction(filter: {hash: {_eq: \"0xaa\"}}, \
             input: {block: \"bae-1\"}) { _docID } }"
        );
    }

    #[test]
    fn test_log_removed_serialized_as_string() {
        let log = LogDocument { removed: true, ..Default::default() };
        let fields = log_fields(&log, None, None);
        let removed = fields.iter().find(|(name, _)| *name == "removed").unwrap();
        assert_eq!(removed.1, GqlValue::Str("true".to_string()));
    }

    #[test]
    fn test_transaction_block_reference_appended() {
        let tx = TransactionDocument::default();
        let without = transaction_fields(&tx, None);
        assert!(!without.iter().any(|(name, _)| *name == "block"));
        let with = transaction_fields(&tx, Some("bae-9"));
        assert_eq!(with.last().unwrap(), &("block", GqlValue::Str("bae-9".to_string())));
    }
}

//! Test utilities for the store.

use crate::{EmbeddedStore, StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

/// An in-memory document store for testing.
///
/// Understands the mutation dialect the adapter emits: aliased
/// `create_<Collection>` and `update_<Collection>` fields with literal
/// inputs, plus the highest-block-number query. Documents staged on a
/// transaction become visible only on commit. Blocks and transactions are
/// unique by `hash`, logs by `(transactionHash, logIndex)`; violating a
/// uniqueness constraint fails the request with
/// [StoreError::AlreadyExists] naming the existing document. Failures can
/// be scripted to exercise conflict-retry paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

/// A document held by the [MemoryStore].
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// The assigned document ID.
    pub doc_id: String,
    /// The document's fields as parsed from the mutation input.
    pub fields: HashMap<String, Value>,
}

/// A transaction handle for the [MemoryStore].
#[derive(Debug, Default)]
pub struct MemoryTxn {
    staged: Vec<(String, StoredDocument)>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, Vec<StoredDocument>>,
    next_id: u64,
    committed_txns: u64,
    scripted_failures: VecDeque<StoreError>,
    matching_failures: Vec<(String, StoreError)>,
    executed_requests: Vec<String>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a failure for the next executed request. Repeated calls
    /// queue further failures, consumed one per request.
    pub fn fail_next(&self, error: StoreError) {
        self.inner.lock().unwrap().scripted_failures.push_back(error);
    }

    /// Scripts a failure for the next executed request containing the given
    /// fragment. Consumed on first match.
    pub fn fail_matching(&self, fragment: &str, error: StoreError) {
        self.inner
            .lock()
            .unwrap()
            .matching_failures
            .push((fragment.to_string(), error));
    }

    /// Number of committed documents in the collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .collections
            .get(collection)
            .map(Vec::len)
            .unwrap_or_default()
    }

    /// All committed documents in the collection.
    pub fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        self.inner.lock().unwrap().collections.get(collection).cloned().unwrap_or_default()
    }

    /// Looks up a committed document by its ID.
    pub fn document_by_id(&self, collection: &str, doc_id: &str) -> Option<StoredDocument> {
        self.inner
            .lock()
            .unwrap()
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.doc_id == doc_id).cloned())
    }

    /// Number of committed store transactions.
    pub fn committed_transactions(&self) -> u64 {
        self.inner.lock().unwrap().committed_txns
    }

    /// Every request executed so far, in order.
    pub fn executed_requests(&self) -> Vec<String> {
        self.inner.lock().unwrap().executed_requests.clone()
    }
}

#[async_trait]
impl EmbeddedStore for MemoryStore {
    type Txn = MemoryTxn;

    async fn begin(&self) -> StoreResult<MemoryTxn> {
        Ok(MemoryTxn::default())
    }

    async fn execute(&self, txn: &mut MemoryTxn, request: &str) -> StoreResult<Value> {
        let mut inner = self.inner.lock().unwrap();
        inner.executed_requests.push(request.to_string());
        if let Some(failure) = inner.scripted_failures.pop_front() {
            return Err(failure);
        }
        if let Some(at) = inner
            .matching_failures
            .iter()
            .position(|(fragment, _)| request.contains(fragment))
        {
            let (_, failure) = inner.matching_failures.remove(at);
            return Err(failure);
        }

        let parts = parse_mutation(request).map_err(StoreError::QueryFailed)?;
        let mut data = Map::new();
        for part in parts {
            match part {
                MutationPart::Create { alias, collection, fields } => {
                    if let Some(existing) = find_duplicate(&inner, txn, &collection, &fields) {
                        return Err(StoreError::AlreadyExists { doc_id: Some(existing) });
                    }
                    inner.next_id += 1;
                    let doc_id = format!("bae-{:04x}", inner.next_id);
                    txn.staged
                        .push((collection, StoredDocument { doc_id: doc_id.clone(), fields }));
                    data.insert(alias, json!([{ "_docID": doc_id }]));
                }
                MutationPart::Update { alias, collection, filter, fields } => {
                    let updated = apply_update(&mut inner, txn, &collection, &filter, &fields);
                    let ids: Vec<Value> =
                        updated.into_iter().map(|id| json!({ "_docID": id })).collect();
                    data.insert(alias, Value::Array(ids));
                }
            }
        }
        Ok(Value::Object(data))
    }

    async fn commit(&self, txn: MemoryTxn) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for (collection, doc) in txn.staged {
            inner.collections.entry(collection).or_default().push(doc);
        }
        inner.committed_txns += 1;
        Ok(())
    }

    async fn discard(&self, _txn: MemoryTxn) {}

    async fn query(&self, request: &str) -> StoreResult<Value> {
        let inner = self.inner.lock().unwrap();
        if request.contains("order: {number: DESC}") {
            let collection = request
                .split_once('{')
                .map(|(_, rest)| rest.trim_start())
                .and_then(|rest| rest.split_once('('))
                .map(|(name, _)| name.trim())
                .ok_or_else(|| {
                    StoreError::QueryFailed(format!("unsupported query: {request}"))
                })?;
            let highest = inner
                .collections
                .get(collection)
                .into_iter()
                .flatten()
                .filter_map(|doc| doc.fields.get("number"))
                .filter_map(Value::as_i64)
                .max();
            let rows = match highest {
                Some(number) => vec![json!({ "number": number })],
                None => vec![],
            };
            return Ok(json!({ collection: rows }));
        }
        Err(StoreError::QueryFailed(format!("unsupported query: {request}")))
    }
}

fn find_duplicate(
    inner: &Inner,
    txn: &MemoryTxn,
    collection: &str,
    fields: &HashMap<String, Value>,
) -> Option<String> {
    let matches = |doc: &StoredDocument| -> bool {
        if let Some(hash) = fields.get("hash") {
            return doc.fields.get("hash") == Some(hash);
        }
        if let (Some(tx_hash), Some(index)) =
            (fields.get("transactionHash"), fields.get("logIndex"))
        {
            return doc.fields.get("transactionHash") == Some(tx_hash)
                && doc.fields.get("logIndex") == Some(index);
        }
        false
    };
    if !fields.contains_key("hash")
        && !(fields.contains_key("transactionHash") && fields.contains_key("logIndex"))
    {
        return None;
    }
    inner
        .collections
        .get(collection)
        .into_iter()
        .flatten()
        .find(|doc| matches(doc))
        .map(|doc| doc.doc_id.clone())
        .or_else(|| {
            txn.staged
                .iter()
                .filter(|(staged_collection, _)| staged_collection == collection)
                .map(|(_, doc)| doc)
                .find(|doc| matches(doc))
                .map(|doc| doc.doc_id.clone())
        })
}

fn apply_update(
    inner: &mut Inner,
    txn: &mut MemoryTxn,
    collection: &str,
    filter: &HashMap<String, Value>,
    fields: &HashMap<String, Value>,
) -> Vec<String> {
    let matches = |doc: &StoredDocument| {
        filter.iter().all(|(name, value)| doc.fields.get(name) == Some(value))
    };
    let mut updated = Vec::new();
    if let Some(docs) = inner.collections.get_mut(collection) {
        for doc in docs.iter_mut() {
            if matches(doc) {
                doc.fields.extend(fields.clone());
                updated.push(doc.doc_id.clone());
            }
        }
    }
    for (staged_collection, doc) in txn.staged.iter_mut() {
        if staged_collection.as_str() == collection && matches(doc) {
            doc.fields.extend(fields.clone());
            updated.push(doc.doc_id.clone());
        }
    }
    updated
}

enum MutationPart {
    Create {
        alias: String,
        collection: String,
        fields: HashMap<String, Value>,
    },
    Update {
        alias: String,
        collection: String,
        filter: HashMap<String, Value>,
        fields: HashMap<String, Value>,
    },
}

/// Parses the machine-generated mutation dialect the adapter emits.
fn parse_mutation(request: &str) -> Result<Vec<MutationPart>, String> {
    let mut parts = Vec::new();
    let mut cursor = 0;
    loop {
        let create_at = request[cursor..].find(": create_");
        let update_at = request[cursor..].find(": update_");
        let (at, is_create) = match (create_at, update_at) {
            (Some(c), Some(u)) if c < u => (c, true),
            (Some(c), None) => (c, true),
            (_, Some(u)) => (u, false),
            (None, None) => break,
        };
        let at = cursor + at;
        let alias = request[..at]
            .rsplit(|c: char| c.is_whitespace() || c == '{')
            .next()
            .unwrap_or_default()
            .to_string();
        if alias.is_empty() {
            return Err(format!("missing alias near offset {at}"));
        }
        let keyword_len = ": create_".len();
        let rest = &request[at + keyword_len..];
        let paren = rest.find('(').ok_or("missing ( after collection name")?;
        let collection = rest[..paren].to_string();
        let body_start = at + keyword_len + paren;

        if is_create {
            let input_at = request[body_start..]
                .find("input: {")
                .ok_or("missing input object")?;
            let open = body_start + input_at + "input: ".len();
            let (body, end) = extract_braced(request, open)?;
            parts.push(MutationPart::Create {
                alias,
                collection,
                fields: parse_fields(&body)?,
            });
            cursor = end;
        } else {
            let filter_at = request[body_start..]
                .find("filter: {")
                .ok_or("missing filter object")?;
            let open = body_start + filter_at + "filter: ".len();
            let (filter_body, filter_end) = extract_braced(request, open)?;
            let filter = parse_fields(&filter_body)?
                .into_iter()
                .map(|(name, value)| {
                    let value = match value {
                        Value::Object(map) => map.get("_eq").cloned().unwrap_or(Value::Null),
                        other => other,
                    };
                    (name, value)
                })
                .collect();
            let input_at = request[filter_end..]
                .find("input: {")
                .ok_or("missing input object")?;
            let open = filter_end + input_at + "input: ".len();
            let (body, end) = extract_braced(request, open)?;
            parts.push(MutationPart::Update {
                alias,
                collection,
                filter,
                fields: parse_fields(&body)?,
            });
            cursor = end;
        }
    }
    if parts.is_empty() {
        return Err("request contains no mutations".to_string());
    }
    Ok(parts)
}

/// Returns the contents of the brace pair opening at `open` and the offset
/// just past the closing brace. Quote-aware.
fn extract_braced(s: &str, open: usize) -> Result<(String, usize), String> {
    let bytes = s.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return Err(format!("expected {{ at offset {open}"));
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((s[open + 1..i].to_string(), i + 1));
                }
            }
            _ => {}
        }
    }
    Err("unbalanced braces".to_string())
}

/// Parses `name: value` pairs separated by top-level commas.
fn parse_fields(body: &str) -> Result<HashMap<String, Value>, String> {
    let mut fields = HashMap::new();
    for pair in split_top_level(body) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once(':').ok_or_else(|| format!("bad field: {pair}"))?;
        fields.insert(name.trim().to_string(), parse_value(value.trim())?);
    }
    Ok(fields)
}

fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for c in body.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            '{' | '[' => {
                depth += 1;
                current.push(c);
            }
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_value(raw: &str) -> Result<Value, String> {
    if let Some(stripped) = raw.strip_prefix('"') {
        let stripped = stripped.strip_suffix('"').ok_or_else(|| format!("bad string: {raw}"))?;
        return Ok(Value::String(unescape(stripped)));
    }
    if raw == "true" || raw == "false" {
        return Ok(Value::Bool(raw == "true"));
    }
    if let Some(inner) = raw.strip_prefix('[') {
        let inner = inner.strip_suffix(']').ok_or_else(|| format!("bad array: {raw}"))?;
        let items = split_top_level(inner)
            .into_iter()
            .map(|item| parse_value(item.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Array(items));
    }
    if raw.starts_with('{') {
        let (body, _) = extract_braced(raw, 0)?;
        let map = parse_fields(&body)?;
        return Ok(Value::Object(map.into_iter().collect()));
    }
    raw.parse::<i64>().map(Value::from).map_err(|_| format!("bad value: {raw}"))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

//! Helpers for walking GraphQL responses returned by the store.

use serde_json::Value;

/// Extracts the `_docID` for a mutation alias from a response `data` map.
///
/// Store versions differ in how a `create_<Type>` field is shaped: a single
/// object, a one-element list, or a typed list. All three must yield the
/// same `_docID` string. `None` means the aliased sub-mutation failed
/// silently and no document ID is available.
pub fn doc_id_for_alias(data: &Value, alias: &str) -> Option<String> {
    let field = data.get(alias)?;
    match field {
        Value::Object(_) => field.get("_docID")?.as_str().map(str::to_string),
        Value::Array(items) => items
            .first()
            .and_then(|item| item.get("_docID"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Parses the `DocID: <id>` fragment the store embeds in `already exists`
/// error messages.
pub fn parse_doc_id(message: &str) -> Option<String> {
    let start = message.find("DocID: ")? + "DocID: ".len();
    let id: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_id_from_single_object() {
        let data = json!({"block0": {"_docID": "bae-11"}});
        assert_eq!(doc_id_for_alias(&data, "block0"), Some("bae-11".to_string()));
    }

    #[test]
    fn test_doc_id_from_one_element_list() {
        let data = json!({"tx0": [{"_docID": "bae-22"}]});
        assert_eq!(doc_id_for_alias(&data, "tx0"), Some("bae-22".to_string()));
    }

    #[test]
    fn test_doc_id_from_typed_list() {
        let data = json!({"log0": [{"_docID": "bae-33", "__typename": "Log"}]});
        assert_eq!(doc_id_for_alias(&data, "log0"), Some("bae-33".to_string()));
    }

    #[test]
    fn test_missing_alias_is_none() {
        let data = json!({"block0": {"_docID": "bae-11"}});
        assert_eq!(doc_id_for_alias(&data, "tx0"), None);
    }

    #[test]
    fn test_empty_list_is_none() {
        let data = json!({"tx0": []});
        assert_eq!(doc_id_for_alias(&data, "tx0"), None);
    }

    #[test]
    fn test_parse_doc_id() {
        assert_eq!(
            parse_doc_id("already exists (DocID: bae-f00d-12)"),
            Some("bae-f00d-12".to_string())
        );
        assert_eq!(parse_doc_id("already exists"), None);
        assert_eq!(parse_doc_id("DocID: "), None);
    }
}

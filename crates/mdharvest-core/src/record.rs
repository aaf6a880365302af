//! Normalized record shape shared by all fetchers.
//!
//! A record is a JSON object mapping field names to values. Keys are
//! close to Dublin Core but sources may emit richer nested structures:
//! OAC fields are lists of `{attrib, text}` entries, Nuxeo documents
//! carry arbitrary nested properties, MARC records carry leader+fields.

use serde_json::{Map, Value, json};

/// One normalized metadata record. Ownership transfers to the caller
/// when a fetcher yields it.
pub type Record = Map<String, Value>;

/// Build an OAC-style field entry: attribute map + text content.
pub fn attrib_text(attrib: Map<String, Value>, text: &str) -> Value {
    json!({ "attrib": attrib, "text": text })
}

/// Append a value to a field, promoting the field to a list.
pub fn push_field(record: &mut Record, name: &str, value: Value) {
    match record.get_mut(name) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            record.insert(name.to_string(), Value::Array(vec![value]));
        }
    }
}

/// First usable text of a field: a plain string, the first element of a
/// string list, or the `text` member of the first `{attrib, text}` entry.
pub fn first_text<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    match record.get(name)? {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => match items.first()? {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj.get("text").and_then(Value::as_str),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_field_accumulates_list() {
        let mut rec = Record::new();
        push_field(&mut rec, "subject", json!("California"));
        push_field(&mut rec, "subject", json!("History"));
        assert_eq!(rec["subject"], json!(["California", "History"]));
    }

    #[test]
    fn first_text_plain_string() {
        let mut rec = Record::new();
        rec.insert("title".to_string(), json!("A title"));
        assert_eq!(first_text(&rec, "title"), Some("A title"));
    }

    #[test]
    fn first_text_string_list() {
        let mut rec = Record::new();
        rec.insert("identifier".to_string(), json!(["id-1", "id-2"]));
        assert_eq!(first_text(&rec, "identifier"), Some("id-1"));
    }

    #[test]
    fn first_text_attrib_text_entry() {
        let mut rec = Record::new();
        rec.insert(
            "identifier".to_string(),
            json!([{ "attrib": {}, "text": "ark:/13030/kt40000501" }]),
        );
        assert_eq!(first_text(&rec, "identifier"), Some("ark:/13030/kt40000501"));
    }

    #[test]
    fn first_text_missing_field() {
        let rec = Record::new();
        assert_eq!(first_text(&rec, "title"), None);
    }

    #[test]
    fn attrib_text_shape() {
        let mut attrib = Map::new();
        attrib.insert("q".to_string(), json!("created"));
        let v = attrib_text(attrib, "7/21/42");
        assert_eq!(v, json!({"attrib": {"q": "created"}, "text": "7/21/42"}));
    }
}

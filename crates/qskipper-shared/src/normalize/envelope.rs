//! Classification of response envelopes into explicit shapes.
//!
//! The backend wraps the same logical payload in several ways. Each shape is
//! an enum variant here so callers pattern-match instead of chaining trial
//! decodes.

use serde_json::{Map, Value};

use super::coerce;

/// Keys under which a create response may carry the new id.
pub const ID_KEYS: [&str; 5] = ["id", "_id", "productId", "product_id", "orderId"];

/// Keys under which a create response may nest the full record.
pub const RECORD_KEYS: [&str; 2] = ["product", "data"];

/// Keys a message-only response may use.
pub const MESSAGE_KEYS: [&str; 4] = ["message", "error", "msg", "detail"];

/// How many leading bytes are inspected when sniffing for HTML.
const HTML_SNIFF_LEN: usize = 512;

/// Shape of a list endpoint's body.
#[derive(Debug, Clone, PartialEq)]
pub enum ListBody {
    /// `{ "<key>": [...] }`
    Keyed(Vec<Value>),
    /// `[...]`
    Bare(Vec<Value>),
    /// Empty body, `null`, a missing/null array, or a "nothing found" message.
    NoResults(Option<String>),
    /// An HTML error page from a gateway or proxy.
    Html,
    /// Not JSON at all.
    Malformed(String),
}

impl ListBody {
    /// Elements to decode; every non-list shape yields none.
    pub fn into_elements(self) -> Vec<Value> {
        match self {
            ListBody::Keyed(items) | ListBody::Bare(items) => items,
            ListBody::NoResults(_) | ListBody::Html | ListBody::Malformed(_) => Vec::new(),
        }
    }
}

/// Shape of a create endpoint's successful body.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateResult {
    /// The id alone, as a bare string or under a known key.
    Id(String),
    /// A full record, nested or top-level.
    Record(Value),
    /// A success status with a body none of the above could read.
    Unparseable,
}

/// True when the body opens with a doctype or `<html>` tag.
pub fn looks_like_html(body: &[u8]) -> bool {
    let head = &body[..body.len().min(HTML_SNIFF_LEN)];
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start().to_ascii_lowercase();
    trimmed.starts_with("<!doctype") || trimmed.starts_with("<html")
}

/// Best-effort human-readable message from an error or status body.
pub fn extract_message(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Value>(body).ok()? {
        Value::Object(map) => message_from(&map),
        Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

fn message_from(map: &Map<String, Value>) -> Option<String> {
    MESSAGE_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(coerce::optional_string)
}

/// True for messages such as "No orders found" or "no products found".
pub fn is_no_results_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    (lower.contains("no ") && lower.contains("found")) || lower.contains("not found")
}

pub fn classify_list(body: &[u8], key: &str) -> ListBody {
    if body.iter().all(u8::is_ascii_whitespace) {
        return ListBody::NoResults(None);
    }
    if looks_like_html(body) {
        return ListBody::Html;
    }

    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => return ListBody::Malformed(e.to_string()),
    };

    match value {
        Value::Array(items) => ListBody::Bare(items),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => ListBody::Keyed(items),
            // A single record where a list was expected.
            Some(record @ Value::Object(_)) => ListBody::Keyed(vec![record]),
            _ => ListBody::NoResults(message_from(&map)),
        },
        Value::Null => ListBody::NoResults(None),
        Value::String(s) => ListBody::NoResults(Some(s)),
        other => ListBody::Malformed(format!("unexpected list body: {other}")),
    }
}

pub fn classify_create(body: &[u8]) -> CreateResult {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return CreateResult::Unparseable,
    };

    match value {
        Value::String(s) if !s.trim().is_empty() => CreateResult::Id(s.trim().to_string()),
        Value::Number(n) => CreateResult::Id(n.to_string()),
        Value::Object(map) => classify_create_object(map),
        _ => CreateResult::Unparseable,
    }
}

fn classify_create_object(map: Map<String, Value>) -> CreateResult {
    for key in RECORD_KEYS {
        if let Some(Value::Object(record)) = map.get(key) {
            return CreateResult::Record(Value::Object(record.clone()));
        }
    }

    let id = ID_KEYS
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(coerce::optional_string);

    match id {
        // A top-level object carrying the product's own fields is the record.
        Some(_) if looks_like_record(&map) => CreateResult::Record(Value::Object(map)),
        Some(id) => CreateResult::Id(id),
        None => CreateResult::Unparseable,
    }
}

fn looks_like_record(map: &Map<String, Value>) -> bool {
    ["product_name", "name"].iter().any(|k| map.contains_key(*k))
}

//! Conversions between wire fields and stored document values.
//!
//! `info` crosses the wire as JSON text and is stored as a JSON tree; `env`
//! is a string map stored as an object. Partial updates of either become
//! one `$set` entry per top-level key, addressed as `info.k` / `env.k`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use uvapp_store::{Document, Update};

use crate::error::{EngineError, EngineResult};

pub const TITLE: &str = "title";
pub const CTIME: &str = "ctime";
pub const SECRET: &str = "secret";
pub const INFO: &str = "info";
pub const ENV: &str = "env";
pub const STATUS: &str = "status";
pub const VER: &str = "ver";
pub const APPID: &str = "appid";
pub const CID: &str = "cid";

/// Parse wire `info` text. Empty text is absent (`null`); unparsable text
/// is an internal error carrying the parser's message.
pub fn parse_info(text: &str) -> EngineResult<Value> {
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(text)?)
}

/// Parse wire `info` text for a partial update. Only objects can be merged
/// per key.
pub fn parse_info_patch(text: &str) -> EngineResult<Map<String, Value>> {
    match parse_info(text)? {
        Value::Null => Ok(Map::new()),
        Value::Object(fields) => Ok(fields),
        _ => Err(EngineError::InvalidInput(
            "info must be a JSON object".to_string(),
        )),
    }
}

/// Wire text of a stored `info` value; absent or `null` is empty text.
pub fn info_text(doc: &Document) -> EngineResult<String> {
    match doc.get(INFO) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(value) => Ok(serde_json::to_string(value)?),
    }
}

/// Add `{prefix}.{k} = v` for every entry of `fields`.
pub fn merge_entries(update: &mut Update, prefix: &str, fields: &Map<String, Value>) {
    for (key, value) in fields {
        update.set(format!("{prefix}.{key}"), value.clone());
    }
}

/// Wire string of a scalar value: strings as-is, `null` as empty text,
/// anything else as JSON text.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn string_field(doc: &Document, field: &str) -> String {
    doc.get(field).map(text_of).unwrap_or_default()
}

/// Integer value of a field. Floats truncate, numeric strings parse,
/// anything else reads as 0.
pub fn int_field(doc: &Document, field: &str) -> i64 {
    match doc.get(field) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

/// Stored `env` as a string map.
pub fn env_field(doc: &Document) -> BTreeMap<String, String> {
    match doc.get(ENV) {
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(k, v)| (k.clone(), text_of(v)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Stored form of a wire `env` map.
pub fn env_value(env: &BTreeMap<String, String>) -> Map<String, Value> {
    env.iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

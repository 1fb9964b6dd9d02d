//! Mapping between the store and the REST API's record shape.
//!
//! Outbound, hierarchy selections are sent by name with the id alongside
//! (`"country": "India", "country_id": 3`), lists as id arrays and everything
//! else as plain JSON. Inbound, a persisted record carries names for hierarchy
//! levels, which is why edit mode has to reverse-look them up.

use serde_json::{Map, Value};

use crate::forms::models::{FieldValue, ItemId};
use crate::forms::presets::FormDefinition;
use crate::forms::store::FormStore;

/// Builds the create/update request body from the store.
pub fn build_payload(definition: &FormDefinition, store: &FormStore) -> Value {
    let mut body = Map::new();
    for key in definition.field_keys() {
        let Some(value) = store.value(&key) else {
            continue;
        };
        match value {
            FieldValue::Selection(node) => {
                body.insert(format!("{key}_id"), id_to_json(&node.id));
                body.insert(key, Value::String(node.name.clone()));
            }
            FieldValue::List(ids) => {
                body.insert(key, Value::Array(ids.iter().map(id_to_json).collect()));
            }
            FieldValue::Text(text) => {
                body.insert(key, Value::String(text.trim().to_string()));
            }
            FieldValue::Number(n) => {
                body.insert(key, serde_json::json!(n));
            }
            FieldValue::Bool(b) => {
                body.insert(key, Value::Bool(*b));
            }
        }
    }
    Value::Object(body)
}

fn id_to_json(id: &ItemId) -> Value {
    match id {
        ItemId::Int(n) => Value::from(*n),
        ItemId::Text(s) => Value::from(s.as_str()),
    }
}

/// Name stored for a hierarchy level: a plain string or an object with `name`.
pub fn record_name(record: &Map<String, Value>, key: &str) -> Option<String> {
    let name = match record.get(key)? {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("name")?.as_str()?,
        _ => return None,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Ids stored for a list field: scalars or objects with `id`.
pub fn record_ids(record: &Map<String, Value>, key: &str) -> Vec<ItemId> {
    let Some(Value::Array(entries)) = record.get(key) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let id = match entry {
                Value::Object(obj) => obj.get("id")?,
                other => other,
            };
            serde_json::from_value(id.clone()).ok()
        })
        .collect()
}

/// A plain field's persisted value, if it maps onto a store value.
pub fn record_value(record: &Map<String, Value>, key: &str) -> Option<FieldValue> {
    match record.get(key)? {
        Value::Null => None,
        value => serde_json::from_value(value.clone()).ok(),
    }
}

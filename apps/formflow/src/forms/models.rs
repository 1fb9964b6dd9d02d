use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of a form field in the store (e.g. `"title"`, `"country"`).
pub type FieldKey = String;

/// Opaque identifier of a selectable item. The REST API hands out numeric ids
/// for geography and string ids for some catalogs, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Int(id) => write!(f, "{id}"),
            ItemId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        ItemId::Int(id)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        ItemId::Text(id.to_string())
    }
}

/// One child returned by the hierarchical data source.
/// Level-specific fields (ISO codes, phone prefixes, ...) are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Country,
    State,
    City,
}

impl LevelKind {
    pub fn label(&self) -> &'static str {
        match self {
            LevelKind::Country => "country",
            LevelKind::State => "state",
            LevelKind::City => "city",
        }
    }
}

/// One selected item at one level of a hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionNode {
    pub level: usize,
    pub id: ItemId,
    pub name: String,
    pub parent_id: Option<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MajorSkill {
    pub id: ItemId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: ItemId,
    pub name: String,
    #[serde(alias = "majorSkillId")]
    pub major_skill_id: ItemId,
}

/// A field value held by the form store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Selection(SelectionNode),
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<ItemId>),
}

impl FieldValue {
    /// Blank text and empty lists count as "not filled in".
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Selection(_) | FieldValue::Bool(_) | FieldValue::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ItemId]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_selection(&self) -> Option<&SelectionNode> {
        match self {
            FieldValue::Selection(node) => Some(node),
            _ => None,
        }
    }
}

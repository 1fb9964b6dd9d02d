//! Form State Store: the single owner of field values, field errors and the
//! read model (selector options, skill catalog) the host UI renders from.
//!
//! Every write is stamped with its origin and a store-wide sequence number, so
//! two sources racing on the same key resolve as last-write-wins and the
//! initializer can tell which fields the user has already touched.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::forms::models::{FieldKey, FieldValue, Item, ItemId, MajorSkill, SelectionNode, Skill};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    Initializer,
    Cascade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteStamp {
    pub seq: u64,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadStatus {
    Idle,
    Loading,
    Loaded,
    Failed { message: String },
}

/// Options published for one hierarchy level, stamped with the parent they belong to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelOptions {
    pub parent: Option<ItemId>,
    pub items: Vec<Item>,
    pub status: LoadStatus,
}

impl LevelOptions {
    pub fn inactive() -> Self {
        Self {
            parent: None,
            items: Vec::new(),
            status: LoadStatus::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogOptions {
    pub major_skills: Vec<MajorSkill>,
    pub skills: Vec<Skill>,
    pub status: LoadStatus,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            major_skills: Vec::new(),
            skills: Vec::new(),
            status: LoadStatus::Idle,
        }
    }
}

#[derive(Debug, Default)]
pub struct FormStore {
    values: BTreeMap<FieldKey, FieldValue>,
    errors: BTreeMap<FieldKey, String>,
    stamps: HashMap<FieldKey, WriteStamp>,
    touched: BTreeSet<FieldKey>,
    levels: Vec<LevelOptions>,
    catalog: CatalogOptions,
    seq: u64,
}

impl FormStore {
    pub fn new(level_count: usize) -> Self {
        Self {
            levels: vec![LevelOptions::inactive(); level_count],
            ..Self::default()
        }
    }

    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn values(&self) -> &BTreeMap<FieldKey, FieldValue> {
        &self.values
    }

    pub fn selection(&self, key: &str) -> Option<&SelectionNode> {
        self.values.get(key).and_then(FieldValue::as_selection)
    }

    /// Ids held by a list field; empty when the field is unset.
    pub fn list(&self, key: &str) -> &[ItemId] {
        self.values
            .get(key)
            .and_then(FieldValue::as_list)
            .unwrap_or(&[])
    }

    /// Writes a value and returns its sequence number.
    /// A user write marks the field touched and clears its error.
    pub fn write(&mut self, key: &str, value: FieldValue, origin: Origin) -> u64 {
        self.values.insert(key.to_string(), value);
        self.stamp(key, origin)
    }

    /// Removes a value. Clearing is a write as far as sequencing goes.
    pub fn clear(&mut self, key: &str, origin: Origin) -> u64 {
        self.values.remove(key);
        self.stamp(key, origin)
    }

    /// Initializer-side write that yields to anything the user already entered.
    pub fn write_untouched(&mut self, key: &str, value: FieldValue) -> bool {
        if self.is_touched(key) {
            return false;
        }
        self.write(key, value, Origin::Initializer);
        true
    }

    fn stamp(&mut self, key: &str, origin: Origin) -> u64 {
        self.seq += 1;
        self.stamps.insert(
            key.to_string(),
            WriteStamp {
                seq: self.seq,
                origin,
            },
        );
        if origin == Origin::User {
            self.touched.insert(key.to_string());
            self.errors.remove(key);
        }
        self.seq
    }

    pub fn is_touched(&self, key: &str) -> bool {
        self.touched.contains(key)
    }

    pub fn last_write(&self, key: &str) -> Option<WriteStamp> {
        self.stamps.get(key).copied()
    }

    pub fn error(&self, key: &str) -> Option<&str> {
        self.errors.get(key).map(String::as_str)
    }

    pub fn errors(&self) -> &BTreeMap<FieldKey, String> {
        &self.errors
    }

    /// Replaces the errors of `fields` with `found`: fields not in `found` end up error-free.
    pub fn replace_errors<'a>(
        &mut self,
        fields: impl IntoIterator<Item = &'a str>,
        found: &BTreeMap<FieldKey, String>,
    ) {
        for field in fields {
            self.errors.remove(field);
        }
        self.errors
            .extend(found.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn level(&self, level: usize) -> Option<&LevelOptions> {
        self.levels.get(level)
    }

    pub fn level_mut(&mut self, level: usize) -> Option<&mut LevelOptions> {
        self.levels.get_mut(level)
    }

    pub fn levels(&self) -> &[LevelOptions] {
        &self.levels
    }

    pub fn catalog(&self) -> &CatalogOptions {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut CatalogOptions {
        &mut self.catalog
    }

    /// Drops every value, error and option. Used on submit success and cancel.
    pub fn discard(&mut self) {
        let level_count = self.levels.len();
        *self = Self::new(level_count);
    }
}

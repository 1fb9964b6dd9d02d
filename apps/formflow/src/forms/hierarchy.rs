//! Dependency Resetter for hierarchical pickers (country → state → city).
//!
//! Selections live in the store as `FieldValue::Selection`; options live in the
//! store's per-level read model. Selecting at level n clears every level below n
//! synchronously and hands back the load request for level n+1. A load result
//! is committed only if its parent stamp still matches the live selection above.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::forms::loader::LoadResult;
use crate::forms::models::{FieldKey, FieldValue, Item, ItemId, LevelKind, SelectionNode};
use crate::forms::store::{FormStore, LevelOptions, LoadStatus, Origin};

#[derive(Debug, Clone)]
pub struct LevelSpec {
    pub kind: LevelKind,
    pub field: FieldKey,
}

/// A fetch of one level's children, stamped with the parent it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LoadRequest {
    pub level: usize,
    pub kind: LevelKind,
    pub parent: Option<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    Committed { count: usize },
    Failed { message: String },
    Stale,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectError {
    #[error("level {0} does not exist")]
    UnknownLevel(usize),

    #[error("level {0} has no parent selection")]
    LevelInactive(usize),

    #[error("{id} is not an option at level {level}")]
    UnknownItem { level: usize, id: ItemId },
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    levels: Vec<LevelSpec>,
}

impl Hierarchy {
    pub fn new(levels: Vec<LevelSpec>) -> Self {
        Self { levels }
    }

    /// Country → state → city, stored under `country`, `state` and `city`.
    pub fn location() -> Self {
        Self::new(vec![
            LevelSpec {
                kind: LevelKind::Country,
                field: "country".into(),
            },
            LevelSpec {
                kind: LevelKind::State,
                field: "state".into(),
            },
            LevelSpec {
                kind: LevelKind::City,
                field: "city".into(),
            },
        ])
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[LevelSpec] {
        &self.levels
    }

    pub fn field(&self, level: usize) -> Option<&str> {
        self.levels.get(level).map(|l| l.field.as_str())
    }

    pub fn contains_field(&self, key: &str) -> bool {
        self.levels.iter().any(|l| l.field == key)
    }

    /// The parent a level's options must belong to right now.
    /// `None` means the level is inactive (nothing selected above it).
    pub fn live_parent(&self, store: &FormStore, level: usize) -> Option<Option<ItemId>> {
        if level == 0 {
            return Some(None);
        }
        let above = self.field(level - 1)?;
        store.selection(above).map(|node| Some(node.id.clone()))
    }

    /// Marks `level` as loading for its live parent and returns the request to run.
    pub fn request(&self, store: &mut FormStore, level: usize) -> Result<LoadRequest, SelectError> {
        let spec = self
            .levels
            .get(level)
            .ok_or(SelectError::UnknownLevel(level))?;
        let parent = self
            .live_parent(store, level)
            .ok_or(SelectError::LevelInactive(level))?;
        if let Some(options) = store.level_mut(level) {
            options.parent = parent.clone();
            options.status = LoadStatus::Loading;
        }
        Ok(LoadRequest {
            level,
            kind: spec.kind,
            parent,
        })
    }

    /// Root options are requested once; `None` if they are loading or loaded already.
    pub fn root_request(&self, store: &mut FormStore) -> Option<LoadRequest> {
        match store.level(0).map(|o| &o.status) {
            Some(LoadStatus::Idle) | Some(LoadStatus::Failed { .. }) => self.request(store, 0).ok(),
            _ => None,
        }
    }

    /// Records a selection, clears everything below it and returns the load for the next level.
    /// Re-selecting the current item is a no-op and returns `None`.
    pub fn select_at(
        &self,
        store: &mut FormStore,
        level: usize,
        id: &ItemId,
        origin: Origin,
    ) -> Result<Option<LoadRequest>, SelectError> {
        let field = self.field(level).ok_or(SelectError::UnknownLevel(level))?;
        let parent = self
            .live_parent(store, level)
            .ok_or(SelectError::LevelInactive(level))?;

        if store
            .selection(field)
            .is_some_and(|node| &node.id == id && node.parent_id == parent)
        {
            debug!("Level {level} already holds {id}, nothing to reset");
            return Ok(None);
        }

        let item = store
            .level(level)
            .filter(|options| options.parent == parent)
            .and_then(|options| options.items.iter().find(|item| &item.id == id))
            .cloned()
            .ok_or_else(|| SelectError::UnknownItem {
                level,
                id: id.clone(),
            })?;

        let node = SelectionNode {
            level,
            id: item.id,
            name: item.name,
            parent_id: parent,
        };
        store.write(field, FieldValue::Selection(node), origin);
        self.reset_below(store, level);

        if level + 1 < self.depth() {
            return self.request(store, level + 1).map(Some);
        }
        Ok(None)
    }

    /// Unselects `level` and everything below it.
    pub fn deselect(
        &self,
        store: &mut FormStore,
        level: usize,
        origin: Origin,
    ) -> Result<(), SelectError> {
        let field = self.field(level).ok_or(SelectError::UnknownLevel(level))?;
        store.clear(field, origin);
        self.reset_below(store, level);
        Ok(())
    }

    fn reset_below(&self, store: &mut FormStore, level: usize) {
        for below in level + 1..self.depth() {
            let field = &self.levels[below].field;
            if store.value(field).is_some() {
                debug!("Cascade reset of {field}");
            }
            store.clear(field, Origin::Cascade);
            if let Some(options) = store.level_mut(below) {
                *options = LevelOptions::inactive();
            }
        }
    }

    /// Publishes a load result if its parent stamp still matches the live parent.
    pub fn apply(&self, store: &mut FormStore, request: &LoadRequest, result: LoadResult) -> LoadOutcome {
        if self.live_parent(store, request.level).as_ref() != Some(&request.parent) {
            debug!(
                "Discarding stale {} options for parent {:?}",
                request.kind.label(),
                request.parent
            );
            return LoadOutcome::Stale;
        }
        let Some(options) = store.level_mut(request.level) else {
            return LoadOutcome::Stale;
        };
        options.parent = request.parent.clone();
        match result {
            Ok(items) => {
                let count = items.len();
                options.items = items;
                options.status = LoadStatus::Loaded;
                self.drop_vanished_selection(store, request.level);
                LoadOutcome::Committed { count }
            }
            Err(err) => {
                let message = err.to_string();
                options.items = Vec::new();
                options.status = LoadStatus::Failed {
                    message: message.clone(),
                };
                LoadOutcome::Failed { message }
            }
        }
    }

    /// A reload may no longer offer the selected item; it goes, along with everything below it.
    fn drop_vanished_selection(&self, store: &mut FormStore, level: usize) {
        let Some(field) = self.field(level) else {
            return;
        };
        let vanished = match (store.selection(field), store.level(level)) {
            (Some(node), Some(options)) => !options.items.iter().any(|item| item.id == node.id),
            _ => false,
        };
        if vanished {
            debug!("Selected {field} is no longer offered, clearing it");
            store.clear(field, Origin::Cascade);
            self.reset_below(store, level);
        }
    }

    /// Case-insensitive exact name match among the options currently published for `level`.
    pub fn find_by_name<'a>(&self, store: &'a FormStore, level: usize, name: &str) -> Option<&'a Item> {
        let wanted = name.trim();
        store
            .level(level)?
            .items
            .iter()
            .find(|item| item.name.trim().eq_ignore_ascii_case(wanted))
    }

    /// Every selection below the root points at the selection directly above it.
    pub fn is_consistent(&self, store: &FormStore) -> bool {
        (1..self.depth()).all(|level| {
            let Some(node) = store.selection(&self.levels[level].field) else {
                return true;
            };
            store
                .selection(&self.levels[level - 1].field)
                .is_some_and(|above| node.parent_id.as_ref() == Some(&above.id))
        })
    }
}

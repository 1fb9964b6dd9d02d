//! Collaborator seams consumed by the form engine.
//!
//! `ApiClient` is the production implementation of all three; tests use the
//! scripted `fakes::FakeSource`. Carried in `AppState` as `Sources`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::api_client::ApiError;
use crate::forms::models::{Item, ItemId, LevelKind, MajorSkill, Skill};
use crate::forms::presets::FormKind;
use crate::forms::session::FormMode;

/// Parent-to-children lookup for dependent pickers. Must be side-effect free.
#[async_trait]
pub trait HierarchySource: Send + Sync {
    async fn fetch_children(
        &self,
        kind: LevelKind,
        parent: Option<&ItemId>,
    ) -> Result<Vec<Item>, ApiError>;
}

/// Flat skill catalog; skills are filtered client-side by `major_skill_id`.
#[async_trait]
pub trait SkillCatalog: Send + Sync {
    async fn fetch_major_skills(&self) -> Result<Vec<MajorSkill>, ApiError>;
    async fn fetch_skills(&self) -> Result<Vec<Skill>, ApiError>;
}

/// Persisted records: loaded for edit mode, written on submit.
#[async_trait]
pub trait RecordGateway: Send + Sync {
    async fn fetch(&self, kind: FormKind, id: &str) -> Result<Map<String, Value>, ApiError>;
    async fn save(&self, kind: FormKind, mode: &FormMode, payload: &Value)
        -> Result<Value, ApiError>;
}

#[derive(Clone)]
pub struct Sources {
    pub hierarchy: Arc<dyn HierarchySource>,
    pub catalog: Arc<dyn SkillCatalog>,
    pub records: Arc<dyn RecordGateway>,
}

impl Sources {
    /// One value serving every seam, which is what `ApiClient` is.
    pub fn from_shared<T>(shared: Arc<T>) -> Self
    where
        T: HierarchySource + SkillCatalog + RecordGateway + 'static,
    {
        Self {
            hierarchy: shared.clone(),
            catalog: shared.clone(),
            records: shared,
        }
    }
}

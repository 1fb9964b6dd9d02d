//! Form sessions: one wizard, one store, one hierarchy and skill set.
//!
//! `FormSession` is the synchronous state machine; every mutation is atomic.
//! `Session` drives it: it takes the lock, performs the transition, releases the
//! lock for the network fetch, and re-takes it to apply the result. A fetch that
//! resolves after its parent changed is discarded by the stamp check in
//! `Hierarchy::apply`, so no explicit cancellation is needed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::forms::hierarchy::{Hierarchy, LoadOutcome, LoadRequest, SelectError};
use crate::forms::loader::{LoadError, LoadResult, SelectorLoader};
use crate::forms::models::{FieldKey, FieldValue, Item, ItemId, MajorSkill, Skill};
use crate::forms::payload::build_payload;
use crate::forms::presets::{FormDefinition, FormKind};
use crate::forms::skills::{SkillError, SkillSet};
use crate::forms::sources::{SkillCatalog, Sources};
use crate::forms::store::{FormStore, LevelOptions, LoadStatus, Origin};
use crate::forms::wizard::{Phase, Wizard, WizardError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FormMode {
    Create,
    Edit { record_id: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("form has no hierarchical selector")]
    NoHierarchy,

    #[error("form has no skill selector")]
    NoSkills,

    #[error("unknown field '{0}'")]
    UnknownField(FieldKey),

    #[error("field '{0}' is set through its selector")]
    SelectorField(FieldKey),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Skill(#[from] SkillError),

    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error("skill catalog refresh failed: {0}")]
    CatalogRefresh(LoadError),

    #[error("submission rejected: {0}")]
    Submit(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub index: usize,
    pub label: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelView {
    pub field: FieldKey,
    pub items: Vec<Item>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkillsView {
    pub major_skills: Vec<MajorSkill>,
    pub selectable: Vec<Skill>,
    pub selected_major_skills: Vec<ItemId>,
    pub selected_skills: Vec<ItemId>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Snapshot of everything the host UI renders.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub kind: FormKind,
    #[serde(flatten)]
    pub mode: FormMode,
    pub phase: Phase,
    pub current_step: usize,
    pub completed_steps: Vec<usize>,
    pub steps: Vec<StepView>,
    pub values: BTreeMap<FieldKey, FieldValue>,
    pub errors: BTreeMap<FieldKey, String>,
    pub levels: Vec<LevelView>,
    pub skills: Option<SkillsView>,
    pub submit_error: Option<String>,
}

pub struct FormSession {
    definition: FormDefinition,
    mode: FormMode,
    store: FormStore,
    wizard: Wizard,
    submit_error: Option<String>,
}

impl FormSession {
    pub fn new(definition: FormDefinition, mode: FormMode) -> Self {
        let depth = definition.hierarchy.as_ref().map_or(0, Hierarchy::depth);
        Self {
            wizard: Wizard::new(definition.steps.clone()),
            store: FormStore::new(depth),
            definition,
            mode,
            submit_error: None,
        }
    }

    pub fn kind(&self) -> FormKind {
        self.definition.kind
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub fn store(&self) -> &FormStore {
        &self.store
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn hierarchy(&self) -> Option<&Hierarchy> {
        self.definition.hierarchy.as_ref()
    }

    pub fn skill_set(&self) -> Option<&SkillSet> {
        self.definition.skills.as_ref()
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.definition
    }

    pub fn current_step(&self) -> usize {
        self.wizard.current()
    }

    pub fn completed_steps(&self) -> Vec<usize> {
        self.wizard.completed().iter().copied().collect()
    }

    pub fn errors_for(&self, key: &str) -> Option<&str> {
        self.store.error(key)
    }

    pub fn items_for(&self, level: usize) -> &[Item] {
        self.store
            .level(level)
            .map(|o| o.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_loading(&self, level: usize) -> bool {
        self.store
            .level(level)
            .is_some_and(|o| o.status == LoadStatus::Loading)
    }

    pub fn load_error(&self, level: usize) -> Option<&str> {
        match self.store.level(level).map(|o| &o.status) {
            Some(LoadStatus::Failed { message }) => Some(message),
            _ => None,
        }
    }

    pub fn edit_field(&mut self, key: &str, value: FieldValue) -> Result<(), SessionError> {
        self.wizard.ensure_editing()?;
        if self.definition.is_selector_field(key) {
            return Err(SessionError::SelectorField(key.to_string()));
        }
        if !self.definition.field_keys().contains(key) {
            return Err(SessionError::UnknownField(key.to_string()));
        }
        self.store.write(key, value, Origin::User);
        Ok(())
    }

    pub fn clear_field(&mut self, key: &str) -> Result<(), SessionError> {
        self.wizard.ensure_editing()?;
        if self.definition.is_selector_field(key) {
            return Err(SessionError::SelectorField(key.to_string()));
        }
        if !self.definition.field_keys().contains(key) {
            return Err(SessionError::UnknownField(key.to_string()));
        }
        self.store.clear(key, Origin::User);
        Ok(())
    }

    pub fn select_at(
        &mut self,
        level: usize,
        id: &ItemId,
        origin: Origin,
    ) -> Result<Option<LoadRequest>, SessionError> {
        self.wizard.ensure_editing()?;
        let hierarchy = self.definition.hierarchy.as_ref().ok_or(SessionError::NoHierarchy)?;
        Ok(hierarchy.select_at(&mut self.store, level, id, origin)?)
    }

    pub fn deselect_at(&mut self, level: usize) -> Result<(), SessionError> {
        self.wizard.ensure_editing()?;
        let hierarchy = self.definition.hierarchy.as_ref().ok_or(SessionError::NoHierarchy)?;
        Ok(hierarchy.deselect(&mut self.store, level, Origin::User)?)
    }

    /// Re-issues the load for a level, e.g. after a failure.
    pub fn reload(&mut self, level: usize) -> Result<LoadRequest, SessionError> {
        let hierarchy = self.definition.hierarchy.as_ref().ok_or(SessionError::NoHierarchy)?;
        Ok(hierarchy.request(&mut self.store, level)?)
    }

    pub fn root_request(&mut self) -> Option<LoadRequest> {
        let hierarchy = self.definition.hierarchy.as_ref()?;
        hierarchy.root_request(&mut self.store)
    }

    pub fn apply_load(&mut self, request: &LoadRequest, result: LoadResult) -> LoadOutcome {
        match self.definition.hierarchy.as_ref() {
            Some(hierarchy) => hierarchy.apply(&mut self.store, request, result),
            None => LoadOutcome::Stale,
        }
    }

    /// Returns the skills pruned because the catalog stopped offering them.
    pub fn apply_catalog(
        &mut self,
        result: Result<(Vec<MajorSkill>, Vec<Skill>), LoadError>,
    ) -> Result<Vec<ItemId>, LoadError> {
        match &self.definition.skills {
            Some(skills) => skills.apply_catalog(&mut self.store, result),
            None => Ok(Vec::new()),
        }
    }

    pub fn needs_catalog(&self) -> bool {
        self.definition.skills.is_some()
            && matches!(
                self.store.catalog().status,
                LoadStatus::Idle | LoadStatus::Failed { .. }
            )
    }

    pub fn set_major_skills(&mut self, ids: &[ItemId]) -> Result<Vec<ItemId>, SessionError> {
        self.wizard.ensure_editing()?;
        let skills = self.definition.skills.as_ref().ok_or(SessionError::NoSkills)?;
        Ok(skills.set_major_skills(&mut self.store, ids, Origin::User)?)
    }

    pub fn toggle_major_skill(&mut self, id: &ItemId, selected: bool) -> Result<Vec<ItemId>, SessionError> {
        self.wizard.ensure_editing()?;
        let skills = self.definition.skills.as_ref().ok_or(SessionError::NoSkills)?;
        Ok(skills.toggle_major(&mut self.store, id, selected, Origin::User)?)
    }

    pub fn set_skills(&mut self, ids: &[ItemId]) -> Result<(), SessionError> {
        self.wizard.ensure_editing()?;
        let skills = self.definition.skills.as_ref().ok_or(SessionError::NoSkills)?;
        Ok(skills.set_skills(&mut self.store, ids, Origin::User)?)
    }

    pub fn toggle_skill(&mut self, id: &ItemId, selected: bool) -> Result<(), SessionError> {
        self.wizard.ensure_editing()?;
        let skills = self.definition.skills.as_ref().ok_or(SessionError::NoSkills)?;
        Ok(skills.toggle_skill(&mut self.store, id, selected, Origin::User)?)
    }

    pub fn select_all_skills(&mut self, filter: Option<&str>) -> Result<usize, SessionError> {
        self.wizard.ensure_editing()?;
        let skills = self.definition.skills.as_ref().ok_or(SessionError::NoSkills)?;
        Ok(skills.select_all(&mut self.store, filter, Origin::User)?)
    }

    pub fn clear_skills(&mut self, filter: Option<&str>) -> Result<usize, SessionError> {
        self.wizard.ensure_editing()?;
        let skills = self.definition.skills.as_ref().ok_or(SessionError::NoSkills)?;
        Ok(skills.clear_visible(&mut self.store, filter, Origin::User))
    }

    pub fn next(&mut self) -> Result<usize, SessionError> {
        Ok(self.wizard.next(&mut self.store)?)
    }

    pub fn previous(&mut self) -> Result<usize, SessionError> {
        Ok(self.wizard.previous()?)
    }

    pub fn jump_to(&mut self, target: usize) -> Result<usize, SessionError> {
        Ok(self.wizard.jump_to(&mut self.store, target)?)
    }

    /// Validates every step and, if all pass, freezes the form and returns the request body.
    pub fn begin_submit(&mut self) -> Result<Value, SessionError> {
        self.wizard.begin_submit(&mut self.store)?;
        self.submit_error = None;
        Ok(build_payload(&self.definition, &self.store))
    }

    pub fn complete_submit(&mut self) {
        self.wizard.complete_submit();
        self.store.discard();
    }

    pub fn fail_submit(&mut self, message: String) {
        self.wizard.fail_submit();
        self.submit_error = Some(message);
    }

    pub(crate) fn store_mut(&mut self) -> &mut FormStore {
        &mut self.store
    }

    pub fn view(&self) -> SessionView {
        let steps = self
            .wizard
            .steps()
            .iter()
            .map(|step| StepView {
                index: step.index,
                label: step.label.clone(),
                completed: self.wizard.completed().contains(&step.index),
            })
            .collect();

        let levels = self
            .definition
            .hierarchy
            .iter()
            .flat_map(|h| h.levels().iter().enumerate())
            .map(|(level, spec)| {
                let options = self.store.level(level).cloned().unwrap_or_else(LevelOptions::inactive);
                LevelView {
                    field: spec.field.clone(),
                    loading: options.status == LoadStatus::Loading,
                    error: match options.status {
                        LoadStatus::Failed { message } => Some(message),
                        _ => None,
                    },
                    items: options.items,
                }
            })
            .collect();

        let skills = self.definition.skills.as_ref().map(|set| {
            let catalog = self.store.catalog();
            SkillsView {
                major_skills: catalog.major_skills.clone(),
                selectable: set.selectable(&self.store).into_iter().cloned().collect(),
                selected_major_skills: set.selected_majors(&self.store).to_vec(),
                selected_skills: set.selected_skills(&self.store).to_vec(),
                loading: catalog.status == LoadStatus::Loading,
                error: match &catalog.status {
                    LoadStatus::Failed { message } => Some(message.clone()),
                    _ => None,
                },
            }
        });

        SessionView {
            kind: self.definition.kind,
            mode: self.mode.clone(),
            phase: self.wizard.phase(),
            current_step: self.wizard.current(),
            completed_steps: self.completed_steps(),
            steps,
            values: self.store.values().clone(),
            errors: self.store.errors().clone(),
            levels,
            skills,
            submit_error: self.submit_error.clone(),
        }
    }
}

/// Async driver around one `FormSession`.
pub struct Session {
    pub id: Uuid,
    form: Mutex<FormSession>,
    loader: SelectorLoader,
    sources: Sources,
}

impl Session {
    pub fn new(id: Uuid, form: FormSession, sources: Sources) -> Self {
        Self {
            id,
            form: Mutex::new(form),
            loader: SelectorLoader::new(sources.hierarchy.clone()),
            sources,
        }
    }

    pub(crate) async fn form(&self) -> MutexGuard<'_, FormSession> {
        self.form.lock().await
    }

    /// Loads the root level and the skill catalog.
    pub async fn open(&self) {
        let (root, wants_catalog) = {
            let mut form = self.form.lock().await;
            let wants_catalog = form.needs_catalog();
            if wants_catalog {
                form.store_mut().catalog_mut().status = LoadStatus::Loading;
            }
            (form.root_request(), wants_catalog)
        };

        let root_load = async {
            if let Some(request) = root {
                self.run_load(&request).await;
            }
        };
        let catalog_load = async {
            if wants_catalog {
                let result = fetch_catalog(self.sources.catalog.as_ref()).await;
                // A failed first load is kept in the read model.
                let _ = self.form.lock().await.apply_catalog(result);
            }
        };
        tokio::join!(root_load, catalog_load);
    }

    /// Runs one load outside the lock and applies it under the lock.
    pub(crate) async fn run_load(&self, request: &LoadRequest) -> LoadOutcome {
        let result = self.loader.load(request).await;
        let outcome = self.form.lock().await.apply_load(request, result);
        match &outcome {
            LoadOutcome::Stale => debug!("Session {}: stale {} result dropped", self.id, request.kind.label()),
            LoadOutcome::Failed { message } => {
                warn!("Session {}: {} options failed: {message}", self.id, request.kind.label())
            }
            LoadOutcome::Committed { .. } => {}
        }
        outcome
    }

    pub async fn view(&self) -> SessionView {
        self.form.lock().await.view()
    }

    pub async fn edit_field(&self, key: &str, value: FieldValue) -> Result<(), SessionError> {
        self.form.lock().await.edit_field(key, value)
    }

    pub async fn clear_field(&self, key: &str) -> Result<(), SessionError> {
        self.form.lock().await.clear_field(key)
    }

    /// Selects at `level`; resolves once the next level's options are applied (or dropped as stale).
    pub async fn select_at(&self, level: usize, id: &ItemId) -> Result<Option<LoadOutcome>, SessionError> {
        let request = self.form.lock().await.select_at(level, id, Origin::User)?;
        match request {
            Some(request) => Ok(Some(self.run_load(&request).await)),
            None => Ok(None),
        }
    }

    pub async fn deselect_at(&self, level: usize) -> Result<(), SessionError> {
        self.form.lock().await.deselect_at(level)
    }

    pub async fn reload(&self, level: usize) -> Result<LoadOutcome, SessionError> {
        let request = self.form.lock().await.reload(level)?;
        Ok(self.run_load(&request).await)
    }

    /// Refetches the skill catalog. Returns the selected skills it no longer offers,
    /// which are pruned along with their major skills.
    pub async fn reload_catalog(&self) -> Result<Vec<ItemId>, SessionError> {
        if self.form.lock().await.skill_set().is_none() {
            return Err(SessionError::NoSkills);
        }
        let result = fetch_catalog(self.sources.catalog.as_ref()).await;
        let pruned = self
            .form
            .lock()
            .await
            .apply_catalog(result)
            .map_err(SessionError::CatalogRefresh)?;
        if !pruned.is_empty() {
            info!("Session {}: catalog refresh pruned {} skill(s)", self.id, pruned.len());
        }
        Ok(pruned)
    }

    pub async fn set_major_skills(&self, ids: &[ItemId]) -> Result<Vec<ItemId>, SessionError> {
        self.form.lock().await.set_major_skills(ids)
    }

    pub async fn toggle_major_skill(&self, id: &ItemId, selected: bool) -> Result<Vec<ItemId>, SessionError> {
        self.form.lock().await.toggle_major_skill(id, selected)
    }

    pub async fn set_skills(&self, ids: &[ItemId]) -> Result<(), SessionError> {
        self.form.lock().await.set_skills(ids)
    }

    pub async fn toggle_skill(&self, id: &ItemId, selected: bool) -> Result<(), SessionError> {
        self.form.lock().await.toggle_skill(id, selected)
    }

    pub async fn select_all_skills(&self, filter: Option<&str>) -> Result<usize, SessionError> {
        self.form.lock().await.select_all_skills(filter)
    }

    pub async fn clear_skills(&self, filter: Option<&str>) -> Result<usize, SessionError> {
        self.form.lock().await.clear_skills(filter)
    }

    pub async fn next(&self) -> Result<usize, SessionError> {
        self.form.lock().await.next()
    }

    pub async fn previous(&self) -> Result<usize, SessionError> {
        self.form.lock().await.previous()
    }

    pub async fn jump_to(&self, target: usize) -> Result<usize, SessionError> {
        self.form.lock().await.jump_to(target)
    }

    /// Validates everything, hands the payload to the record gateway and records the outcome.
    /// On rejection the form is left exactly as it was, on its current step.
    pub async fn submit(&self) -> Result<Value, SessionError> {
        let (kind, mode, payload) = {
            let mut form = self.form.lock().await;
            let payload = form.begin_submit()?;
            (form.kind(), form.mode().clone(), payload)
        };

        match self.sources.records.save(kind, &mode, &payload).await {
            Ok(saved) => {
                info!("Session {}: {} saved", self.id, kind.resource());
                self.form.lock().await.complete_submit();
                Ok(saved)
            }
            Err(err) => {
                let message = err.to_string();
                warn!("Session {}: submit rejected: {message}", self.id);
                self.form.lock().await.fail_submit(message.clone());
                Err(SessionError::Submit(message))
            }
        }
    }
}

pub async fn fetch_catalog(catalog: &dyn SkillCatalog) -> Result<(Vec<MajorSkill>, Vec<Skill>), LoadError> {
    let (majors, skills) = tokio::join!(catalog.fetch_major_skills(), catalog.fetch_skills());
    let result = majors.and_then(|m| skills.map(|s| (m, s))).map_err(LoadError::from);
    if let Err(err) = &result {
        warn!("Skill catalog load failed: {err}");
    }
    result
}

/// In-memory registry of open sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionRegistry {
    pub async fn insert(&self, session: Arc<Session>) {
        self.sessions.write().await.insert(session.id, session);
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::models::LevelKind;
    use crate::forms::presets::{job_posting, organization};
    use crate::forms::sources::fakes::FakeSource;

    async fn open(def: FormDefinition, source: &Arc<FakeSource>) -> Session {
        let session = Session::new(
            Uuid::new_v4(),
            FormSession::new(def, FormMode::Create),
            source.sources(),
        );
        session.open().await;
        session
    }

    async fn select_us_california_sf(session: &Session) {
        session.select_at(0, &ItemId::Int(1)).await.unwrap();
        session.select_at(1, &ItemId::Int(10)).await.unwrap();
        session.select_at(2, &ItemId::Int(100)).await.unwrap();
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_open_loads_root_and_catalog() {
        let source = Arc::new(FakeSource::geography());
        let session = open(job_posting(), &source).await;
        let form = session.form().await;
        assert_eq!(form.items_for(0).len(), 3);
        assert_eq!(form.store().catalog().status, LoadStatus::Loaded);
        assert!(!form.is_loading(0));
    }

    #[tokio::test]
    async fn test_country_change_clears_city_and_reloads_states() {
        let source = Arc::new(FakeSource::geography());
        let session = open(organization(), &source).await;
        select_us_california_sf(&session).await;

        session.select_at(0, &ItemId::Int(2)).await.unwrap();

        let form = session.form().await;
        assert!(form.store().selection("state").is_none());
        assert!(form.store().selection("city").is_none());
        assert_eq!(names(form.items_for(1)), vec!["Ontario", "British Columbia", "Quebec"]);
        assert!(form.items_for(2).is_empty());
    }

    #[tokio::test]
    async fn test_select_same_id_twice_loads_once() {
        let source = Arc::new(FakeSource::geography());
        let session = open(organization(), &source).await;
        session.select_at(0, &ItemId::Int(3)).await.unwrap();
        let outcome = session.select_at(0, &ItemId::Int(3)).await.unwrap();

        assert_eq!(outcome, None);
        let state_loads = source
            .calls()
            .into_iter()
            .filter(|(kind, _)| *kind == LevelKind::State)
            .count();
        assert_eq!(state_loads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_for_previous_parent_is_dropped() {
        let source = Arc::new(FakeSource::geography());
        source.delay(LevelKind::State, Some(ItemId::Int(1)), 200);
        source.delay(LevelKind::State, Some(ItemId::Int(2)), 10);
        let session = open(organization(), &source).await;

        let (us, ca) = tokio::join!(
            session.select_at(0, &ItemId::Int(1)),
            async {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                session.select_at(0, &ItemId::Int(2)).await
            }
        );

        assert_eq!(us.unwrap(), Some(LoadOutcome::Stale));
        assert_eq!(ca.unwrap(), Some(LoadOutcome::Committed { count: 3 }));
        let form = session.form().await;
        assert_eq!(form.store().selection("country").unwrap().name, "Canada");
        assert_eq!(form.items_for(1)[0].name, "Ontario");
    }

    #[tokio::test]
    async fn test_load_failure_degrades_to_empty_and_retry_works() {
        let source = Arc::new(FakeSource::geography());
        source.fail(LevelKind::City, Some(ItemId::Int(10)));
        let session = open(organization(), &source).await;
        session.edit_field("name", FieldValue::Text("Acme".into())).await.unwrap();
        session.select_at(0, &ItemId::Int(1)).await.unwrap();

        let outcome = session.select_at(1, &ItemId::Int(10)).await.unwrap();
        assert!(matches!(outcome, Some(LoadOutcome::Failed { .. })));
        {
            let form = session.form().await;
            assert!(form.items_for(2).is_empty());
            assert!(!form.is_loading(2));
            assert!(form.load_error(2).is_some());
            assert_eq!(form.store().value("name"), Some(&FieldValue::Text("Acme".into())));
            assert_eq!(form.store().selection("state").unwrap().name, "California");
        }

        source.heal(LevelKind::City, Some(ItemId::Int(10)));
        assert_eq!(session.reload(2).await.unwrap(), LoadOutcome::Committed { count: 2 });
        assert!(session.form().await.load_error(2).is_none());
    }

    #[tokio::test]
    async fn test_catalog_failure_is_local() {
        let source = Arc::new(FakeSource::geography());
        source.fail_catalog();
        let session = open(job_posting(), &source).await;
        let view = session.view().await;
        let skills = view.skills.unwrap();
        assert!(skills.error.is_some());
        assert!(skills.major_skills.is_empty());
        assert_eq!(view.levels[0].items.len(), 3);
        assert_eq!(
            session.set_major_skills(&[ItemId::from("fe")]).await,
            Err(SessionError::Skill(SkillError::CatalogUnavailable))
        );
    }

    #[tokio::test]
    async fn test_major_skill_deselect_prunes_skills() {
        let source = Arc::new(FakeSource::geography());
        let session = open(job_posting(), &source).await;
        session.set_major_skills(&[ItemId::from("fe"), ItemId::from("be")]).await.unwrap();
        session.set_skills(&[ItemId::from("react"), ItemId::from("node")]).await.unwrap();

        session.toggle_major_skill(&ItemId::from("fe"), false).await.unwrap();

        let view = session.view().await;
        let skills = view.skills.unwrap();
        assert_eq!(skills.selected_skills, vec![ItemId::from("node")]);
        assert_eq!(names_of(&skills.selectable), vec!["Node", "Django"]);
    }

    #[tokio::test]
    async fn test_toggle_skill_within_selected_majors() {
        let source = Arc::new(FakeSource::geography());
        let session = open(job_posting(), &source).await;
        session.set_major_skills(&[ItemId::from("fe")]).await.unwrap();

        session.toggle_skill(&ItemId::from("vue"), true).await.unwrap();
        session.toggle_skill(&ItemId::from("react"), true).await.unwrap();
        session.toggle_skill(&ItemId::from("vue"), false).await.unwrap();

        let skills = session.view().await.skills.unwrap();
        assert_eq!(skills.selected_skills, vec![ItemId::from("react")]);
        assert_eq!(
            session.toggle_skill(&ItemId::from("spark"), true).await,
            Err(SessionError::Skill(SkillError::NotSelectable(ItemId::from("spark"))))
        );
    }

    #[tokio::test]
    async fn test_failed_catalog_reload_keeps_selections_consistent() {
        let source = Arc::new(FakeSource::geography());
        let session = open(job_posting(), &source).await;
        session.set_major_skills(&[ItemId::from("be")]).await.unwrap();
        session.set_skills(&[ItemId::from("node")]).await.unwrap();

        source.fail_catalog();
        let err = session.reload_catalog().await.unwrap_err();

        assert!(matches!(err, SessionError::CatalogRefresh(_)));
        let form = session.form().await;
        let set = form.skill_set().unwrap();
        assert_eq!(set.selected_skills(form.store()), &[ItemId::from("node")]);
        assert_eq!(set.selectable(form.store()).len(), 2);
        assert!(set.is_consistent(form.store()));
    }

    #[tokio::test]
    async fn test_catalog_reload_prunes_retired_skill() {
        let source = Arc::new(FakeSource::geography());
        let session = open(job_posting(), &source).await;
        session.set_major_skills(&[ItemId::from("be")]).await.unwrap();
        session.set_skills(&[ItemId::from("node"), ItemId::from("django")]).await.unwrap();

        source.retire_skill(&ItemId::from("node"));
        let pruned = session.reload_catalog().await.unwrap();

        assert_eq!(pruned, vec![ItemId::from("node")]);
        let form = session.form().await;
        let set = form.skill_set().unwrap();
        assert_eq!(set.selected_skills(form.store()), &[ItemId::from("django")]);
        assert!(set.is_consistent(form.store()));
    }

    #[tokio::test]
    async fn test_catalog_reload_recovers_from_failed_open() {
        let source = Arc::new(FakeSource::geography());
        source.fail_catalog();
        let session = open(job_posting(), &source).await;

        source.heal_catalog();
        assert_eq!(session.reload_catalog().await, Ok(vec![]));

        let skills = session.view().await.skills.unwrap();
        assert!(skills.error.is_none());
        assert_eq!(skills.major_skills.len(), 3);
        assert!(session.set_major_skills(&[ItemId::from("fe")]).await.is_ok());
    }

    fn names_of(skills: &[Skill]) -> Vec<&str> {
        skills.iter().map(|s| s.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_selector_fields_cannot_be_edited_directly() {
        let source = Arc::new(FakeSource::geography());
        let session = open(job_posting(), &source).await;
        assert_eq!(
            session.edit_field("city", FieldValue::Text("Pune".into())).await,
            Err(SessionError::SelectorField("city".into()))
        );
        assert_eq!(
            session.edit_field("nickname", FieldValue::Text("x".into())).await,
            Err(SessionError::UnknownField("nickname".into()))
        );
    }

    #[tokio::test]
    async fn test_jump_blocked_on_invalid_step() {
        let source = Arc::new(FakeSource::geography());
        let session = open(job_posting(), &source).await;
        session.edit_field("title", FieldValue::Text("Backend Engineer".into())).await.unwrap();
        session.edit_field("employment_type", FieldValue::Text("full_time".into())).await.unwrap();
        session.edit_field("openings", FieldValue::Number(2.0)).await.unwrap();
        assert_eq!(session.next().await, Ok(1));

        let err = session.jump_to(3).await.unwrap_err();

        assert!(matches!(err, SessionError::Wizard(WizardError::StepInvalid { step: 1, .. })));
        let form = session.form().await;
        assert_eq!(form.current_step(), 1);
        assert_eq!(form.errors_for("country"), Some("Country is required"));
    }

    async fn fill_valid_organization(session: &Session) {
        session.edit_field("name", FieldValue::Text("Acme Hiring".into())).await.unwrap();
        session.edit_field("email", FieldValue::Text("talent@acme.io".into())).await.unwrap();
        session.next().await.unwrap();
        session.edit_field("address_line", FieldValue::Text("1 Market St".into())).await.unwrap();
        session.edit_field("postal_code", FieldValue::Text("94105".into())).await.unwrap();
        select_us_california_sf(session).await;
    }

    #[tokio::test]
    async fn test_submit_success_hands_off_payload_and_discards_state() {
        let source = Arc::new(FakeSource::geography());
        let session = open(organization(), &source).await;
        fill_valid_organization(&session).await;

        let saved = session.submit().await.unwrap();

        assert_eq!(saved["id"], "rec-1");
        let sent = &source.saves()[0];
        assert_eq!(sent["city"], "San Francisco");
        assert_eq!(sent["state_id"], 10);
        let view = session.view().await;
        assert_eq!(view.phase, Phase::Submitted);
        assert!(view.values.is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejection_preserves_form() {
        let source = Arc::new(FakeSource::geography());
        source.reject_saves(true);
        let session = open(organization(), &source).await;
        fill_valid_organization(&session).await;
        let before = session.view().await.values;

        let err = session.submit().await.unwrap_err();

        assert!(matches!(err, SessionError::Submit(_)));
        let view = session.view().await;
        assert_eq!(view.phase, Phase::Editing);
        assert_eq!(view.current_step, 1);
        assert_eq!(view.values, before);
        assert!(view.submit_error.is_some());

        source.reject_saves(false);
        assert!(session.submit().await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_blocked_by_invalid_step() {
        let source = Arc::new(FakeSource::geography());
        let session = open(organization(), &source).await;
        session.edit_field("name", FieldValue::Text("Acme".into())).await.unwrap();

        let err = session.submit().await.unwrap_err();

        assert!(matches!(err, SessionError::Wizard(WizardError::StepInvalid { step: 0, .. })));
        assert!(source.saves().is_empty());
        assert_eq!(session.form().await.errors_for("email"), Some("Email is required"));
    }

    #[tokio::test]
    async fn test_registry_roundtrip() {
        let source = Arc::new(FakeSource::geography());
        let registry = SessionRegistry::default();
        let session = Arc::new(open(organization(), &source).await);
        let id = session.id;
        registry.insert(session).await;
        assert!(registry.get(id).await.is_some());
        assert_eq!(registry.count().await, 1);
        registry.remove(id).await;
        assert!(registry.get(id).await.is_none());
    }
}

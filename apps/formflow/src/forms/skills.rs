//! Major-skill → skill dependency set.
//!
//! Skills are not paged by parent: the whole catalog is loaded once and filtered
//! client-side. The selected skills are always a subset of the skills whose
//! major skill is selected; changing the major skills prunes the skills in the
//! same write.
//!
//! "Select all" works on the visible (name-filtered) selectable skills and keeps
//! selections hidden by the filter. Clearing likewise only removes visible ones.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, warn};

use crate::forms::loader::LoadError;
use crate::forms::models::{FieldKey, FieldValue, ItemId, MajorSkill, Skill};
use crate::forms::store::{FormStore, LoadStatus, Origin};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkillError {
    #[error("skill catalog is not loaded")]
    CatalogUnavailable,

    #[error("unknown major skill {0}")]
    UnknownMajorSkill(ItemId),

    #[error("skill {0} does not belong to a selected major skill")]
    NotSelectable(ItemId),
}

#[derive(Debug, Clone)]
pub struct SkillSet {
    major_field: FieldKey,
    skill_field: FieldKey,
}

impl SkillSet {
    pub fn new(major_field: impl Into<FieldKey>, skill_field: impl Into<FieldKey>) -> Self {
        Self {
            major_field: major_field.into(),
            skill_field: skill_field.into(),
        }
    }

    /// `major_skills` / `skills`.
    pub fn standard() -> Self {
        Self::new("major_skills", "skills")
    }

    pub fn major_field(&self) -> &str {
        &self.major_field
    }

    pub fn skill_field(&self) -> &str {
        &self.skill_field
    }

    pub fn contains_field(&self, key: &str) -> bool {
        key == self.major_field || key == self.skill_field
    }

    /// Stores a catalog load result and reconciles the selections with it.
    /// Returns the skill ids dropped because the new catalog no longer offers them.
    ///
    /// A failed refresh of an already loaded catalog keeps the previous catalog and
    /// the selections made from it.
    pub fn apply_catalog(
        &self,
        store: &mut FormStore,
        result: Result<(Vec<MajorSkill>, Vec<Skill>), LoadError>,
    ) -> Result<Vec<ItemId>, LoadError> {
        match result {
            Ok((major_skills, skills)) => {
                let catalog = store.catalog_mut();
                catalog.major_skills = major_skills;
                catalog.skills = skills;
                catalog.status = LoadStatus::Loaded;
                Ok(self.reconcile(store))
            }
            Err(err) => {
                if store.catalog().status == LoadStatus::Loaded {
                    warn!("Skill catalog refresh failed, keeping previous catalog: {err}");
                } else {
                    let catalog = store.catalog_mut();
                    catalog.major_skills.clear();
                    catalog.skills.clear();
                    catalog.status = LoadStatus::Failed {
                        message: err.to_string(),
                    };
                }
                Err(err)
            }
        }
    }

    /// Drops selected major skills the catalog no longer knows and prunes the skills.
    fn reconcile(&self, store: &mut FormStore) -> Vec<ItemId> {
        let known: BTreeSet<&ItemId> = store.catalog().major_skills.iter().map(|m| &m.id).collect();
        let selected = self.selected_majors(store);
        let majors: Vec<ItemId> = selected.iter().filter(|id| known.contains(id)).cloned().collect();
        if majors.len() == selected.len() && self.is_consistent(store) {
            return Vec::new();
        }
        self.write_majors(store, majors, Origin::Cascade)
    }

    pub fn selected_majors<'a>(&self, store: &'a FormStore) -> &'a [ItemId] {
        store.list(&self.major_field)
    }

    pub fn selected_skills<'a>(&self, store: &'a FormStore) -> &'a [ItemId] {
        store.list(&self.skill_field)
    }

    /// Skills whose major skill is currently selected, in catalog order.
    pub fn selectable<'a>(&self, store: &'a FormStore) -> Vec<&'a Skill> {
        let majors: BTreeSet<&ItemId> = self.selected_majors(store).iter().collect();
        store
            .catalog()
            .skills
            .iter()
            .filter(|skill| majors.contains(&skill.major_skill_id))
            .collect()
    }

    /// Replaces the selected major skills and prunes skills that lost their major skill.
    /// Returns the skill ids that were dropped.
    pub fn set_major_skills(
        &self,
        store: &mut FormStore,
        ids: &[ItemId],
        origin: Origin,
    ) -> Result<Vec<ItemId>, SkillError> {
        self.ensure_catalog(store)?;
        let known: BTreeSet<&ItemId> = store.catalog().major_skills.iter().map(|m| &m.id).collect();
        if let Some(unknown) = ids.iter().find(|id| !known.contains(id)) {
            return Err(SkillError::UnknownMajorSkill(unknown.clone()));
        }
        let majors = dedup(ids);
        Ok(self.write_majors(store, majors, origin))
    }

    pub fn toggle_major(
        &self,
        store: &mut FormStore,
        id: &ItemId,
        selected: bool,
        origin: Origin,
    ) -> Result<Vec<ItemId>, SkillError> {
        let mut majors = self.selected_majors(store).to_vec();
        majors.retain(|m| m != id);
        if selected {
            majors.push(id.clone());
        }
        self.set_major_skills(store, &majors, origin)
    }

    fn write_majors(&self, store: &mut FormStore, majors: Vec<ItemId>, origin: Origin) -> Vec<ItemId> {
        let allowed: BTreeSet<&ItemId> = store
            .catalog()
            .skills
            .iter()
            .filter(|skill| majors.contains(&skill.major_skill_id))
            .map(|skill| &skill.id)
            .collect();
        let (kept, dropped): (Vec<ItemId>, Vec<ItemId>) = self
            .selected_skills(store)
            .iter()
            .cloned()
            .partition(|id| !majors.is_empty() && allowed.contains(id));

        if !dropped.is_empty() {
            debug!("Pruned {} skill(s) after major skill change", dropped.len());
        }
        store.write(&self.major_field, FieldValue::List(majors), origin);
        store.write(&self.skill_field, FieldValue::List(kept), cascade_of(origin));
        dropped
    }

    /// Replaces the selected skills. Every id must be selectable.
    pub fn set_skills(&self, store: &mut FormStore, ids: &[ItemId], origin: Origin) -> Result<(), SkillError> {
        self.ensure_catalog(store)?;
        let selectable: BTreeSet<&ItemId> = self.selectable(store).into_iter().map(|s| &s.id).collect();
        if let Some(bad) = ids.iter().find(|id| !selectable.contains(id)) {
            return Err(SkillError::NotSelectable(bad.clone()));
        }
        let skills = dedup(ids);
        store.write(&self.skill_field, FieldValue::List(skills), origin);
        Ok(())
    }

    pub fn toggle_skill(
        &self,
        store: &mut FormStore,
        id: &ItemId,
        selected: bool,
        origin: Origin,
    ) -> Result<(), SkillError> {
        let mut skills = self.selected_skills(store).to_vec();
        skills.retain(|s| s != id);
        if selected {
            skills.push(id.clone());
        }
        self.set_skills(store, &skills, origin)
    }

    /// Adds every visible selectable skill. Returns how many were newly selected.
    pub fn select_all(&self, store: &mut FormStore, filter: Option<&str>, origin: Origin) -> Result<usize, SkillError> {
        self.ensure_catalog(store)?;
        let mut skills = self.selected_skills(store).to_vec();
        let before = skills.len();
        let visible: Vec<ItemId> = self
            .selectable(store)
            .into_iter()
            .filter(|skill| matches_filter(skill, filter))
            .map(|skill| skill.id.clone())
            .collect();
        for id in visible {
            if !skills.contains(&id) {
                skills.push(id);
            }
        }
        let added = skills.len() - before;
        store.write(&self.skill_field, FieldValue::List(skills), origin);
        Ok(added)
    }

    /// Removes every visible selected skill. Returns how many were removed.
    pub fn clear_visible(&self, store: &mut FormStore, filter: Option<&str>, origin: Origin) -> usize {
        let visible: BTreeSet<ItemId> = store
            .catalog()
            .skills
            .iter()
            .filter(|skill| matches_filter(skill, filter))
            .map(|skill| skill.id.clone())
            .collect();
        let mut skills = self.selected_skills(store).to_vec();
        let before = skills.len();
        skills.retain(|id| !visible.contains(id));
        let removed = before - skills.len();
        store.write(&self.skill_field, FieldValue::List(skills), origin);
        removed
    }

    /// Restores persisted selections, silently dropping ids the catalog no longer knows.
    /// Fields the user already touched are left alone.
    pub fn restore(&self, store: &mut FormStore, majors: &[ItemId], skills: &[ItemId]) -> bool {
        if self.ensure_catalog(store).is_err() || store.is_touched(&self.major_field) {
            return false;
        }
        let known: BTreeSet<&ItemId> = store.catalog().major_skills.iter().map(|m| &m.id).collect();
        let majors: Vec<ItemId> = dedup(majors).into_iter().filter(|id| known.contains(id)).collect();
        self.write_majors(store, majors, Origin::Initializer);

        if store.is_touched(&self.skill_field) {
            return true;
        }
        let selectable: BTreeSet<ItemId> = self.selectable(store).into_iter().map(|s| s.id.clone()).collect();
        let skills: Vec<ItemId> = dedup(skills).into_iter().filter(|id| selectable.contains(id)).collect();
        store.write(&self.skill_field, FieldValue::List(skills), Origin::Initializer);
        true
    }

    /// Selected skills ⊆ skills of selected major skills.
    pub fn is_consistent(&self, store: &FormStore) -> bool {
        let selectable: BTreeSet<&ItemId> = self.selectable(store).into_iter().map(|s| &s.id).collect();
        self.selected_skills(store).iter().all(|id| selectable.contains(id))
    }

    fn ensure_catalog(&self, store: &FormStore) -> Result<(), SkillError> {
        match store.catalog().status {
            LoadStatus::Loaded => Ok(()),
            _ => Err(SkillError::CatalogUnavailable),
        }
    }
}

fn cascade_of(origin: Origin) -> Origin {
    match origin {
        Origin::User => Origin::Cascade,
        other => other,
    }
}

fn matches_filter(skill: &Skill, filter: Option<&str>) -> bool {
    match filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(filter) => skill.name.to_lowercase().contains(&filter.to_lowercase()),
        None => true,
    }
}

fn dedup(ids: &[ItemId]) -> Vec<ItemId> {
    let mut seen = BTreeSet::new();
    ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemId {
        ItemId::from(s)
    }

    fn store_with_catalog() -> FormStore {
        let mut store = FormStore::new(0);
        let major = |i: &str, n: &str| MajorSkill { id: id(i), name: n.into() };
        let skill = |i: &str, n: &str, m: &str| Skill {
            id: id(i),
            name: n.into(),
            major_skill_id: id(m),
        };
        SkillSet::standard().apply_catalog(
            &mut store,
            Ok((
                vec![major("fe", "Frontend"), major("be", "Backend")],
                vec![
                    skill("react", "React", "fe"),
                    skill("redux", "Redux", "fe"),
                    skill("node", "Node", "be"),
                ],
            )),
        )
        .unwrap();
        store
    }

    #[test]
    fn test_deselecting_major_prunes_its_skills() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("fe"), id("be")], Origin::User).unwrap();
        set.set_skills(&mut store, &[id("react"), id("node")], Origin::User).unwrap();

        let dropped = set.toggle_major(&mut store, &id("fe"), false, Origin::User).unwrap();

        assert_eq!(dropped, vec![id("react")]);
        assert_eq!(set.selected_skills(&store), &[id("node")]);
        assert!(set.is_consistent(&store));
    }

    #[test]
    fn test_deselecting_last_major_clears_skills() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("be")], Origin::User).unwrap();
        set.set_skills(&mut store, &[id("node")], Origin::User).unwrap();

        set.set_major_skills(&mut store, &[], Origin::User).unwrap();

        assert_eq!(store.value("skills"), Some(&FieldValue::List(vec![])));
    }

    #[test]
    fn test_skill_outside_selected_majors_is_rejected() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("be")], Origin::User).unwrap();
        assert_eq!(
            set.set_skills(&mut store, &[id("react")], Origin::User),
            Err(SkillError::NotSelectable(id("react")))
        );
    }

    #[test]
    fn test_unknown_major_rejected() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        assert_eq!(
            set.set_major_skills(&mut store, &[id("ops")], Origin::User),
            Err(SkillError::UnknownMajorSkill(id("ops")))
        );
    }

    #[test]
    fn test_catalog_required() {
        let set = SkillSet::standard();
        let mut store = FormStore::new(0);
        assert_eq!(
            set.set_major_skills(&mut store, &[id("fe")], Origin::User),
            Err(SkillError::CatalogUnavailable)
        );
    }

    #[test]
    fn test_select_all_keeps_hidden_selections() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("fe"), id("be")], Origin::User).unwrap();
        set.set_skills(&mut store, &[id("node")], Origin::User).unwrap();

        let added = set.select_all(&mut store, Some("re"), Origin::User).unwrap();

        assert_eq!(added, 2);
        assert_eq!(set.selected_skills(&store), &[id("node"), id("react"), id("redux")]);
    }

    #[test]
    fn test_clear_visible_only_removes_filtered() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("fe"), id("be")], Origin::User).unwrap();
        set.select_all(&mut store, None, Origin::User).unwrap();

        let removed = set.clear_visible(&mut store, Some("redux"), Origin::User);

        assert_eq!(removed, 1);
        assert_eq!(set.selected_skills(&store), &[id("react"), id("node")]);
    }

    #[test]
    fn test_toggle_skill_adds_and_removes() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("fe")], Origin::User).unwrap();

        set.toggle_skill(&mut store, &id("redux"), true, Origin::User).unwrap();
        set.toggle_skill(&mut store, &id("react"), true, Origin::User).unwrap();
        set.toggle_skill(&mut store, &id("redux"), false, Origin::User).unwrap();

        assert_eq!(set.selected_skills(&store), &[id("react")]);
        assert_eq!(
            set.toggle_skill(&mut store, &id("node"), true, Origin::User),
            Err(SkillError::NotSelectable(id("node")))
        );
    }

    #[test]
    fn test_failed_refresh_keeps_loaded_catalog_and_selections() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("be")], Origin::User).unwrap();
        set.set_skills(&mut store, &[id("node")], Origin::User).unwrap();

        let result = set.apply_catalog(&mut store, Err(LoadError::Timeout));

        assert_eq!(result, Err(LoadError::Timeout));
        assert_eq!(store.catalog().status, LoadStatus::Loaded);
        assert_eq!(store.catalog().skills.len(), 3);
        assert_eq!(set.selected_skills(&store), &[id("node")]);
        assert!(set.is_consistent(&store));
    }

    #[test]
    fn test_first_load_failure_is_recorded() {
        let set = SkillSet::standard();
        let mut store = FormStore::new(0);

        assert!(set.apply_catalog(&mut store, Err(LoadError::Timeout)).is_err());

        assert!(matches!(store.catalog().status, LoadStatus::Failed { .. }));
        assert!(store.catalog().skills.is_empty());
    }

    #[test]
    fn test_refreshed_catalog_prunes_vanished_skills_and_majors() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("fe"), id("be")], Origin::User).unwrap();
        set.set_skills(&mut store, &[id("react"), id("redux"), id("node")], Origin::User).unwrap();

        let dropped = set
            .apply_catalog(
                &mut store,
                Ok((
                    vec![MajorSkill { id: id("fe"), name: "Frontend".into() }],
                    vec![Skill {
                        id: id("react"),
                        name: "React".into(),
                        major_skill_id: id("fe"),
                    }],
                )),
            )
            .unwrap();

        assert_eq!(dropped, vec![id("redux"), id("node")]);
        assert_eq!(set.selected_majors(&store), &[id("fe")]);
        assert_eq!(set.selected_skills(&store), &[id("react")]);
        assert!(set.is_consistent(&store));
    }

    #[test]
    fn test_unchanged_catalog_writes_nothing() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("fe")], Origin::User).unwrap();
        set.set_skills(&mut store, &[id("react")], Origin::User).unwrap();
        let before = store.last_write("skills");

        let catalog = store.catalog().clone();
        let dropped = set
            .apply_catalog(&mut store, Ok((catalog.major_skills, catalog.skills)))
            .unwrap();

        assert!(dropped.is_empty());
        assert_eq!(store.last_write("skills"), before);
    }

    #[test]
    fn test_restore_drops_unknown_ids() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        assert!(set.restore(&mut store, &[id("fe"), id("gone")], &[id("react"), id("node")]));
        assert_eq!(set.selected_majors(&store), &[id("fe")]);
        assert_eq!(set.selected_skills(&store), &[id("react")]);
        assert!(!store.is_touched("skills"));
    }

    #[test]
    fn test_restore_yields_to_user_choice() {
        let set = SkillSet::standard();
        let mut store = store_with_catalog();
        set.set_major_skills(&mut store, &[id("be")], Origin::User).unwrap();
        assert!(!set.restore(&mut store, &[id("fe")], &[id("react")]));
        assert_eq!(set.selected_majors(&store), &[id("be")]);
    }
}

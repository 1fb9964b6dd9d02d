//! Reverse-Lookup Initializer for edit mode.
//!
//! Persisted records name their hierarchy levels instead of carrying ids, so the
//! selection is rebuilt top-down: wait for a level's options, match the stored
//! name case-insensitively, select it (which loads the next level) and repeat.
//! The walk stops at the first level it cannot resolve and leaves everything
//! below unselected; it never guesses. Fields the user already touched win.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::forms::hierarchy::LoadOutcome;
use crate::forms::models::FieldKey;
use crate::forms::payload::{record_ids, record_name, record_value};
use crate::forms::session::Session;
use crate::forms::store::{LoadStatus, Origin};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InitStop {
    /// The record has no name for this level.
    Missing { level: usize },
    /// The user picked something for this level first.
    Touched { level: usize },
    /// No option carries the stored name any more.
    Mismatch { level: usize, name: String },
    LoadFailed { level: usize, message: String },
    /// The level's parent changed while its options were loading.
    Superseded { level: usize },
    Rejected { level: usize, message: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InitReport {
    pub fields_restored: Vec<FieldKey>,
    pub fields_skipped: Vec<FieldKey>,
    pub skills_restored: bool,
    pub levels_resolved: usize,
    pub stopped: Option<InitStop>,
}

/// Pre-populates an open session from a persisted record.
pub async fn initialize(session: &Session, record: &Map<String, Value>) -> InitReport {
    let mut report = InitReport::default();
    restore_plain_fields(session, record, &mut report).await;
    report.skills_restored = restore_skills(session, record).await;
    report.stopped = restore_hierarchy(session, record, &mut report.levels_resolved).await;

    match &report.stopped {
        Some(stop) => info!(
            "Session {}: restored {} level(s), stopped: {stop:?}",
            session.id, report.levels_resolved
        ),
        None => info!(
            "Session {}: restored {} level(s)",
            session.id, report.levels_resolved
        ),
    }
    report
}

async fn restore_plain_fields(session: &Session, record: &Map<String, Value>, report: &mut InitReport) {
    let mut form = session.form().await;
    let definition = form.definition().clone();
    for key in definition.field_keys() {
        if definition.is_selector_field(&key) {
            continue;
        }
        let Some(value) = record_value(record, &key) else {
            continue;
        };
        if form.store_mut().write_untouched(&key, value) {
            report.fields_restored.push(key);
        } else {
            debug!("Keeping user value for {key}");
            report.fields_skipped.push(key);
        }
    }
}

async fn restore_skills(session: &Session, record: &Map<String, Value>) -> bool {
    let mut form = session.form().await;
    let Some(set) = form.skill_set().cloned() else {
        return false;
    };
    let majors = record_ids(record, set.major_field());
    let skills = record_ids(record, set.skill_field());
    if majors.is_empty() && skills.is_empty() {
        return false;
    }
    set.restore(form.store_mut(), &majors, &skills)
}

async fn restore_hierarchy(
    session: &Session,
    record: &Map<String, Value>,
    resolved: &mut usize,
) -> Option<InitStop> {
    let hierarchy = session.form().await.hierarchy().cloned()?;

    for (level, spec) in hierarchy.levels().iter().enumerate() {
        let Some(name) = record_name(record, &spec.field) else {
            return Some(InitStop::Missing { level });
        };

        // Options for this level normally arrived with the previous selection.
        let pending = {
            let mut form = session.form().await;
            if form.store().is_touched(&spec.field) {
                return Some(InitStop::Touched { level });
            }
            match form.store().level(level).map(|o| o.status.clone()) {
                Some(LoadStatus::Loaded) => None,
                Some(LoadStatus::Failed { message }) => {
                    return Some(InitStop::LoadFailed { level, message });
                }
                _ => match form.reload(level) {
                    Ok(request) => Some(request),
                    Err(err) => {
                        return Some(InitStop::Rejected {
                            level,
                            message: err.to_string(),
                        })
                    }
                },
            }
        };
        if let Some(request) = pending {
            if let Some(stop) = check_load(session.run_load(&request).await, level) {
                return Some(stop);
            }
        }

        let next = {
            let mut form = session.form().await;
            if form.store().is_touched(&spec.field) {
                return Some(InitStop::Touched { level });
            }
            let Some(id) = hierarchy
                .find_by_name(form.store(), level, &name)
                .map(|item| item.id.clone())
            else {
                warn!(
                    "Session {}: no {} named '{name}', leaving deeper levels unselected",
                    session.id,
                    spec.kind.label()
                );
                return Some(InitStop::Mismatch { level, name });
            };
            match form.select_at(level, &id, Origin::Initializer) {
                Ok(next) => next,
                Err(err) => {
                    return Some(InitStop::Rejected {
                        level,
                        message: err.to_string(),
                    })
                }
            }
        };
        *resolved += 1;

        if let Some(request) = next {
            if let Some(stop) = check_load(session.run_load(&request).await, request.level) {
                return Some(stop);
            }
        }
    }
    None
}

fn check_load(outcome: LoadOutcome, level: usize) -> Option<InitStop> {
    match outcome {
        LoadOutcome::Committed { .. } => None,
        LoadOutcome::Failed { message } => Some(InitStop::LoadFailed { level, message }),
        LoadOutcome::Stale => Some(InitStop::Superseded { level }),
    }
}

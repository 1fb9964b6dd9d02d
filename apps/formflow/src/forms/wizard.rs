//! Step Validator / Wizard Controller.
//!
//! A state machine over an ordered list of steps. Forward moves (`next`, forward
//! `jump_to`) are gated on the active step validating against the store; backward
//! moves are free. `begin_submit` validates every step in one pass before handing
//! off to the submit collaborator.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::forms::models::FieldKey;
use crate::forms::store::FormStore;
use crate::forms::validation::{validate_fields, CrossCheck, FieldRule};

#[derive(Debug, Clone)]
pub struct WizardStep {
    pub index: usize,
    pub label: String,
    pub fields: Vec<FieldRule>,
    pub checks: Vec<CrossCheck>,
}

impl WizardStep {
    pub fn new(label: &str, fields: Vec<FieldRule>) -> Self {
        Self {
            index: 0,
            label: label.to_string(),
            fields,
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: CrossCheck) -> Self {
        self.checks.push(check);
        self
    }

    pub fn field_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.field.as_str())
    }

    /// Per-field errors for this step; empty when the step is valid.
    /// A cross check only reports when its field passed the field rules.
    pub fn validate(&self, store: &FormStore) -> BTreeMap<FieldKey, String> {
        let mut errors = validate_fields(&self.fields, store);
        for check in &self.checks {
            if let Some((field, message)) = check(store) {
                errors.entry(field).or_insert(message);
            }
        }
        errors
    }

    pub fn is_valid(&self, store: &FormStore) -> bool {
        self.validate(store).is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Editing,
    Submitting,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WizardError {
    #[error("step {step} has {} invalid field(s)", .errors.len())]
    StepInvalid {
        step: usize,
        errors: BTreeMap<FieldKey, String>,
    },

    #[error("already at the first step")]
    AtFirstStep,

    #[error("step {target} does not exist (wizard has {len} steps)")]
    OutOfRange { target: usize, len: usize },

    #[error("form is {0:?}, not editable")]
    NotEditing(Phase),
}

#[derive(Debug, Clone)]
pub struct Wizard {
    steps: Vec<WizardStep>,
    current: usize,
    completed: BTreeSet<usize>,
    phase: Phase,
}

impl Wizard {
    pub fn new(steps: Vec<WizardStep>) -> Self {
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| WizardStep { index, ..step })
            .collect();
        Self {
            steps,
            current: 0,
            completed: BTreeSet::new(),
            phase: Phase::Editing,
        }
    }

    pub fn steps(&self) -> &[WizardStep] {
        &self.steps
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn completed(&self) -> &BTreeSet<usize> {
        &self.completed
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ensure_editing(&self) -> Result<(), WizardError> {
        match self.phase {
            Phase::Editing => Ok(()),
            other => Err(WizardError::NotEditing(other)),
        }
    }

    /// Validates the active step; on success marks it complete and moves forward.
    /// On the last step a successful `next` only marks it complete.
    pub fn next(&mut self, store: &mut FormStore) -> Result<usize, WizardError> {
        self.ensure_editing()?;
        let step = &self.steps[self.current];
        let errors = step.validate(store);
        store.replace_errors(step.field_keys(), &errors);

        if !errors.is_empty() {
            debug!(
                "Step {} ({}) blocked: {} invalid field(s)",
                self.current,
                step.label,
                errors.len()
            );
            return Err(WizardError::StepInvalid {
                step: self.current,
                errors,
            });
        }

        self.completed.insert(self.current);
        if self.current + 1 < self.steps.len() {
            self.current += 1;
        }
        Ok(self.current)
    }

    /// Moves back one step without validating. Errors already shown stay visible.
    pub fn previous(&mut self) -> Result<usize, WizardError> {
        self.ensure_editing()?;
        if self.current == 0 {
            return Err(WizardError::AtFirstStep);
        }
        self.current -= 1;
        Ok(self.current)
    }

    /// Backward jumps are unconditional; forward jumps walk `next` step by step
    /// and stop at the first step that fails.
    pub fn jump_to(&mut self, store: &mut FormStore, target: usize) -> Result<usize, WizardError> {
        self.ensure_editing()?;
        if target >= self.steps.len() {
            return Err(WizardError::OutOfRange {
                target,
                len: self.steps.len(),
            });
        }
        if target <= self.current {
            self.current = target;
            return Ok(self.current);
        }
        while self.current < target {
            self.next(store)?;
        }
        Ok(self.current)
    }

    /// Aggregate validation of every step. On failure the errors of every invalid
    /// step are shown and the wizard moves to the first invalid step.
    pub fn begin_submit(&mut self, store: &mut FormStore) -> Result<(), WizardError> {
        self.ensure_editing()?;
        let mut first_invalid = None;
        let mut all_errors = BTreeMap::new();
        for step in &self.steps {
            let errors = step.validate(store);
            store.replace_errors(step.field_keys(), &errors);
            if errors.is_empty() {
                self.completed.insert(step.index);
            } else {
                self.completed.remove(&step.index);
                first_invalid.get_or_insert(step.index);
                all_errors.extend(errors);
            }
        }

        if let Some(step) = first_invalid {
            self.current = step;
            return Err(WizardError::StepInvalid {
                step,
                errors: all_errors,
            });
        }
        self.phase = Phase::Submitting;
        Ok(())
    }

    pub fn complete_submit(&mut self) {
        info!("Form submitted");
        self.phase = Phase::Submitted;
    }

    /// The collaborator rejected the payload: back to editing, nothing else changes.
    pub fn fail_submit(&mut self) {
        self.phase = Phase::Editing;
    }
}

//! The forms the recruitment front end runs through the engine.
//!
//! Each preset is an ordered list of steps with per-field rules, plus the
//! location hierarchy and skill set it uses, if any.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::forms::hierarchy::Hierarchy;
use crate::forms::models::FieldKey;
use crate::forms::skills::SkillSet;
use crate::forms::store::FormStore;
use crate::forms::validation::{FieldRule, Rule};
use crate::forms::wizard::WizardStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    JobPosting,
    Onboarding,
    Organization,
    UserSettings,
}

impl FormKind {
    /// REST resource the form reads from and writes to.
    pub fn resource(&self) -> &'static str {
        match self {
            FormKind::JobPosting => "jobs",
            FormKind::Onboarding => "onboarding",
            FormKind::Organization => "organizations",
            FormKind::UserSettings => "users",
        }
    }

    pub fn definition(&self) -> FormDefinition {
        match self {
            FormKind::JobPosting => job_posting(),
            FormKind::Onboarding => onboarding(),
            FormKind::Organization => organization(),
            FormKind::UserSettings => user_settings(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormDefinition {
    pub kind: FormKind,
    pub steps: Vec<WizardStep>,
    pub hierarchy: Option<Hierarchy>,
    pub skills: Option<SkillSet>,
}

impl FormDefinition {
    /// Every field the form owns, whether edited directly or through a selector.
    pub fn field_keys(&self) -> BTreeSet<FieldKey> {
        let mut keys: BTreeSet<FieldKey> = self
            .steps
            .iter()
            .flat_map(|s| s.field_keys().map(str::to_string))
            .collect();
        if let Some(hierarchy) = &self.hierarchy {
            keys.extend(hierarchy.levels().iter().map(|l| l.field.clone()));
        }
        if let Some(skills) = &self.skills {
            keys.insert(skills.major_field().to_string());
            keys.insert(skills.skill_field().to_string());
        }
        keys
    }

    /// Whether `key` must go through a selector instead of `edit_field`.
    pub fn is_selector_field(&self, key: &str) -> bool {
        self.hierarchy.as_ref().is_some_and(|h| h.contains_field(key))
            || self.skills.as_ref().is_some_and(|s| s.contains_field(key))
    }
}

fn location_fields(required_depth: usize) -> Vec<FieldRule> {
    [("country", "Country"), ("state", "State"), ("city", "City")]
        .iter()
        .enumerate()
        .map(|(depth, (field, label))| {
            let rules = if depth < required_depth {
                vec![Rule::Required]
            } else {
                vec![]
            };
            FieldRule::new(field, label, rules)
        })
        .collect()
}

fn skill_fields(max_skills: usize) -> Vec<FieldRule> {
    vec![
        FieldRule::required("major_skills", "Major skills"),
        FieldRule::new(
            "skills",
            "Skills",
            vec![Rule::Required, Rule::MaxLength { max: max_skills }],
        ),
    ]
}

fn salary_order(store: &FormStore) -> Option<(FieldKey, String)> {
    let min = store.value("min_salary")?.as_number()?;
    let max = store.value("max_salary")?.as_number()?;
    (min > max).then(|| {
        (
            "max_salary".to_string(),
            "Maximum salary must not be below the minimum salary".to_string(),
        )
    })
}

pub fn job_posting() -> FormDefinition {
    FormDefinition {
        kind: FormKind::JobPosting,
        steps: vec![
            WizardStep::new(
                "Job details",
                vec![
                    FieldRule::new(
                        "title",
                        "Job title",
                        vec![Rule::Required, Rule::MinLength { min: 3 }, Rule::MaxLength { max: 120 }],
                    ),
                    FieldRule::required("employment_type", "Employment type"),
                    FieldRule::new(
                        "openings",
                        "Openings",
                        vec![Rule::Required, Rule::Integer, Rule::Range { min: 1.0, max: 500.0 }],
                    ),
                    FieldRule::new("start_date", "Start date", vec![Rule::Date]),
                ],
            ),
            WizardStep::new("Location", location_fields(3)),
            WizardStep::new("Skills", skill_fields(20)),
            WizardStep::new(
                "Compensation",
                vec![
                    FieldRule::required("currency", "Currency"),
                    FieldRule::new(
                        "min_salary",
                        "Minimum salary",
                        vec![Rule::Required, Rule::Range { min: 0.0, max: 100_000_000.0 }],
                    ),
                    FieldRule::new(
                        "max_salary",
                        "Maximum salary",
                        vec![Rule::Required, Rule::Range { min: 0.0, max: 100_000_000.0 }],
                    ),
                ],
            )
            .with_check(salary_order),
            WizardStep::new(
                "Description",
                vec![FieldRule::new(
                    "description",
                    "Description",
                    vec![Rule::Required, Rule::MinLength { min: 30 }],
                )],
            ),
        ],
        hierarchy: Some(Hierarchy::location()),
        skills: Some(SkillSet::standard()),
    }
}

pub fn onboarding() -> FormDefinition {
    FormDefinition {
        kind: FormKind::Onboarding,
        steps: vec![
            WizardStep::new(
                "Profile",
                vec![
                    FieldRule::required("first_name", "First name"),
                    FieldRule::required("last_name", "Last name"),
                    FieldRule::new("phone", "Phone", vec![Rule::Required, Rule::Phone]),
                ],
            ),
            WizardStep::new(
                "Company",
                vec![
                    FieldRule::new(
                        "company_name",
                        "Company name",
                        vec![Rule::Required, Rule::MinLength { min: 2 }],
                    ),
                    FieldRule::required("company_size", "Company size"),
                    FieldRule::new("website", "Website", vec![Rule::Url]),
                ],
            ),
            WizardStep::new("Location", location_fields(3)),
        ],
        hierarchy: Some(Hierarchy::location()),
        skills: None,
    }
}

pub fn organization() -> FormDefinition {
    let mut address = vec![FieldRule::required("address_line", "Address")];
    address.extend(location_fields(3));
    address.push(FieldRule::new(
        "postal_code",
        "Postal code",
        vec![Rule::Required, Rule::MaxLength { max: 10 }],
    ));

    FormDefinition {
        kind: FormKind::Organization,
        steps: vec![
            WizardStep::new(
                "Organization",
                vec![
                    FieldRule::new("name", "Name", vec![Rule::Required, Rule::MinLength { min: 2 }]),
                    FieldRule::new("email", "Email", vec![Rule::Required, Rule::Email]),
                    FieldRule::new("phone", "Phone", vec![Rule::Phone]),
                    FieldRule::new("website", "Website", vec![Rule::Url]),
                ],
            ),
            WizardStep::new("Address", address),
        ],
        hierarchy: Some(Hierarchy::location()),
        skills: None,
    }
}

pub fn user_settings() -> FormDefinition {
    FormDefinition {
        kind: FormKind::UserSettings,
        steps: vec![
            WizardStep::new(
                "Account",
                vec![
                    FieldRule::required("full_name", "Full name"),
                    FieldRule::new("email", "Email", vec![Rule::Required, Rule::Email]),
                    FieldRule::new("phone", "Phone", vec![Rule::Phone]),
                ],
            ),
            WizardStep::new("Location", location_fields(1)),
            WizardStep::new("Skills", skill_fields(30)),
        ],
        hierarchy: Some(Hierarchy::location()),
        skills: Some(SkillSet::standard()),
    }
}

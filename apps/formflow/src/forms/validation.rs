use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::forms::models::{FieldKey, FieldValue};
use crate::forms::store::FormStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    Required,
    Email,
    Phone,
    Url,
    Integer,
    Date,
    MinLength { min: usize },
    MaxLength { max: usize },
    Range { min: f64, max: f64 },
}

/// Rules attached to one field, with the label used in messages.
#[derive(Debug, Clone, Serialize)]
pub struct FieldRule {
    pub field: FieldKey,
    pub label: String,
    pub rules: Vec<Rule>,
}

impl FieldRule {
    pub fn new(field: &str, label: &str, rules: Vec<Rule>) -> Self {
        Self {
            field: field.to_string(),
            label: label.to_string(),
            rules,
        }
    }

    pub fn required(field: &str, label: &str) -> Self {
        Self::new(field, label, vec![Rule::Required])
    }
}

/// Step-level check spanning several fields. Returns the field to blame and a message.
pub type CrossCheck = fn(&FormStore) -> Option<(FieldKey, String)>;

/// Checks a single value against a single rule.
/// Everything except `Required` passes on an empty value.
pub fn check_rule(rule: &Rule, label: &str, value: Option<&FieldValue>) -> Option<String> {
    let present = value.filter(|v| !v.is_empty());
    if let Rule::Required = rule {
        return match present {
            Some(_) => None,
            None => Some(format!("{label} is required")),
        };
    }
    let value = present?;

    match rule {
        Rule::Required => None,
        Rule::Email => text_rule(value, label, is_email, "must be a valid email address"),
        Rule::Phone => text_rule(value, label, is_phone, "must be a valid phone number"),
        Rule::Url => text_rule(value, label, is_url, "must be a valid http(s) URL"),
        Rule::Date => text_rule(value, label, is_date, "must be a date (YYYY-MM-DD)"),
        Rule::Integer => match value.as_number() {
            Some(n) if n.fract() == 0.0 => None,
            _ => Some(format!("{label} must be a whole number")),
        },
        Rule::MinLength { min } => match value {
            FieldValue::Text(text) if text.trim().chars().count() < *min => {
                Some(format!("{label} must be at least {min} characters"))
            }
            FieldValue::List(items) if items.len() < *min => {
                Some(format!("Select at least {min} {}", label.to_lowercase()))
            }
            _ => None,
        },
        Rule::MaxLength { max } => match value {
            FieldValue::Text(text) if text.trim().chars().count() > *max => {
                Some(format!("{label} must be at most {max} characters"))
            }
            FieldValue::List(items) if items.len() > *max => {
                Some(format!("Select at most {max} {}", label.to_lowercase()))
            }
            _ => None,
        },
        Rule::Range { min, max } => match value.as_number() {
            Some(n) if n < *min || n > *max => {
                Some(format!("{label} must be between {min} and {max}"))
            }
            Some(_) => None,
            None => Some(format!("{label} must be a number")),
        },
    }
}

fn text_rule(value: &FieldValue, label: &str, ok: fn(&str) -> bool, msg: &str) -> Option<String> {
    match value.as_text() {
        Some(text) if ok(text.trim()) => None,
        _ => Some(format!("{label} {msg}")),
    }
}

/// First failing rule per field; fields that pass are absent from the map.
pub fn validate_fields(rules: &[FieldRule], store: &FormStore) -> BTreeMap<FieldKey, String> {
    rules
        .iter()
        .filter_map(|field_rule| {
            let value = store.value(&field_rule.field);
            field_rule
                .rules
                .iter()
                .find_map(|rule| check_rule(rule, &field_rule.label, value))
                .map(|message| (field_rule.field.clone(), message))
        })
        .collect()
}

fn is_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !text.chars().any(char::is_whitespace)
        && domain
            .split('.')
            .all(|part| !part.is_empty())
        && domain.contains('.')
}

fn is_phone(text: &str) -> bool {
    let allowed = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    let digits = text.chars().filter(char::is_ascii_digit).count();
    allowed && (7..=15).contains(&digits)
}

fn is_url(text: &str) -> bool {
    reqwest::Url::parse(text)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

fn is_date(text: &str) -> bool {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}

/// API Client: the single point of entry for all recruitment REST API calls.
///
/// No other module may talk HTTP to the API directly. The form engine only sees
/// the `HierarchySource`, `SkillCatalog` and `RecordGateway` seams this client
/// implements. Requests are not retried: a failure (timeouts included) is
/// surfaced to the caller, which degrades the affected selector locally.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::forms::models::{Item, ItemId, LevelKind, MajorSkill, Skill};
use crate::forms::presets::FormKind;
use crate::forms::session::FormMode;
use crate::forms::sources::{HierarchySource, RecordGateway, SkillCatalog};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid request URL: {0}")]
    Url(String),
}

/// The API answers either with the bare payload or wrapped in `{"data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(inner) => inner,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url(&config.api_base_url)?,
            token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Url(format!("{path}: {e}")))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let url = self.url(path)?;
        debug!("{method} {url}");

        let mut request = self.client.request(method.clone(), url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(&text);
            warn!("{method} {path} returned {status}: {message}");
            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        // 204 and friends carry no body.
        let body = if text.trim().is_empty() { "null" } else { text.as_str() };
        let envelope: Envelope<T> = serde_json::from_str(body)?;
        Ok(envelope.into_inner())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None).await
    }
}

fn base_url(raw: &str) -> Result<Url, ApiError> {
    // `Url::join` drops the last segment unless the base ends in '/'.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| ApiError::Url(format!("{raw}: {e}")))
}

/// Pulls a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.get("message")
            .or_else(|| v.get("error").and_then(|e| e.get("message")))
            .or_else(|| v.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    message.unwrap_or_else(|| body.trim().to_string())
}

fn children_path(kind: LevelKind, parent: Option<&ItemId>) -> Result<String, ApiError> {
    match (kind, parent) {
        (LevelKind::Country, _) => Ok("countries".to_string()),
        (LevelKind::State, Some(country)) => Ok(format!("countries/{country}/states")),
        (LevelKind::City, Some(state)) => Ok(format!("states/{state}/cities")),
        (kind, None) => Err(ApiError::Url(format!(
            "{} lookup needs a parent id",
            kind.label()
        ))),
    }
}

fn record_path(kind: FormKind, mode: &FormMode) -> (Method, String) {
    match mode {
        FormMode::Create => (Method::POST, kind.resource().to_string()),
        FormMode::Edit { record_id } => (Method::PUT, format!("{}/{record_id}", kind.resource())),
    }
}

#[async_trait]
impl HierarchySource for ApiClient {
    async fn fetch_children(
        &self,
        kind: LevelKind,
        parent: Option<&ItemId>,
    ) -> Result<Vec<Item>, ApiError> {
        let path = children_path(kind, parent)?;
        self.get(&path).await
    }
}

#[async_trait]
impl SkillCatalog for ApiClient {
    async fn fetch_major_skills(&self) -> Result<Vec<MajorSkill>, ApiError> {
        self.get("major-skills").await
    }

    async fn fetch_skills(&self) -> Result<Vec<Skill>, ApiError> {
        self.get("skills").await
    }
}

#[async_trait]
impl RecordGateway for ApiClient {
    async fn fetch(&self, kind: FormKind, id: &str) -> Result<Map<String, Value>, ApiError> {
        self.get(&format!("{}/{id}", kind.resource())).await
    }

    async fn save(
        &self,
        kind: FormKind,
        mode: &FormMode,
        payload: &Value,
    ) -> Result<Value, ApiError> {
        let (method, path) = record_path(kind, mode);
        self.request(method, &path, Some(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_paths() {
        assert_eq!(children_path(LevelKind::Country, None).unwrap(), "countries");
        assert_eq!(
            children_path(LevelKind::State, Some(&ItemId::Int(3))).unwrap(),
            "countries/3/states"
        );
        assert_eq!(
            children_path(LevelKind::City, Some(&ItemId::from("MH"))).unwrap(),
            "states/MH/cities"
        );
        assert!(children_path(LevelKind::City, None).is_err());
    }

    #[test]
    fn test_record_paths() {
        assert_eq!(
            record_path(FormKind::JobPosting, &FormMode::Create),
            (Method::POST, "jobs".to_string())
        );
        let edit = FormMode::Edit {
            record_id: "42".into(),
        };
        assert_eq!(
            record_path(FormKind::Organization, &edit),
            (Method::PUT, "organizations/42".to_string())
        );
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let base = base_url("https://api.example.com/v1").unwrap();
        assert_eq!(
            base.join("countries").unwrap().as_str(),
            "https://api.example.com/v1/countries"
        );
    }

    #[test]
    fn test_envelope_wrapped_and_bare() {
        let wrapped: Envelope<Vec<Item>> =
            serde_json::from_str(r#"{"data": [{"id": 1, "name": "India"}]}"#).unwrap();
        assert_eq!(wrapped.into_inner()[0].name, "India");
        let bare: Envelope<Vec<Item>> = serde_json::from_str(r#"[{"id": 1, "name": "India"}]"#).unwrap();
        assert_eq!(bare.into_inner().len(), 1);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message": "title taken"}"#), "title taken");
        assert_eq!(error_message(r#"{"error": {"message": "nope"}}"#), "nope");
        assert_eq!(error_message(r#"{"error": "bad token"}"#), "bad token");
        assert_eq!(error_message(" gateway timeout "), "gateway timeout");
    }
}

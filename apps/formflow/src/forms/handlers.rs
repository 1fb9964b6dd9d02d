//! Axum route handlers for form sessions (the host UI contract).

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::forms::hierarchy::LoadOutcome;
use crate::forms::initializer::{initialize, InitReport};
use crate::forms::models::{FieldValue, ItemId};
use crate::forms::presets::FormKind;
use crate::forms::session::{FormMode, FormSession, Session, SessionView};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OpenFormRequest {
    pub kind: FormKind,
    /// Edit an existing record. Fetched from the API unless `record` is supplied.
    pub record_id: Option<String>,
    pub record: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct OpenFormResponse {
    pub session_id: Uuid,
    pub view: SessionView,
    pub initialization: Option<InitReport>,
}

#[derive(Debug, Deserialize)]
pub struct FieldUpdate {
    /// `null` clears the field.
    pub value: Option<FieldValue>,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub id: ItemId,
}

#[derive(Debug, Serialize)]
pub struct SelectResponse {
    /// Result of loading the next level; absent when nothing had to be loaded.
    pub load: Option<LoadOutcome>,
    pub view: SessionView,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub load: LoadOutcome,
    pub view: SessionView,
}

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<ItemId>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub id: ItemId,
    pub selected: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterRequest {
    pub filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SkillsResponse {
    /// Skill ids pruned or added by the change, depending on the operation.
    pub changed: Vec<ItemId>,
    pub count: usize,
    pub view: SessionView,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub saved: Value,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

async fn find(state: &AppState, id: Uuid) -> Result<Arc<Session>, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Form session {id} not found")))
}

/// POST /api/v1/forms
pub async fn handle_open(
    State(state): State<AppState>,
    Json(req): Json<OpenFormRequest>,
) -> Result<(StatusCode, Json<OpenFormResponse>), AppError> {
    let record = match (&req.record_id, req.record) {
        (_, Some(record)) => Some(record),
        (Some(record_id), None) => Some(
            state
                .sources
                .records
                .fetch(req.kind, record_id)
                .await
                .map_err(|e| AppError::Upstream(format!("Failed to load record {record_id}: {e}")))?,
        ),
        (None, None) => None,
    };
    let mode = match (&req.record_id, &record) {
        (Some(record_id), _) => FormMode::Edit {
            record_id: record_id.clone(),
        },
        (None, Some(_)) => {
            return Err(AppError::Validation(
                "record_id is required when a record is supplied".to_string(),
            ))
        }
        (None, None) => FormMode::Create,
    };

    let session = Arc::new(Session::new(
        Uuid::new_v4(),
        FormSession::new(req.kind.definition(), mode),
        state.sources.clone(),
    ));
    session.open().await;

    let initialization = match &record {
        Some(record) => Some(initialize(&session, record).await),
        None => None,
    };

    state.sessions.insert(session.clone()).await;
    info!("Opened {:?} form session {}", req.kind, session.id);

    Ok((
        StatusCode::CREATED,
        Json(OpenFormResponse {
            session_id: session.id,
            view: session.view().await,
            initialization,
        }),
    ))
}

/// GET /api/v1/forms/:id
pub async fn handle_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = find(&state, id).await?;
    Ok(Json(session.view().await))
}

/// DELETE /api/v1/forms/:id
pub async fn handle_cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .remove(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Form session {id} not found")))?;
    info!("Cancelled form session {id}");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/forms/:id/fields/:key
pub async fn handle_edit_field(
    State(state): State<AppState>,
    Path((id, key)): Path<(Uuid, String)>,
    Json(req): Json<FieldUpdate>,
) -> Result<Json<SessionView>, AppError> {
    let session = find(&state, id).await?;
    match req.value {
        Some(value) => session.edit_field(&key, value).await?,
        None => session.clear_field(&key).await?,
    }
    Ok(Json(session.view().await))
}

/// POST /api/v1/forms/:id/levels/:level/select
pub async fn handle_select(
    State(state): State<AppState>,
    Path((id, level)): Path<(Uuid, usize)>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<SelectResponse>, AppError> {
    let session = find(&state, id).await?;
    let load = session.select_at(level, &req.id).await?;
    Ok(Json(SelectResponse {
        load,
        view: session.view().await,
    }))
}

/// DELETE /api/v1/forms/:id/levels/:level
pub async fn handle_deselect(
    State(state): State<AppState>,
    Path((id, level)): Path<(Uuid, usize)>,
) -> Result<Json<SessionView>, AppError> {
    let session = find(&state, id).await?;
    session.deselect_at(level).await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/forms/:id/levels/:level/reload
pub async fn handle_reload(
    State(state): State<AppState>,
    Path((id, level)): Path<(Uuid, usize)>,
) -> Result<Json<ReloadResponse>, AppError> {
    let session = find(&state, id).await?;
    let load = session.reload(level).await?;
    Ok(Json(ReloadResponse {
        load,
        view: session.view().await,
    }))
}

/// PUT /api/v1/forms/:id/skills/majors
pub async fn handle_set_major_skills(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<IdsRequest>,
) -> Result<Json<SkillsResponse>, AppError> {
    let session = find(&state, id).await?;
    let pruned = session.set_major_skills(&req.ids).await?;
    Ok(Json(SkillsResponse {
        count: pruned.len(),
        changed: pruned,
        view: session.view().await,
    }))
}

/// POST /api/v1/forms/:id/skills/majors/toggle
pub async fn handle_toggle_major_skill(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<SkillsResponse>, AppError> {
    let session = find(&state, id).await?;
    let pruned = session.toggle_major_skill(&req.id, req.selected).await?;
    Ok(Json(SkillsResponse {
        count: pruned.len(),
        changed: pruned,
        view: session.view().await,
    }))
}

/// PUT /api/v1/forms/:id/skills
pub async fn handle_set_skills(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<IdsRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = find(&state, id).await?;
    session.set_skills(&req.ids).await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/forms/:id/skills/toggle
pub async fn handle_toggle_skill(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ToggleRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = find(&state, id).await?;
    session.toggle_skill(&req.id, req.selected).await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/forms/:id/skills/select-all
pub async fn handle_select_all_skills(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FilterRequest>,
) -> Result<Json<SkillsResponse>, AppError> {
    let session = find(&state, id).await?;
    let count = session.select_all_skills(req.filter.as_deref()).await?;
    Ok(Json(SkillsResponse {
        changed: Vec::new(),
        count,
        view: session.view().await,
    }))
}

/// POST /api/v1/forms/:id/skills/clear
pub async fn handle_clear_skills(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FilterRequest>,
) -> Result<Json<SkillsResponse>, AppError> {
    let session = find(&state, id).await?;
    let count = session.clear_skills(req.filter.as_deref()).await?;
    Ok(Json(SkillsResponse {
        changed: Vec::new(),
        count,
        view: session.view().await,
    }))
}

/// POST /api/v1/forms/:id/skills/reload
/// `changed` lists the selected skills the refreshed catalog no longer offers.
pub async fn handle_reload_skills(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SkillsResponse>, AppError> {
    let session = find(&state, id).await?;
    let pruned = session.reload_catalog().await?;
    Ok(Json(SkillsResponse {
        count: pruned.len(),
        changed: pruned,
        view: session.view().await,
    }))
}

/// POST /api/v1/forms/:id/next
pub async fn handle_next(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = find(&state, id).await?;
    session.next().await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/forms/:id/previous
pub async fn handle_previous(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = find(&state, id).await?;
    session.previous().await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/forms/:id/jump/:index
pub async fn handle_jump(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<SessionView>, AppError> {
    let session = find(&state, id).await?;
    session.jump_to(index).await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/forms/:id/submit
/// A submitted session is discarded; a rejected one stays open for a retry.
pub async fn handle_submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmitResponse>, AppError> {
    let session = find(&state, id).await?;
    let saved = session.submit().await?;
    state.sessions.remove(id).await;
    Ok(Json(SubmitResponse { saved }))
}

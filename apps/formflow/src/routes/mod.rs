pub mod health;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::forms::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session lifecycle
        .route("/api/v1/forms", post(handlers::handle_open))
        .route(
            "/api/v1/forms/:id",
            get(handlers::handle_view).delete(handlers::handle_cancel),
        )
        .route("/api/v1/forms/:id/fields/:key", put(handlers::handle_edit_field))
        // Location hierarchy
        .route(
            "/api/v1/forms/:id/levels/:level",
            delete(handlers::handle_deselect),
        )
        .route(
            "/api/v1/forms/:id/levels/:level/select",
            post(handlers::handle_select),
        )
        .route(
            "/api/v1/forms/:id/levels/:level/reload",
            post(handlers::handle_reload),
        )
        // Skills
        .route(
            "/api/v1/forms/:id/skills",
            put(handlers::handle_set_skills),
        )
        .route(
            "/api/v1/forms/:id/skills/majors",
            put(handlers::handle_set_major_skills),
        )
        .route(
            "/api/v1/forms/:id/skills/majors/toggle",
            post(handlers::handle_toggle_major_skill),
        )
        .route(
            "/api/v1/forms/:id/skills/toggle",
            post(handlers::handle_toggle_skill),
        )
        .route(
            "/api/v1/forms/:id/skills/select-all",
            post(handlers::handle_select_all_skills),
        )
        .route(
            "/api/v1/forms/:id/skills/clear",
            post(handlers::handle_clear_skills),
        )
        .route(
            "/api/v1/forms/:id/skills/reload",
            post(handlers::handle_reload_skills),
        )
        // Wizard
        .route("/api/v1/forms/:id/next", post(handlers::handle_next))
        .route("/api/v1/forms/:id/previous", post(handlers::handle_previous))
        .route("/api/v1/forms/:id/jump/:index", post(handlers::handle_jump))
        .route("/api/v1/forms/:id/submit", post(handlers::handle_submit))
        .with_state(state)
}

use std::sync::Arc;

use crate::forms::session::SessionRegistry;
use crate::forms::sources::Sources;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Collaborators every new form session is wired to.
    pub sources: Sources,
    pub sessions: Arc<SessionRegistry>,
}

//! Selector Cache/Loader: fetches the children of one hierarchy level.
//!
//! Concurrent loads for the same `(level, parent)` share one request: the first
//! caller performs the fetch, later callers await the same cell. Whether a result
//! is still wanted is decided by the caller (`Hierarchy::apply`) against the
//! live parent, not here.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::api_client::ApiError;
use crate::forms::models::Item;
use crate::forms::hierarchy::LoadRequest;
use crate::forms::sources::HierarchySource;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl From<ApiError> for LoadError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http(e) if e.is_timeout() => LoadError::Timeout,
            ApiError::Http(e) => LoadError::Unavailable(e.to_string()),
            ApiError::Api { status, message } => {
                LoadError::Unavailable(format!("status {status}: {message}"))
            }
            ApiError::Parse(e) => LoadError::Malformed(e.to_string()),
            ApiError::Url(msg) => LoadError::Malformed(msg),
        }
    }
}

pub type LoadResult = Result<Vec<Item>, LoadError>;

pub struct SelectorLoader {
    source: Arc<dyn HierarchySource>,
    in_flight: Mutex<HashMap<LoadRequest, Arc<OnceCell<LoadResult>>>>,
}

impl SelectorLoader {
    pub fn new(source: Arc<dyn HierarchySource>) -> Self {
        Self {
            source,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches the children for `request`, joining an identical in-flight fetch if one exists.
    /// Failures are returned, never retried.
    pub async fn load(&self, request: &LoadRequest) -> LoadResult {
        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(request) {
                Some(cell) => {
                    debug!(
                        "Joining in-flight {} load (parent {:?})",
                        request.kind.label(),
                        request.parent
                    );
                    cell.clone()
                }
                None => {
                    let cell = Arc::new(OnceCell::new());
                    in_flight.insert(request.clone(), cell.clone());
                    cell
                }
            }
        };

        let result = cell.get_or_init(|| self.fetch(request)).await.clone();

        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(request)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(request);
        }

        result
    }

    async fn fetch(&self, request: &LoadRequest) -> LoadResult {
        debug!(
            "Fetching {} options (parent {:?})",
            request.kind.label(),
            request.parent
        );
        self.source
            .fetch_children(request.kind, request.parent.as_ref())
            .await
            .map_err(|e| {
                let err = LoadError::from(e);
                warn!("{} load failed: {err}", request.kind.label());
                err
            })
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::models::{ItemId, LevelKind};
    use crate::forms::sources::fakes::FakeSource;

    fn states_of(parent: i64) -> LoadRequest {
        LoadRequest {
            level: 1,
            kind: LevelKind::State,
            parent: Some(ItemId::Int(parent)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_loads_share_one_fetch() {
        let source = Arc::new(FakeSource::geography());
        source.delay(LevelKind::State, Some(ItemId::Int(1)), 50);
        let loader = SelectorLoader::new(source.clone());

        let request = states_of(1);
        let (a, b) = tokio::join!(loader.load(&request), loader.load(&request));

        assert_eq!(a.unwrap().len(), 2);
        assert_eq!(b.unwrap().len(), 2);
        assert_eq!(source.calls().len(), 1);
        assert_eq!(loader.in_flight_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_parents_fetch_separately() {
        let source = Arc::new(FakeSource::geography());
        let loader = SelectorLoader::new(source.clone());

        let us_request = states_of(1);
        let ca_request = states_of(2);
        let (us, ca) = tokio::join!(loader.load(&us_request), loader.load(&ca_request));
        assert_eq!(us.unwrap()[0].name, "California");
        assert_eq!(ca.unwrap()[0].name, "Ontario");
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_completed_load_is_not_cached() {
        let source = Arc::new(FakeSource::geography());
        let loader = SelectorLoader::new(source.clone());
        loader.load(&states_of(1)).await.unwrap();
        loader.load(&states_of(1)).await.unwrap();
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_retried() {
        let source = Arc::new(FakeSource::geography());
        source.fail(LevelKind::State, Some(ItemId::Int(1)));
        let loader = SelectorLoader::new(source.clone());

        let err = loader.load(&states_of(1)).await.unwrap_err();
        assert!(matches!(err, LoadError::Unavailable(_)));
        assert_eq!(source.calls().len(), 1);
    }
}

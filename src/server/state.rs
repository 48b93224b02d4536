use std::sync::Arc;

use super::error::ApiError;
use crate::engine::{QueryPool, RetrievalEngine};
use crate::store::LoadTier;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no tier could be loaded; chat routes then answer 503.
    pub engine: Option<Arc<RetrievalEngine>>,
    pub tier: Option<LoadTier>,
    pub pool: Arc<QueryPool>,
}

impl AppState {
    pub fn loaded(engine: RetrievalEngine, tier: LoadTier, pool: QueryPool) -> Self {
        Self {
            engine: Some(Arc::new(engine)),
            tier: Some(tier),
            pool: Arc::new(pool),
        }
    }

    pub fn unloaded(pool: QueryPool) -> Self {
        Self {
            engine: None,
            tier: None,
            pool: Arc::new(pool),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Result<Arc<RetrievalEngine>, ApiError> {
        self.engine.clone().ok_or(ApiError::NotLoaded)
    }

    /// Stops admitting queries. In-flight ones run to completion.
    pub fn shutdown(&self) {
        self.pool.close();
    }
}

//! Shared application state for all routes.

use crate::api::Api;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<Api>,
    /// Checked by the readiness route; absent when the API runs over another executor.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(api: Arc<Api>) -> Self {
        AppState { api, pool: None }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

//! Shared state passed to all API handlers

use std::sync::Arc;

use crate::query::QueryService;
use crate::registry::ServerRegistry;
use crate::storage::MetricsStore;

#[derive(Clone)]
pub struct ApiState {
    pub query: Arc<QueryService>,
    pub registry: Arc<dyn ServerRegistry>,
    pub store: Arc<dyn MetricsStore>,
}

impl ApiState {
    pub fn new(
        query: Arc<QueryService>,
        registry: Arc<dyn ServerRegistry>,
        store: Arc<dyn MetricsStore>,
    ) -> Self {
        Self {
            query,
            registry,
            store,
        }
    }
}

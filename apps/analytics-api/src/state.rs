use std::sync::Arc;

use domain_analytics::{ClickHouseStore, IdentityClient, IngestPipeline, QueryEngine};

/// Shared application state for the analytics API.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline<ClickHouseStore>>,
    pub query: QueryEngine,
    pub identity: IdentityClient,
}

impl AppState {
    pub fn new(store: Arc<ClickHouseStore>, identity: IdentityClient) -> Self {
        Self {
            pipeline: Arc::new(IngestPipeline::new(store.clone())),
            query: QueryEngine::new(store),
            identity,
        }
    }
}

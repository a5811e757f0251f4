use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::external::messaging::Messaging;
use crate::external::triage::{HeuristicTriage, TriageAssistant};
use crate::models::review::Review;
use crate::observability::metrics::Metrics;
use crate::store::directory::ProviderDirectory;
use crate::store::orders::OrderStore;
use crate::store::quotes::QuoteStore;

pub struct AppState {
    pub directory: ProviderDirectory,
    pub orders: OrderStore,
    pub quotes: QuoteStore,
    pub reviews: DashMap<Uuid, Review>,
    pub messaging: Messaging,
    pub triage: Arc<dyn TriageAssistant>,
    pub metrics: Metrics,
    pub search_timeout: Duration,
    pub archive_max_attempts: u32,
}

impl AppState {
    pub fn new(config: &Config, triage: Arc<dyn TriageAssistant>) -> Self {
        Self {
            directory: ProviderDirectory::new(),
            orders: OrderStore::new(),
            quotes: QuoteStore::new(),
            reviews: DashMap::new(),
            messaging: Messaging::new(),
            triage,
            metrics: Metrics::new(),
            search_timeout: Duration::from_millis(config.search_timeout_ms),
            archive_max_attempts: config.archive_max_attempts,
        }
    }

    /// Defaults for tests: heuristic triage, generous search budget.
    pub fn with_defaults() -> Self {
        Self {
            directory: ProviderDirectory::new(),
            orders: OrderStore::new(),
            quotes: QuoteStore::new(),
            reviews: DashMap::new(),
            messaging: Messaging::new(),
            triage: Arc::new(HeuristicTriage),
            metrics: Metrics::new(),
            search_timeout: Duration::from_secs(10),
            archive_max_attempts: 5,
        }
    }
}

use std::sync::Arc;

use crate::assignment::{AssignmentEngine, SupervisorDirectory};
use crate::config::CoreConfig;
use crate::filters::FilterEngine;
use crate::sequence::SequenceGenerator;
use crate::sla::AnalyticsEngine;
use crate::store::DocumentStore;

/// Shared engine bundle handed to every request handler.
///
/// Built once at startup from one store handle and one supervisor directory;
/// everything inside is `Send + Sync` and cheap to clone behind the `Arc`
/// callers typically wrap this in.
pub struct CoreState {
    pub store: Arc<dyn DocumentStore>,
    pub sequence: SequenceGenerator,
    pub assignment: AssignmentEngine,
    pub filters: FilterEngine,
    pub analytics: AnalyticsEngine,
    pub config: CoreConfig,
}

impl CoreState {
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn DocumentStore>,
        directory: Arc<dyn SupervisorDirectory>,
    ) -> Self {
        Self {
            sequence: SequenceGenerator::new(Arc::clone(&store), &config),
            assignment: AssignmentEngine::new(
                Arc::clone(&store),
                directory,
                config.assignment_strategy,
            ),
            filters: FilterEngine::new(Arc::clone(&store), &config),
            analytics: AnalyticsEngine::new(Arc::clone(&store), &config),
            store,
            config,
        }
    }
}

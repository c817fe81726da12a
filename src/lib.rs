//! ClearLabel server - governed catalog updates for supplement transparency

pub mod config;
pub mod error;
pub mod events;
pub mod governance;
pub mod http;
pub mod models;
pub mod queue;
pub mod store;
pub mod updater;

use std::sync::Arc;

use crate::governance::GovernanceManager;
use crate::queue::{ExecutionProcessor, UpdateQueue};
use crate::updater::CatalogUpdater;

/// Application state shared across handlers
pub struct AppState {
    pub manager: Arc<GovernanceManager>,
    pub queue: Arc<UpdateQueue>,
    pub processor: Arc<ExecutionProcessor>,
    pub updater: Arc<CatalogUpdater>,
}

impl AppState {
    pub fn new(
        manager: Arc<GovernanceManager>,
        queue: Arc<UpdateQueue>,
        processor: Arc<ExecutionProcessor>,
        updater: Arc<CatalogUpdater>,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            queue,
            processor,
            updater,
        })
    }
}

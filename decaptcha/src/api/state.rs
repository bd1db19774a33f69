use std::sync::Arc;

use crate::config::Config;
use crate::services::SolverService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub solver: SolverService,
}

impl AppState {
    pub fn new(config: Config, solver: SolverService) -> Self {
        Self {
            config: Arc::new(config),
            solver,
        }
    }
}

use std::sync::Arc;

use crate::config::RunConfig;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    /// Run parameters validated at startup.
    pub config: Arc<RunConfig>,
}

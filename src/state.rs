use crate::services::LifecycleService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleService>,
}

pub type SharedState = Arc<AppState>;

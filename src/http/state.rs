use crate::call::CallSession;
use crate::config::Config;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active calls (call_id → session)
    pub calls: Arc<RwLock<HashMap<String, Arc<CallSession>>>>,

    /// Base configuration applied to every new call
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            calls: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }
}

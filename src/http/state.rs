use crate::directory::ListenerDirectory;
use crate::session::SessionManager;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live broadcast sessions
    pub manager: Arc<SessionManager>,

    /// Registered device tokens (same instance the manager notifies from)
    pub directory: Arc<ListenerDirectory>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let directory = Arc::clone(manager.directory());
        Self { manager, directory }
    }
}

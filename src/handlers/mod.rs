pub mod admin_returns;
pub mod returns;

use std::sync::Arc;

use crate::events::EventSender;
use crate::repositories::SharedReturnStore;
use crate::services::{ReturnPolicy, ReturnService};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub returns: Arc<ReturnService>,
}

impl AppServices {
    pub fn new(store: SharedReturnStore, event_sender: EventSender, policy: ReturnPolicy) -> Self {
        Self {
            returns: Arc::new(ReturnService::new(store, event_sender, policy)),
        }
    }
}

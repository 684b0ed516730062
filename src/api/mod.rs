pub mod errors;
pub mod params;
pub mod signals;

use crate::warehouse::Warehouse;
use std::sync::Arc;

/// Shared application state handed to every handler.
pub struct AppState {
    /// Process-wide warehouse client, read-only after startup.
    pub warehouse: Arc<dyn Warehouse>,
}

impl AppState {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }
}

//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use circulation_core::ports::LibraryStore;
use circulation_core::service::CirculationService;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
///
/// `store` and `circulation` share the same adapter: handlers use `store`
/// directly for plain reads and CRUD, and `circulation` for every operation
/// with lending semantics.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LibraryStore>,
    pub circulation: CirculationService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn LibraryStore>, config: Arc<Config>) -> Self {
        Self {
            circulation: CirculationService::new(store.clone()),
            store,
            config,
        }
    }
}

use std::sync::Arc;

use parcel_core::visibility::VisibilityRules;
use parcel_db::JobStore;
use parcel_events::NotificationDebouncer;
use parcel_pipeline::JobDispatcher;
use parcel_storage::AccessManager;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every client is constructed once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub dispatcher: Arc<JobDispatcher>,
    /// Mints and re-mints artifact URLs.
    pub access: Arc<AccessManager>,
    pub debouncer: Arc<NotificationDebouncer>,
    pub visibility: VisibilityRules,
    pub config: Arc<ServerConfig>,
}

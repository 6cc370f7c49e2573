use axum::routing::{get, post};
use axum::Router;

use crate::handlers::internal;
use crate::state::AppState;

/// Routes mounted at `/internal`.
///
/// ```text
/// GET    /jobs/{id}                 -> get_job
/// POST   /jobs/{id}/dispatch        -> dispatch_job
/// POST   /notifications/events      -> record_event
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/{id}", get(internal::get_job))
        .route("/jobs/{id}/dispatch", post(internal::dispatch_job))
        .route("/notifications/events", post(internal::record_event))
}

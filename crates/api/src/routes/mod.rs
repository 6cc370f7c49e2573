pub mod health;
pub mod internal;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                                   create, list (end-user JWT)
/// /jobs/{id}                              status
/// /jobs/{id}/parts/{index}                302 to a part's URL
///
/// /internal/jobs/{id}                     full record (service secret)
/// /internal/jobs/{id}/dispatch            re-dispatch a PENDING job
/// /internal/notifications/events          record a debounced event
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/internal", internal::router())
}

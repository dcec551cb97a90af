//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Health / heartbeat route
//! - `/v1` changelog and job routes

mod changelogs;
mod health;
mod jobs;

use std::sync::Arc;

use axum::{Router, middleware};
use tower::ServiceBuilder;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .merge(changelogs::router())
        .merge(jobs::router());

    Router::new()
        .merge(health::router())
        .nest("/v1", v1)
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

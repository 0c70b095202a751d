mod health;
mod home;
mod metrics;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::state::AppState;

pub use health::health_handler;
pub use home::home_handler;
pub use metrics::metrics_handler;

// Every route sits behind admission control
pub fn router(state: Arc<AppState>) -> Router {
    let admission = state.admission.layer(state.identity.clone());

    Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(admission)
        .with_state(state)
}

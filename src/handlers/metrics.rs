use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;
use tracing::error;

use crate::metrics::{SESSIONS, render};
use crate::state::AppState;

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    SESSIONS.set(state.admission.store().len() as f64);

    match render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

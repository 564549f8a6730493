use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(status_handler))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub status: &'static str,
    pub environment: String,
    pub version: &'static str,
    pub db_status: &'static str,
    pub uptime: f64,
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<Status> {
    let db_status = match state.store.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            warn!("Store ping failed: {e}");
            "disconnected"
        }
    };

    Json(Status {
        status: "online",
        environment: state.config.environment.clone(),
        version: env!("CARGO_PKG_VERSION"),
        db_status,
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

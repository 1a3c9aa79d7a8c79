use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::gatekeeper::{Gatekeeper, StatusSnapshot};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// GET /health
pub async fn health_check(State(gatekeeper): State<Arc<Gatekeeper>>) -> Json<HealthResponse> {
    let healthy = gatekeeper.status().last_error.is_none();

    Json(HealthResponse {
        status: if healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: Utc::now(),
    })
}

/// GET /status
pub async fn get_status(State(gatekeeper): State<Arc<Gatekeeper>>) -> Json<StatusSnapshot> {
    Json(gatekeeper.status())
}

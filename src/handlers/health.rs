use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::models::health::HealthResponse;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let instruments = state.pattern_state.instruments.read().await.len();
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        instruments,
    }))
}

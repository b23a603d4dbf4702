use axum::{routing::get, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::ErrorResponse;
use crate::handlers::{health, zones};
use crate::models::health::HealthResponse;
use crate::models::status::{DetectorStatus, InstrumentStatus, ZonesResponse, ZonesSnapshot};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        zones::get_zones,
        zones::get_instrument_zones,
        zones::get_zones_stream
    ),
    components(schemas(
        HealthResponse,
        ErrorResponse,
        DetectorStatus,
        InstrumentStatus,
        ZonesResponse,
        ZonesSnapshot
    ))
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/zones", get(zones::get_zones))
        .route("/zones/stream", get(zones::get_zones_stream))
        .route("/zones/{instrument}", get(zones::get_instrument_zones))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use crate::services::pattern_state::PatternStateInner;

    fn app_state() -> AppState {
        AppState {
            pattern_state: PatternStateInner::new(4),
        }
    }

    #[test]
    fn openapi_lists_zone_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/health", "/zones", "/zones/{instrument}", "/zones/stream"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[tokio::test]
    async fn unknown_instrument_is_not_found() {
        let result = zones::get_instrument_zones(State(app_state()), Path("XYZ".to_string())).await;
        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn published_instrument_is_served() {
        let state = app_state();
        state
            .pattern_state
            .publish(InstrumentStatus {
                instrument: "BTC".to_string(),
                ticker: "BTC".to_string(),
                label: String::new(),
                interval: "1m".to_string(),
                detectors: Vec::new(),
                last_error: None,
                updated_at_ms: 1,
                summary: "BTC: no detectors enabled.".to_string(),
            })
            .await;

        let axum::Json(status) =
            zones::get_instrument_zones(State(state.clone()), Path("BTC".to_string()))
                .await
                .unwrap();
        assert_eq!(status.instrument, "BTC");

        let axum::Json(all) = zones::get_zones(State(state.clone())).await.unwrap();
        assert_eq!(all.instruments.len(), 1);

        let axum::Json(health) = health::health(State(state)).await.unwrap();
        assert_eq!(health.instruments, 1);
    }
}

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

use crate::errors::AppError;
use crate::models::status::{InstrumentStatus, ZonesResponse, ZonesSnapshot};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/zones",
    responses(
        (status = 200, description = "Latest detector results for every instrument", body = ZonesResponse)
    )
)]
pub async fn get_zones(State(state): State<AppState>) -> Result<Json<ZonesResponse>, AppError> {
    let instruments = state
        .pattern_state
        .instruments
        .read()
        .await
        .values()
        .cloned()
        .collect();
    Ok(Json(ZonesResponse { instruments }))
}

#[utoipa::path(
    get,
    path = "/zones/{instrument}",
    params(
        ("instrument" = String, Path, description = "Configured instrument id", example = "BTC")
    ),
    responses(
        (status = 200, description = "Latest detector results for one instrument", body = InstrumentStatus),
        (status = 404, description = "Instrument not monitored or not yet published", body = crate::errors::ErrorResponse)
    )
)]
pub async fn get_instrument_zones(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
) -> Result<Json<InstrumentStatus>, AppError> {
    state
        .pattern_state
        .instruments
        .read()
        .await
        .get(&instrument)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("instrument {instrument} is not monitored")))
}

#[utoipa::path(
    get,
    path = "/zones/stream",
    responses(
        (status = 200, description = "SSE stream of zone snapshots", content_type = "text/event-stream")
    )
)]
pub async fn get_zones_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    let initial_events = match snapshot_event(state.pattern_state.snapshot().await) {
        Some(event) => vec![Ok(event)],
        None => Vec::new(),
    };
    let initial_stream = tokio_stream::iter(initial_events);

    let rx = state.pattern_state.broadcaster.subscribe();
    let broadcast_stream = BroadcastStream::new(rx).filter_map(|message| match message {
        Ok(snapshot) => snapshot_event(snapshot).map(Ok),
        Err(BroadcastStreamRecvError::Lagged(_)) => None,
    });

    let stream = initial_stream.chain(broadcast_stream);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn snapshot_event(snapshot: ZonesSnapshot) -> Option<Event> {
    let data = serde_json::to_string(&snapshot).ok()?;
    Some(
        Event::default()
            .event("snapshot")
            .id(snapshot.as_of_ms.to_string())
            .data(data),
    )
}

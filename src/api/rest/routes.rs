use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::{DateQuery, date_or_today};
use crate::engine::planning::{BatchReport, plan_routes};
use crate::error::AppError;
use crate::geo::Coordinate;
use crate::models::route::{Route, RouteStop, StopEvent};
use crate::models::status::DeliveryStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/routes/optimize", post(optimize_routes))
        .route("/agents/:id/route", get(get_agent_route))
        .route("/route-stops/:id/status", patch(update_stop_status))
}

#[derive(Deserialize)]
pub struct OptimizeRoutesRequest {
    pub date: NaiveDate,
    pub agent_ids: Vec<Uuid>,
    pub depot: Option<Coordinate>,
}

#[derive(Deserialize)]
pub struct UpdateStopStatusRequest {
    pub status: DeliveryStatus,
    pub actual_minutes: Option<u32>,
}

async fn optimize_routes(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OptimizeRoutesRequest>,
) -> Result<Json<BatchReport>, AppError> {
    let depot = match payload.depot {
        Some(depot) => Coordinate::new(depot.lat, depot.lng)
            .ok_or_else(|| AppError::BadRequest("depot is not a valid coordinate".to_string()))?,
        None => state.config.depot,
    };

    let report = plan_routes(
        &state.storage,
        &state.metrics,
        payload.date,
        &payload.agent_ids,
        depot,
        &state.config.routing_params(),
        state.clock.now(),
    );

    info!(
        date = %report.date,
        planned = report.planned,
        failed = report.failed,
        "route planning batch finished"
    );
    Ok(Json(report))
}

async fn get_agent_route(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Route>, AppError> {
    let date = date_or_today(&state, query.date)?;
    let route = state.storage.route_for_agent(agent_id, date).ok_or_else(|| {
        AppError::NotFound(format!("agent {agent_id} has no route for {date}"))
    })?;

    Ok(Json(route))
}

async fn update_stop_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStopStatusRequest>,
) -> Result<Json<RouteStop>, AppError> {
    let (route, stop) = state.storage.update_stop_status(
        id,
        payload.status,
        payload.actual_minutes,
        state.clock.now(),
    )?;

    publish_stop_update(&state, &route, &stop);
    Ok(Json(stop))
}

/// Counts a stop change, broadcasts it to WebSocket listeners and logs it.
/// Shared by every endpoint that can move a stop.
pub(crate) fn publish_stop_update(state: &AppState, route: &Route, stop: &RouteStop) {
    state
        .metrics
        .route_stop_updates_total
        .with_label_values(&[stop.status.as_str()])
        .inc();

    let _ = state.stop_events_tx.send(StopEvent {
        route_id: route.id,
        agent_id: route.agent_id,
        stop_id: stop.id,
        sequence: stop.sequence,
        status: stop.status,
        delivered_at: stop.delivered_at,
    });

    info!(
        route_id = %route.id,
        stop_id = %stop.id,
        sequence = stop.sequence,
        status = stop.status.as_str(),
        "route stop updated"
    );
}

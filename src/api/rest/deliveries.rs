use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::routes::publish_stop_update;
use crate::api::rest::{DateQuery, date_or_today};
use crate::engine::scheduler::{ExpansionReport, next_target_date, run_expansion};
use crate::error::AppError;
use crate::models::delivery::SubscriptionDelivery;
use crate::models::status::DeliveryStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/expansions", post(trigger_expansion).get(list_expansions))
        .route("/deliveries", get(list_deliveries))
        .route("/deliveries/:id/agent", patch(assign_agent))
        .route("/deliveries/:id/status", patch(update_status))
}

#[derive(Default, Deserialize)]
pub struct ExpansionRequest {
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct AssignAgentRequest {
    pub agent_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DeliveryStatus,
}

/// Admin trigger. Defaults to the date the daily job would expand next.
async fn trigger_expansion(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExpansionRequest>,
) -> Result<Json<ExpansionReport>, AppError> {
    let target = match payload.date {
        Some(date) => date,
        None => next_target_date(&state)?,
    };

    let report = run_expansion(&state, target)?;
    Ok(Json(report))
}

async fn list_expansions(State(state): State<Arc<AppState>>) -> Json<Vec<ExpansionReport>> {
    let mut runs: Vec<ExpansionReport> = state
        .storage
        .expansion_runs
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    runs.sort_by_key(|run| run.target_date);
    Json(runs)
}

async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<SubscriptionDelivery>>, AppError> {
    let date = date_or_today(&state, query.date)?;
    Ok(Json(state.storage.deliveries_for_date(date)))
}

async fn assign_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignAgentRequest>,
) -> Result<Json<SubscriptionDelivery>, AppError> {
    let delivery = state.storage.assign_delivery_agent(id, payload.agent_id)?;
    Ok(Json(delivery))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<SubscriptionDelivery>, AppError> {
    let change = state
        .storage
        .update_delivery_status(id, payload.status, state.clock.now())?;
    if let Some((route, stop)) = &change.stop {
        publish_stop_update(&state, route, stop);
    }
    Ok(Json(change.record))
}

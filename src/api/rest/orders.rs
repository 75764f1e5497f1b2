use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::deliveries::{AssignAgentRequest, UpdateStatusRequest};
use crate::api::rest::routes::publish_stop_update;
use crate::error::AppError;
use crate::models::order::Order;
use crate::models::status::DeliveryStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/agent", patch(assign_agent))
        .route("/orders/:id/status", patch(update_status))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub address_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub agent_id: Option<Uuid>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if state.storage.address(payload.address_id).is_none() {
        return Err(AppError::BadRequest(format!(
            "address {} does not exist",
            payload.address_id
        )));
    }

    let order = Order {
        id: Uuid::new_v4(),
        customer_id: payload.customer_id,
        address_id: payload.address_id,
        scheduled_date: payload.scheduled_date,
        status: DeliveryStatus::Pending,
        delivered_at: None,
        agent_id: payload.agent_id,
        created_at: state.clock.now(),
    };

    state.storage.orders.insert(order.id, order.clone());
    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .storage
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

    Ok(Json(order.value().clone()))
}

async fn assign_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignAgentRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state.storage.assign_order_agent(id, payload.agent_id)?;
    Ok(Json(order))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let change = state
        .storage
        .update_order_status(id, payload.status, state.clock.now())?;
    if let Some((route, stop)) = &change.stop {
        publish_stop_update(&state, route, stop);
    }
    Ok(Json(change.record))
}

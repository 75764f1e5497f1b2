use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{patch, post};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::expansion::parse_days_of_week;
use crate::error::AppError;
use crate::geo::{RawDegrees, coordinate_from_raw};
use crate::models::address::Address;
use crate::models::subscription::{Subscription, SubscriptionStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/addresses", post(create_address))
        .route(
            "/subscriptions",
            post(create_subscription).get(list_subscriptions),
        )
        .route("/subscriptions/:id/status", patch(update_subscription_status))
}

#[derive(Deserialize)]
pub struct CreateAddressRequest {
    pub label: String,
    pub latitude: Option<RawDegrees>,
    pub longitude: Option<RawDegrees>,
}

#[derive(Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub address_id: Uuid,
    pub quantity: u32,
    pub days_of_week: Vec<String>,
    pub start_date: NaiveDate,
}

#[derive(Deserialize)]
pub struct UpdateSubscriptionStatusRequest {
    pub status: SubscriptionStatus,
}

async fn create_address(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAddressRequest>,
) -> Result<Json<Address>, AppError> {
    if payload.label.trim().is_empty() {
        return Err(AppError::BadRequest("label cannot be empty".to_string()));
    }

    let coordinate = match (&payload.latitude, &payload.longitude) {
        (None, None) => None,
        (lat, lng) => Some(coordinate_from_raw(lat.as_ref(), lng.as_ref()).ok_or_else(|| {
            AppError::BadRequest("latitude and longitude must both be valid degrees".to_string())
        })?),
    };

    let address = Address {
        id: Uuid::new_v4(),
        label: payload.label,
        coordinate,
    };

    state.storage.addresses.insert(address.id, address.clone());
    Ok(Json(address))
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<Json<Subscription>, AppError> {
    if payload.quantity == 0 {
        return Err(AppError::BadRequest("quantity must be > 0".to_string()));
    }

    if state.storage.address(payload.address_id).is_none() {
        return Err(AppError::BadRequest(format!(
            "address {} does not exist",
            payload.address_id
        )));
    }

    let days_of_week = serde_json::to_string(&payload.days_of_week)
        .map_err(|err| AppError::Internal(format!("failed to encode weekday set: {err}")))?;
    parse_days_of_week(&days_of_week).map_err(|err| AppError::BadRequest(err.to_string()))?;

    let now = state.clock.now();
    let subscription = Subscription {
        id: Uuid::new_v4(),
        customer_id: payload.customer_id,
        product_id: payload.product_id,
        address_id: payload.address_id,
        quantity: payload.quantity,
        days_of_week,
        start_date: payload.start_date,
        status: SubscriptionStatus::Active,
        created_at: now,
        updated_at: now,
    };

    state
        .storage
        .subscriptions
        .insert(subscription.id, subscription.clone());
    Ok(Json(subscription))
}

async fn list_subscriptions(State(state): State<Arc<AppState>>) -> Json<Vec<Subscription>> {
    let mut subscriptions: Vec<Subscription> = state
        .storage
        .subscriptions
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    subscriptions.sort_by_key(|subscription| (subscription.created_at, subscription.id));
    Json(subscriptions)
}

async fn update_subscription_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSubscriptionStatusRequest>,
) -> Result<Json<Subscription>, AppError> {
    let subscription =
        state
            .storage
            .set_subscription_status(id, payload.status, state.clock.now())?;
    Ok(Json(subscription))
}

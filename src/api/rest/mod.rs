pub mod deliveries;
pub mod orders;
pub mod routes;
pub mod subscriptions;
pub mod ws;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(subscriptions::router())
        .merge(deliveries::router())
        .merge(orders::router())
        .merge(routes::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

/// The requested date, or today in the deployment time zone.
pub(crate) fn date_or_today(
    state: &AppState,
    date: Option<NaiveDate>,
) -> Result<NaiveDate, AppError> {
    match date {
        Some(date) => Ok(date),
        None => Ok(state.clock.today(state.config.time_zone()?)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    subscriptions: usize,
    deliveries: usize,
    orders: usize,
    routes: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let storage = &state.storage;
    Json(HealthResponse {
        status: "ok",
        subscriptions: storage.subscriptions.len(),
        deliveries: storage.deliveries.len(),
        orders: storage.orders.len(),
        routes: storage.routes.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

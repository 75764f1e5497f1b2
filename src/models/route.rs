use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinate;
use crate::models::status::DeliveryStatus;

/// What a stop delivers: a subscription delivery or a one-time order, never
/// both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StopTarget {
    Delivery(Uuid),
    Order(Uuid),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    pub id: Uuid,
    pub route_id: Uuid,
    pub sequence: u32,
    pub target: StopTarget,
    pub address_id: Uuid,
    pub status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub estimated_minutes: u32,
    pub actual_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub date: NaiveDate,
    pub depot: Coordinate,
    pub status: RouteStatus,
    pub total_distance_km: f64,
    pub estimated_minutes: u32,
    pub created_at: DateTime<Utc>,
    /// Ordered by `sequence`, which runs 1..=len without gaps.
    pub stops: Vec<RouteStop>,
}

impl Route {
    /// Recomputes the route status from its stops.
    pub fn refresh_status(&mut self) {
        let all_done = self.stops.iter().all(|stop| stop.status.is_terminal());
        let any_started = self
            .stops
            .iter()
            .any(|stop| stop.status != DeliveryStatus::Pending);

        self.status = if all_done && !self.stops.is_empty() {
            RouteStatus::Completed
        } else if any_started {
            RouteStatus::Active
        } else {
            RouteStatus::Pending
        };
    }
}

/// Broadcast to WebSocket listeners whenever a stop changes status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopEvent {
    pub route_id: Uuid,
    pub agent_id: Uuid,
    pub stop_id: Uuid,
    pub sequence: u32,
    pub status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
}

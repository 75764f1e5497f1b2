use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::optimizer::{
    Locatable, RouteMetrics, RoutingParams, compute_metrics, leg_estimates, optimize,
};
use crate::error::AppError;
use crate::geo::Coordinate;
use crate::models::route::{Route, RouteStatus, RouteStop, StopTarget};
use crate::models::status::DeliveryStatus;
use crate::observability::metrics::Metrics;
use crate::storage::Storage;

/// A pending delivery or order waiting to be placed on a route.
#[derive(Debug, Clone)]
struct Candidate {
    target: StopTarget,
    address_id: Uuid,
    coordinate: Option<Coordinate>,
}

impl Locatable for Candidate {
    fn coordinate(&self) -> Option<Coordinate> {
        self.coordinate
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AgentOutcome {
    Planned {
        agent_id: Uuid,
        route_id: Uuid,
        stops: usize,
        metrics: RouteMetrics,
    },
    NoStops {
        agent_id: Uuid,
    },
    Failed {
        agent_id: Uuid,
        error: String,
    },
}

impl AgentOutcome {
    fn label(&self) -> &'static str {
        match self {
            AgentOutcome::Planned { .. } => "planned",
            AgentOutcome::NoStops { .. } => "empty",
            AgentOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub date: NaiveDate,
    pub depot: Coordinate,
    pub planned: usize,
    pub failed: usize,
    pub results: Vec<AgentOutcome>,
}

/// Plans one route per agent. Every agent gets an outcome; a failure for one
/// never stops the others.
pub fn plan_routes(
    storage: &Storage,
    metrics: &Metrics,
    date: NaiveDate,
    agent_ids: &[Uuid],
    depot: Coordinate,
    params: &RoutingParams,
    now: DateTime<Utc>,
) -> BatchReport {
    let mut results = Vec::with_capacity(agent_ids.len());

    for &agent_id in agent_ids {
        let start = Instant::now();
        let outcome = match plan_agent(storage, date, agent_id, depot, params, now) {
            Ok(Some(route)) => {
                info!(
                    agent_id = %agent_id,
                    route_id = %route.id,
                    stops = route.stops.len(),
                    distance_km = route.total_distance_km,
                    "route planned"
                );
                AgentOutcome::Planned {
                    agent_id,
                    route_id: route.id,
                    stops: route.stops.len(),
                    metrics: RouteMetrics {
                        total_distance_km: route.total_distance_km,
                        estimated_minutes: route.estimated_minutes,
                    },
                }
            }
            Ok(None) => {
                warn!(agent_id = %agent_id, %date, "no pending stops for agent");
                AgentOutcome::NoStops { agent_id }
            }
            Err(err) => {
                error!(agent_id = %agent_id, error = %err, "route planning failed");
                AgentOutcome::Failed {
                    agent_id,
                    error: err.to_string(),
                }
            }
        };

        metrics
            .route_planning_latency_seconds
            .observe(start.elapsed().as_secs_f64());
        metrics
            .routes_planned_total
            .with_label_values(&[outcome.label()])
            .inc();
        results.push(outcome);
    }

    let planned = results
        .iter()
        .filter(|outcome| matches!(outcome, AgentOutcome::Planned { .. }))
        .count();
    let failed = results
        .iter()
        .filter(|outcome| matches!(outcome, AgentOutcome::Failed { .. }))
        .count();

    BatchReport {
        date,
        depot,
        planned,
        failed,
        results,
    }
}

fn plan_agent(
    storage: &Storage,
    date: NaiveDate,
    agent_id: Uuid,
    depot: Coordinate,
    params: &RoutingParams,
    now: DateTime<Utc>,
) -> Result<Option<Route>, AppError> {
    let candidates = pending_candidates(storage, date, agent_id);
    if candidates.is_empty() {
        return Ok(None);
    }

    let ordered = optimize(candidates, depot);
    let metrics = compute_metrics(&ordered, depot, params);
    let legs = leg_estimates(&ordered, depot, params);

    let route_id = Uuid::new_v4();
    let stops = ordered
        .iter()
        .zip(legs)
        .enumerate()
        .map(|(index, (candidate, estimated_minutes))| RouteStop {
            id: Uuid::new_v4(),
            route_id,
            sequence: index as u32 + 1,
            target: candidate.target,
            address_id: candidate.address_id,
            status: DeliveryStatus::Pending,
            delivered_at: None,
            estimated_minutes,
            actual_minutes: None,
        })
        .collect();

    let route = Route {
        id: route_id,
        agent_id,
        date,
        depot,
        status: RouteStatus::Pending,
        total_distance_km: metrics.total_distance_km,
        estimated_minutes: metrics.estimated_minutes,
        created_at: now,
        stops,
    };

    storage.create_route(route).map(Some)
}

/// Pending deliveries first, then pending one-time orders, each in storage
/// order. That order is the optimizer's tie-break. Anything already on a
/// route is left out.
fn pending_candidates(storage: &Storage, date: NaiveDate, agent_id: Uuid) -> Vec<Candidate> {
    let deliveries = storage
        .deliveries_for_date(date)
        .into_iter()
        .filter(|delivery| {
            delivery.agent_id == Some(agent_id) && delivery.status == DeliveryStatus::Pending
        })
        .map(|delivery| (StopTarget::Delivery(delivery.id), delivery.address_id));

    let orders = storage
        .orders_for_date(date)
        .into_iter()
        .filter(|order| order.agent_id == Some(agent_id) && order.status == DeliveryStatus::Pending)
        .map(|order| (StopTarget::Order(order.id), order.address_id));

    deliveries
        .chain(orders)
        .filter(|(target, _)| storage.stop_for(*target).is_none())
        .map(|(target, address_id)| {
            let coordinate = match storage.address(address_id) {
                Some(address) => address.coordinate,
                None => {
                    warn!(%address_id, "stop address not found; treating as unlocated");
                    None
                }
            };
            Candidate {
                target,
                address_id,
                coordinate,
            }
        })
        .collect()
}

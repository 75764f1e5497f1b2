//! Nearest-neighbor stop ordering and route metrics.
//!
//! Distances are great-circle approximations, used only to rank stops
//! relative to each other. Ordering is O(n²) in the number of located stops,
//! which is fine for one agent's day (tens of stops) and not meant for
//! anything larger.

use serde::{Deserialize, Serialize};

use crate::geo::{Coordinate, haversine_km};

/// Anything that can be placed on a route.
pub trait Locatable {
    fn coordinate(&self) -> Option<Coordinate>;
}

impl Locatable for Coordinate {
    fn coordinate(&self) -> Option<Coordinate> {
        Some(*self)
    }
}

impl Locatable for Option<Coordinate> {
    fn coordinate(&self) -> Option<Coordinate> {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingParams {
    pub average_speed_kmh: f64,
    pub per_stop_minutes: u32,
}

impl Default for RoutingParams {
    fn default() -> Self {
        Self {
            average_speed_kmh: 30.0,
            per_stop_minutes: 5,
        }
    }
}

impl RoutingParams {
    fn travel_minutes(&self, distance_km: f64) -> u32 {
        (distance_km / self.average_speed_kmh * 60.0).round() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    /// Rounded to two decimals.
    pub total_distance_km: f64,
    pub estimated_minutes: u32,
}

/// Orders stops greedily from the depot: always the closest unvisited located
/// stop next, earliest input position winning ties. Stops without a
/// coordinate keep their relative order and go last. When no stop is located
/// the input is returned as is.
pub fn optimize<S: Locatable>(stops: Vec<S>, depot: Coordinate) -> Vec<S> {
    let mut remaining: Vec<(Coordinate, S)> = Vec::with_capacity(stops.len());
    let mut unlocated: Vec<S> = Vec::new();

    for stop in stops {
        match stop.coordinate() {
            Some(coordinate) => remaining.push((coordinate, stop)),
            None => unlocated.push(stop),
        }
    }

    if remaining.is_empty() {
        return unlocated;
    }

    let mut ordered = Vec::with_capacity(remaining.len() + unlocated.len());
    let mut current = depot;

    while !remaining.is_empty() {
        let mut nearest_index = 0;
        let mut nearest_distance = f64::INFINITY;

        for (index, (coordinate, _)) in remaining.iter().enumerate() {
            let distance = haversine_km(&current, coordinate);
            if distance < nearest_distance {
                nearest_distance = distance;
                nearest_index = index;
            }
        }

        // `remove` keeps the input order of the rest, which the tie-break
        // relies on.
        let (coordinate, stop) = remaining.remove(nearest_index);
        current = coordinate;
        ordered.push(stop);
    }

    ordered.extend(unlocated);
    ordered
}

/// Closed-loop distance and time for an already ordered route. Stops without
/// a coordinate add no distance but still count towards service time.
pub fn compute_metrics<S: Locatable>(
    ordered: &[S],
    depot: Coordinate,
    params: &RoutingParams,
) -> RouteMetrics {
    if ordered.is_empty() {
        return RouteMetrics {
            total_distance_km: 0.0,
            estimated_minutes: 0,
        };
    }

    let mut total_km = 0.0;
    let mut current = depot;

    for coordinate in ordered.iter().filter_map(Locatable::coordinate) {
        total_km += haversine_km(&current, &coordinate);
        current = coordinate;
    }
    total_km += haversine_km(&current, &depot);

    let service_minutes = ordered.len() as u32 * params.per_stop_minutes;

    RouteMetrics {
        total_distance_km: round_km(total_km),
        estimated_minutes: params.travel_minutes(total_km) + service_minutes,
    }
}

/// Minutes attributed to each stop in order: travel from the previous located
/// point plus the fixed service time.
pub fn leg_estimates<S: Locatable>(
    ordered: &[S],
    depot: Coordinate,
    params: &RoutingParams,
) -> Vec<u32> {
    let mut current = depot;

    ordered
        .iter()
        .map(|stop| match stop.coordinate() {
            Some(coordinate) => {
                let leg_km = haversine_km(&current, &coordinate);
                current = coordinate;
                params.travel_minutes(leg_km) + params.per_stop_minutes
            }
            None => params.per_stop_minutes,
        })
        .collect()
}

fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle shared by subscription deliveries, one-time orders and route
/// stops.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InTransit,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }

    fn can_move_to(&self, next: DeliveryStatus) -> bool {
        matches!(
            (self, next),
            (DeliveryStatus::Pending, _) | (DeliveryStatus::InTransit, DeliveryStatus::Delivered)
                | (DeliveryStatus::InTransit, DeliveryStatus::Failed)
        ) && next != DeliveryStatus::Pending
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot move from {} to {}", .from.as_str(), .to.as_str())]
pub struct TransitionError {
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
}

/// Applies a status change in place. Returns `Ok(false)` when `next` equals
/// the current status; `delivered_at` is left untouched in that case so a
/// repeated "delivered" keeps the first timestamp.
pub fn apply_transition(
    status: &mut DeliveryStatus,
    delivered_at: &mut Option<DateTime<Utc>>,
    next: DeliveryStatus,
    now: DateTime<Utc>,
) -> Result<bool, TransitionError> {
    if *status == next {
        return Ok(false);
    }

    if !status.can_move_to(next) {
        return Err(TransitionError {
            from: *status,
            to: next,
        });
    }

    *status = next;
    if next == DeliveryStatus::Delivered {
        *delivered_at = Some(now);
    }

    Ok(true)
}

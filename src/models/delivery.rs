use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::status::DeliveryStatus;

/// Output of expansion: the caller persists one delivery per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub subscription_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_for: DateTime<Utc>,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDelivery {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub address_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_for: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

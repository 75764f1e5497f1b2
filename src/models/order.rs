use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::status::DeliveryStatus;

/// One-time order. Routed alongside subscription deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub address_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub status: DeliveryStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub label: String,
    pub coordinate: Option<Coordinate>,
}

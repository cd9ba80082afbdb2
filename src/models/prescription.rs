use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Fulfilled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionRecord {
    pub reference: String,
    pub status: FulfillmentStatus,
    pub fulfilled_by: Option<Uuid>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

/// A staged fulfillment write awaiting commit or abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFulfillment {
    pub reference: String,
    pub order_id: Uuid,
}

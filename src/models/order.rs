use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Statuses that carry a driver reference.
    pub fn requires_driver(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned
                | OrderStatus::PickedUp
                | OrderStatus::InTransit
                | OrderStatus::Delivered
        )
    }

    /// Statuses during which the bound driver's position is shared with trackers.
    pub fn is_trackable(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::InTransit
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// Currency amount in minor units (cents).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub fn minor_units(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub id: Uuid,
    pub prescription_ref: String,
    pub patient_ref: String,
    pub pharmacy_ref: Option<String>,
    pub delivery_address: String,
    pub delivery_phone: String,
    pub notes: Option<String>,
    pub pickup: Option<GeoPoint>,
    pub status: OrderStatus,
    pub driver_id: Option<Uuid>,
    pub fee: Money,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancelled_driver_id: Option<Uuid>,
    pub driver_unreachable_since: Option<DateTime<Utc>>,
}

impl DeliveryOrder {
    /// Latest timestamp recorded on the order so far.
    pub fn last_stamped_at(&self) -> DateTime<Utc> {
        [
            self.assigned_at,
            self.picked_up_at,
            self.in_transit_at,
            self.delivered_at,
            self.cancelled_at,
        ]
        .into_iter()
        .flatten()
        .fold(self.created_at, DateTime::max)
    }

    /// Stamp the timestamp belonging to `status`. Never overwrites and never
    /// goes backwards relative to earlier stamps.
    pub fn stamp(&mut self, status: OrderStatus, now: DateTime<Utc>) {
        let at = now.max(self.last_stamped_at());
        let slot = match status {
            OrderStatus::Pending => return,
            OrderStatus::Assigned => &mut self.assigned_at,
            OrderStatus::PickedUp => &mut self.picked_up_at,
            OrderStatus::InTransit => &mut self.in_transit_at,
            OrderStatus::Delivered => &mut self.delivered_at,
            OrderStatus::Cancelled => &mut self.cancelled_at,
        };
        if slot.is_none() {
            *slot = Some(at);
        }
    }
}

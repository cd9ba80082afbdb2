use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{DeliveryOrder, OrderStatus};

/// What an observer wants to hear about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "order_id", rename_all = "snake_case")]
pub enum Interest {
    SingleOrder(Uuid),
    FleetWide,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LocationSample {
    pub driver_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Payload pushed to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEvent {
    Location {
        driver_id: Uuid,
        order_id: Option<Uuid>,
        lat: f64,
        lng: f64,
        recorded_at: DateTime<Utc>,
    },
    Status {
        order_id: Uuid,
        status: OrderStatus,
        driver_id: Option<Uuid>,
        at: DateTime<Utc>,
    },
    DriverUnreachable {
        order_id: Uuid,
        driver_id: Uuid,
        since: DateTime<Utc>,
    },
    DriverReachable {
        order_id: Uuid,
        driver_id: Uuid,
        at: DateTime<Utc>,
    },
}

impl TrackingEvent {
    /// Current status of an order, stamped with its latest lifecycle time.
    pub fn status(order: &DeliveryOrder) -> Self {
        TrackingEvent::Status {
            order_id: order.id,
            status: order.status,
            driver_id: order.driver_id,
            at: order.last_stamped_at(),
        }
    }

    pub fn location(sample: &LocationSample, order_id: Option<Uuid>) -> Self {
        TrackingEvent::Location {
            driver_id: sample.driver_id,
            order_id,
            lat: sample.lat,
            lng: sample.lng,
            recorded_at: sample.recorded_at,
        }
    }
}

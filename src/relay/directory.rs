//! Who is listening to what.
//!
//! Observers register an [`Interest`]; the directory keeps three indexes so a
//! location sample from driver `D` reaches its audience without scanning every
//! subscriber:
//! - fleet-wide subscribers (receive every sample)
//! - `driver -> order` for drivers currently serving an order
//! - `order -> subscribers` for single-order trackers
//!
//! The `driver -> order` index is a routing hint maintained by the dispatch
//! engine; the relay re-checks the order itself before delivering.

use std::collections::HashSet;

use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

use crate::models::tracking::{Interest, TrackingEvent};
use crate::observability::metrics::Metrics;

struct Subscriber {
    observer_id: String,
    interest: Interest,
    tx: mpsc::Sender<TrackingEvent>,
}

/// Returned by [`SubscriptionDirectory::subscribe`]; `receiver` is the
/// outbound push channel for this observer.
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub interest: Interest,
    pub receiver: mpsc::Receiver<TrackingEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Subscriber buffer full; the event was dropped.
    Dropped,
    /// Subscriber went away; the subscription was removed.
    Closed,
}

impl Delivery {
    fn as_str(self) -> &'static str {
        match self {
            Delivery::Sent => "sent",
            Delivery::Dropped => "dropped",
            Delivery::Closed => "closed",
        }
    }
}

pub struct SubscriptionDirectory {
    buffer_size: usize,
    subscribers: DashMap<Uuid, Subscriber>,
    order_watchers: DashMap<Uuid, HashSet<Uuid>>,
    fleet: DashSet<Uuid>,
    driver_orders: DashMap<Uuid, Uuid>,
    metrics: Metrics,
}

impl SubscriptionDirectory {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            subscribers: DashMap::new(),
            order_watchers: DashMap::new(),
            fleet: DashSet::new(),
            driver_orders: DashMap::new(),
            metrics,
        }
    }

    pub fn subscribe(&self, observer_id: &str, interest: Interest) -> SubscriptionHandle {
        let id = Uuid::new_v4();
        let (tx, receiver) = mpsc::channel(self.buffer_size);

        self.subscribers.insert(
            id,
            Subscriber {
                observer_id: observer_id.to_string(),
                interest,
                tx,
            },
        );
        match interest {
            Interest::SingleOrder(order_id) => {
                self.order_watchers.entry(order_id).or_default().insert(id);
            }
            Interest::FleetWide => {
                self.fleet.insert(id);
            }
        }

        self.metrics
            .active_subscriptions
            .with_label_values(&[interest_label(&interest)])
            .inc();
        debug!(subscription_id = %id, observer_id, ?interest, "subscribed");

        SubscriptionHandle {
            id,
            interest,
            receiver,
        }
    }

    /// Remove a subscription. Dropping the stored sender closes the observer's
    /// receiver once it has drained.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let Some((_, subscriber)) = self.subscribers.remove(&id) else {
            return false;
        };

        match subscriber.interest {
            Interest::SingleOrder(order_id) => {
                let now_empty = match self.order_watchers.get_mut(&order_id) {
                    Some(mut watchers) => {
                        watchers.remove(&id);
                        watchers.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.order_watchers
                        .remove_if(&order_id, |_, watchers| watchers.is_empty());
                }
            }
            Interest::FleetWide => {
                self.fleet.remove(&id);
            }
        }

        self.metrics
            .active_subscriptions
            .with_label_values(&[interest_label(&subscriber.interest)])
            .dec();
        debug!(
            subscription_id = %id,
            observer_id = %subscriber.observer_id,
            "unsubscribed"
        );
        true
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn bind_driver(&self, driver_id: Uuid, order_id: Uuid) {
        self.driver_orders.insert(driver_id, order_id);
    }

    /// Drop the driver's routing entry if it still points at `order_id`.
    pub fn unbind_driver(&self, driver_id: Uuid, order_id: Uuid) {
        self.driver_orders
            .remove_if(&driver_id, |_, bound| *bound == order_id);
    }

    pub fn order_for_driver(&self, driver_id: Uuid) -> Option<Uuid> {
        self.driver_orders.get(&driver_id).map(|entry| *entry.value())
    }

    pub fn fleet_subscribers(&self) -> Vec<Uuid> {
        self.fleet.iter().map(|id| *id).collect()
    }

    pub fn order_subscribers(&self, order_id: Uuid) -> Vec<Uuid> {
        self.order_watchers
            .get(&order_id)
            .map(|watchers| watchers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Push an event about `order_id` to its trackers and to fleet observers.
    pub fn publish_order_event(&self, order_id: Uuid, event: &TrackingEvent) -> usize {
        self.order_subscribers(order_id)
            .into_iter()
            .chain(self.fleet_subscribers())
            .filter(|id| self.send(*id, event.clone()) == Delivery::Sent)
            .count()
    }

    /// Non-blocking send to one subscriber. A full buffer drops the event; a
    /// closed channel removes the subscription.
    pub fn send(&self, id: Uuid, event: TrackingEvent) -> Delivery {
        let result = match self.subscribers.get(&id) {
            Some(subscriber) => subscriber.tx.try_send(event),
            None => return Delivery::Closed,
        };

        let delivery = match result {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => {
                self.unsubscribe(id);
                Delivery::Closed
            }
        };

        self.metrics
            .fanout_events_total
            .with_label_values(&[delivery.as_str()])
            .inc();
        delivery
    }
}

fn interest_label(interest: &Interest) -> &'static str {
    match interest {
        Interest::SingleOrder(_) => "single_order",
        Interest::FleetWide => "fleet_wide",
    }
}

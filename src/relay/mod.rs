pub mod directory;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::validate_point;
use crate::models::tracking::{Interest, LocationSample, TrackingEvent};
use crate::relay::directory::{Delivery, SubscriptionHandle};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationOutcome {
    Accepted,
    /// Not newer than the stored sample; ignored.
    Stale,
}

impl LocationOutcome {
    pub fn is_accepted(self) -> bool {
        self == LocationOutcome::Accepted
    }
}

/// Ingest one location ping from a driver's client.
///
/// The registry update and the hand-off to the fan-out queue happen under the
/// driver's entry lock; the hand-off never waits, so a slow subscriber cannot
/// hold up the next ping.
pub fn report_location(
    state: &AppState,
    driver_id: Uuid,
    lat: f64,
    lng: f64,
    recorded_at: DateTime<Utc>,
) -> Result<LocationOutcome, AppError> {
    validate_point(lat, lng)?;

    let now = Utc::now();
    let max_skew = Duration::from_std(state.config.max_clock_skew)
        .map_err(|err| AppError::Internal(format!("invalid clock skew: {err}")))?;
    if recorded_at > now + max_skew {
        state
            .metrics
            .location_reports_total
            .with_label_values(&["rejected"])
            .inc();
        return Err(AppError::BadRequest(format!(
            "sample recorded_at {recorded_at} is ahead of server time"
        )));
    }

    let sample = LocationSample {
        driver_id,
        lat,
        lng,
        recorded_at,
    };

    match state
        .drivers
        .update_location(&sample, now, |_| enqueue_sample(state, sample))
    {
        Ok(_) => {
            state
                .metrics
                .location_reports_total
                .with_label_values(&["accepted"])
                .inc();
            Ok(LocationOutcome::Accepted)
        }
        Err(AppError::StaleLocation) => {
            state
                .metrics
                .location_reports_total
                .with_label_values(&["stale"])
                .inc();
            debug!(driver_id = %driver_id, recorded_at = %recorded_at, "stale location ignored");
            Ok(LocationOutcome::Stale)
        }
        Err(err) => {
            state
                .metrics
                .location_reports_total
                .with_label_values(&["rejected"])
                .inc();
            Err(err)
        }
    }
}

/// Subscribe to one order and queue its current status as the first event.
///
/// The subscription exists before the snapshot is taken, and the snapshot is
/// sent while the order entry is held, so every later transition is queued
/// behind it and nothing committed in between is missed.
pub fn watch_order(
    state: &AppState,
    observer_id: &str,
    order_id: Uuid,
) -> Result<SubscriptionHandle, AppError> {
    let handle = state
        .directory
        .subscribe(observer_id, Interest::SingleOrder(order_id));

    let snapshot = state.orders.with_order(order_id, |order| {
        state.directory.send(handle.id, TrackingEvent::status(order))
    });
    if let Err(err) = snapshot {
        state.directory.unsubscribe(handle.id);
        return Err(err);
    }
    Ok(handle)
}

fn enqueue_sample(state: &AppState, sample: LocationSample) {
    state.metrics.location_queue_depth.inc();
    let result = state.location_tx.try_send(sample);
    if result.is_err() {
        state.metrics.location_queue_depth.dec();
    }

    match result {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            state
                .metrics
                .fanout_events_total
                .with_label_values(&["queue_full"])
                .inc();
            warn!(driver_id = %sample.driver_id, "location queue full; sample not fanned out");
        }
        Err(TrySendError::Closed(_)) => {
            warn!(driver_id = %sample.driver_id, "location queue closed");
        }
    }
}

pub async fn run_fanout(state: Arc<AppState>, mut location_rx: mpsc::Receiver<LocationSample>) {
    info!("location fan-out started");

    while let Some(sample) = location_rx.recv().await {
        state.metrics.location_queue_depth.dec();
        fan_out(&state, &sample);
    }

    warn!("location fan-out stopped: queue channel closed");
}

/// Deliver one accepted sample. Fleet observers always get it; trackers of the
/// driver's order get it only while that order is still served by this driver
/// and is in a trackable status. Returns the number of subscribers reached.
pub fn fan_out(state: &AppState, sample: &LocationSample) -> usize {
    let tracked_order = state
        .directory
        .order_for_driver(sample.driver_id)
        .and_then(|order_id| state.orders.get(order_id).ok())
        .filter(|order| order.driver_id == Some(sample.driver_id) && order.status.is_trackable())
        .map(|order| order.id);

    let event = TrackingEvent::location(sample, tracked_order);

    let order_subscribers = tracked_order
        .map(|order_id| state.directory.order_subscribers(order_id))
        .unwrap_or_default();

    let delivered = state
        .directory
        .fleet_subscribers()
        .into_iter()
        .chain(order_subscribers)
        .filter(|id| state.directory.send(*id, event.clone()) == Delivery::Sent)
        .count();

    debug!(
        driver_id = %sample.driver_id,
        order_id = ?tracked_order,
        delivered,
        "location fanned out"
    );
    delivered
}

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::order::DeliveryOrder;
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

/// Toggle a driver's presence. A bound driver going offline flags its order
/// as driver-unreachable; coming back clears the flag. The binding itself is
/// never touched here.
pub fn set_presence(state: &AppState, driver_id: Uuid, online: bool) -> Result<Driver, AppError> {
    let now = Utc::now();
    let driver = state.drivers.set_online(driver_id, online, now)?;
    state
        .metrics
        .drivers_online
        .set(state.drivers.online_count() as i64);

    info!(driver_id = %driver_id, online, "driver presence changed");
    refresh_order_reachability(state, &driver, now);
    Ok(driver)
}

/// Take offline every driver that has been silent since before `cutoff`.
/// Returns the demoted drivers' ids.
pub fn sweep_silent_drivers(state: &AppState, cutoff: DateTime<Utc>) -> Vec<Uuid> {
    let now = Utc::now();
    let demoted: Vec<Driver> = state
        .drivers
        .silent_since(cutoff)
        .into_iter()
        .filter_map(|driver_id| state.drivers.demote_if_silent(driver_id, cutoff))
        .collect();

    for driver in &demoted {
        state.metrics.presence_demotions_total.inc();
        warn!(
            driver_id = %driver.id,
            last_seen_at = %driver.last_seen_at,
            active_order = ?driver.active_order,
            "driver demoted to offline after silence"
        );
        refresh_order_reachability(state, driver, now);
    }

    if !demoted.is_empty() {
        state
            .metrics
            .drivers_online
            .set(state.drivers.online_count() as i64);
    }
    demoted.into_iter().map(|driver| driver.id).collect()
}

pub async fn run_presence_sweeper(state: Arc<AppState>) {
    let grace = match Duration::from_std(state.config.presence_grace) {
        Ok(grace) => grace,
        Err(err) => {
            error!(error = %err, "invalid presence grace period; sweeper not started");
            return;
        }
    };

    let mut ticker = tokio::time::interval(state.config.presence_sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(grace_secs = grace.num_seconds(), "presence sweeper started");

    loop {
        ticker.tick().await;
        sweep_silent_drivers(&state, Utc::now() - grace);
    }
}

fn refresh_order_reachability(state: &AppState, driver: &Driver, now: DateTime<Utc>) {
    let Some(order_id) = driver.active_order else {
        return;
    };

    let is_online = || {
        state
            .drivers
            .get(driver.id)
            .map(|current| current.online)
            .unwrap_or(false)
    };

    let publish = |order: &DeliveryOrder| {
        let event = match order.driver_unreachable_since {
            Some(since) => TrackingEvent::DriverUnreachable {
                order_id: order.id,
                driver_id: driver.id,
                since,
            },
            None => TrackingEvent::DriverReachable {
                order_id: order.id,
                driver_id: driver.id,
                at: now,
            },
        };
        state.directory.publish_order_event(order.id, &event);
    };

    let changed = match state
        .orders
        .refresh_reachability(order_id, driver.id, now, is_online, publish)
    {
        Ok(changed) => changed,
        Err(err) => {
            warn!(order_id = %order_id, error = %err, "could not refresh driver reachability");
            return;
        }
    };

    match changed {
        Some(order) if order.driver_unreachable_since.is_some() => {
            warn!(order_id = %order.id, driver_id = %driver.id, "driver unreachable mid-delivery");
        }
        Some(order) => {
            info!(order_id = %order.id, driver_id = %driver.id, "driver reachable again");
        }
        None => {}
    }
}

use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::notify::{dispatch_best_effort, Notification, NotificationKind};
use crate::error::AppError;
use crate::models::order::{DeliveryOrder, OrderStatus};
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;
use crate::store::orders::{NewOrder, StatusPatch};

pub fn create_order(state: &AppState, spec: NewOrder) -> Result<DeliveryOrder, AppError> {
    let start = Instant::now();
    let result = state.orders.create_with(
        spec,
        |order| state.prescriptions.track(&order.prescription_ref),
        |order| publish_status(state, order),
    );
    record(state, "create", &result, start);

    let order = result?;
    info!(
        order_id = %order.id,
        patient_ref = %order.patient_ref,
        fee = %order.fee,
        "order created"
    );
    Ok(order)
}

/// Bind `driver_id` to a pending order.
///
/// The order entry is held while the driver is bound, and binding re-checks
/// assignability under the driver's own entry, so concurrent callers racing
/// for the same driver or the same order get exactly one winner. The relay's
/// routing entry is written before the order entry is released.
pub fn assign_driver(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> Result<DeliveryOrder, AppError> {
    let start = Instant::now();
    let result = state.drivers.get(driver_id).and_then(|_| {
        state.orders.transition(
            order_id,
            OrderStatus::Assigned,
            StatusPatch {
                driver_id: Some(driver_id),
                cancel_reason: None,
            },
            |_| state.drivers.bind(driver_id, order_id),
            |order| {
                state.directory.bind_driver(driver_id, order_id);
                publish_status(state, order);
            },
        )
    });
    record(state, "assign", &result, start);

    let order = result.inspect_err(|err| {
        warn!(order_id = %order_id, driver_id = %driver_id, error = %err, "assignment rejected");
    })?;

    info!(order_id = %order_id, driver_id = %driver_id, "driver assigned");
    dispatch_best_effort(
        state.notifier.clone(),
        state.metrics.clone(),
        Notification::for_order(NotificationKind::Assigned, &order),
    );
    Ok(order)
}

/// Move an assigned order forward. `delivered` also marks the linked
/// prescription fulfilled; both writes land together or not at all.
pub fn advance_status(
    state: &AppState,
    order_id: Uuid,
    target: OrderStatus,
) -> Result<DeliveryOrder, AppError> {
    match target {
        OrderStatus::Assigned => {
            return Err(AppError::BadRequest(
                "orders are assigned through the assign operation".to_string(),
            ));
        }
        OrderStatus::Cancelled => return cancel(state, order_id, None),
        _ => {}
    }

    let start = Instant::now();
    let result = if target == OrderStatus::Delivered {
        state.orders.transition(
            order_id,
            target,
            StatusPatch::default(),
            |next| complete_delivery(state, next),
            |order| {
                if let Some(driver_id) = order.driver_id {
                    state.directory.unbind_driver(driver_id, order.id);
                }
                publish_status(state, order);
            },
        )
    } else {
        state.orders.transition(
            order_id,
            target,
            StatusPatch::default(),
            |_| Ok(()),
            |order| publish_status(state, order),
        )
    };
    record(state, target.as_str(), &result, start);

    let order = result.inspect_err(|err| {
        warn!(order_id = %order_id, target = %target, error = %err, "status change rejected");
    })?;

    info!(order_id = %order_id, status = %order.status, "order status advanced");
    if target == OrderStatus::Delivered {
        dispatch_best_effort(
            state.notifier.clone(),
            state.metrics.clone(),
            Notification::for_order(NotificationKind::Delivered, &order),
        );
    }
    Ok(order)
}

/// Cancel a pending, assigned or picked-up order and free its driver.
pub fn cancel(
    state: &AppState,
    order_id: Uuid,
    reason: Option<String>,
) -> Result<DeliveryOrder, AppError> {
    let reason = reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());

    let start = Instant::now();
    let result = state.orders.transition(
        order_id,
        OrderStatus::Cancelled,
        StatusPatch {
            driver_id: None,
            cancel_reason: reason,
        },
        |next| {
            if let Some(driver_id) = next.cancelled_driver_id {
                state.drivers.release(driver_id, next.id);
            }
            Ok(())
        },
        |order| {
            if let Some(driver_id) = order.cancelled_driver_id {
                state.directory.unbind_driver(driver_id, order.id);
            }
            publish_status(state, order);
        },
    );
    record(state, "cancel", &result, start);

    let order = result.inspect_err(|err| {
        warn!(order_id = %order_id, error = %err, "cancellation rejected");
    })?;

    info!(
        order_id = %order_id,
        reason = order.cancel_reason.as_deref().unwrap_or(""),
        "order cancelled"
    );
    Ok(order)
}

/// Second half of the delivered unit of work: prepare and commit the
/// prescription write, then release the driver. Runs while the order is locked;
/// the order is only replaced after this returns `Ok`.
fn complete_delivery(state: &AppState, next: &DeliveryOrder) -> Result<(), AppError> {
    let ledger = &state.prescriptions;
    let prepared = ledger
        .prepare_fulfillment(&next.prescription_ref, next.id)
        .map_err(into_consistency_failure)?;

    let delivered_at = next.delivered_at.unwrap_or_else(Utc::now);
    if let Err(err) = ledger.commit_fulfillment(&prepared, delivered_at) {
        ledger.abort_fulfillment(&prepared);
        return Err(into_consistency_failure(err));
    }

    if let Some(driver_id) = next.driver_id {
        state.drivers.release(driver_id, next.id);
    }
    Ok(())
}

fn into_consistency_failure(err: AppError) -> AppError {
    match err {
        AppError::ConsistencyFailure(_) => err,
        other => AppError::ConsistencyFailure(format!("prescription update failed: {other}")),
    }
}

fn publish_status(state: &AppState, order: &DeliveryOrder) {
    state
        .directory
        .publish_order_event(order.id, &TrackingEvent::status(order));
}

fn record(state: &AppState, operation: &str, result: &Result<DeliveryOrder, AppError>, start: Instant) {
    let outcome = match result {
        Ok(_) => "success",
        Err(err) => err.kind(),
    };
    state
        .metrics
        .transitions_total
        .with_label_values(&[operation, outcome])
        .inc();
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{advance_status, assign_driver, cancel, create_order};
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::order::{Money, OrderStatus};
    use crate::state::AppState;
    use crate::store::drivers::NewDriver;
    use crate::store::orders::NewOrder;

    fn setup() -> AppState {
        AppState::new(Config::default()).0
    }

    fn order(state: &AppState) -> uuid::Uuid {
        create_order(
            state,
            NewOrder {
                prescription_ref: "rx-9".to_string(),
                patient_ref: "p-9".to_string(),
                pharmacy_ref: Some("ph-1".to_string()),
                delivery_address: "4 Allen Ave".to_string(),
                delivery_phone: "+2348011111".to_string(),
                notes: None,
                pickup: None,
                fee: Money(2000),
            },
        )
        .unwrap()
        .id
    }

    fn online_driver(state: &AppState) -> uuid::Uuid {
        let driver = state
            .drivers
            .register(NewDriver {
                display_name: "Tunde".to_string(),
                vehicle_plate: "KJA-42".to_string(),
            })
            .unwrap();
        state.drivers.set_online(driver.id, true, Utc::now()).unwrap();
        driver.id
    }

    #[test]
    fn assigned_cannot_be_reached_through_advance() {
        let state = setup();
        let order_id = order(&state);

        let err = advance_status(&state, order_id, OrderStatus::Assigned).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn unknown_driver_is_not_found() {
        let state = setup();
        let order_id = order(&state);

        let err = assign_driver(&state, order_id, uuid::Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(state.orders.get(order_id).unwrap().status, OrderStatus::Pending);
    }

    #[test]
    fn cancelling_assigned_order_frees_driver() {
        let state = setup();
        let order_id = order(&state);
        let driver_id = online_driver(&state);

        assign_driver(&state, order_id, driver_id).unwrap();
        let cancelled = cancel(&state, order_id, Some("  patient unavailable ".to_string())).unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.driver_id.is_none());
        assert_eq!(cancelled.cancelled_driver_id, Some(driver_id));
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("patient unavailable"));
        assert!(state.drivers.is_assignable(driver_id).unwrap());
        assert_eq!(state.directory.order_for_driver(driver_id), None);
    }

    #[test]
    fn advance_to_cancelled_delegates_to_cancel() {
        let state = setup();
        let order_id = order(&state);

        let cancelled = advance_status(&state, order_id, OrderStatus::Cancelled).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancel_reason.is_none());
    }
}

use crate::error::AppError;
use crate::models::order::OrderStatus;

/// The order lifecycle:
///
/// ```text
/// pending -> assigned -> picked_up -> in_transit -> delivered
///    \           \            \
///     +-----------+------------+--> cancelled
/// ```
pub fn is_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::{Assigned, Cancelled, Delivered, InTransit, Pending, PickedUp};

    matches!(
        (from, to),
        (Pending, Assigned)
            | (Assigned, PickedUp)
            | (PickedUp, InTransit)
            | (InTransit, Delivered)
            | (Pending | Assigned | PickedUp, Cancelled)
    )
}

pub fn ensure_allowed(from: OrderStatus, to: OrderStatus) -> Result<(), AppError> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(AppError::IllegalTransition { from, to })
    }
}

pub fn is_cancellable(status: OrderStatus) -> bool {
    is_allowed(status, OrderStatus::Cancelled)
}

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::engine::transitions::ensure_allowed;
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::order::{DeliveryOrder, Money, OrderStatus};

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub prescription_ref: String,
    pub patient_ref: String,
    pub pharmacy_ref: Option<String>,
    pub delivery_address: String,
    pub delivery_phone: String,
    pub notes: Option<String>,
    pub pickup: Option<GeoPoint>,
    pub fee: Money,
}

/// Field changes that accompany a status change.
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    pub driver_id: Option<Uuid>,
    pub cancel_reason: Option<String>,
}

/// Delivery orders keyed by id, with a secondary index by status.
///
/// Every mutation happens while the order's map entry is held, so readers see
/// either the previous or the next version of an order, never a mix.
#[derive(Default)]
pub struct OrderStore {
    orders: DashMap<Uuid, DeliveryOrder>,
    by_status: DashMap<OrderStatus, HashSet<Uuid>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, spec: NewOrder) -> Result<DeliveryOrder, AppError> {
        self.create_with(spec, |_| Ok(()), |_| {})
    }

    /// Validate and insert a new order. `effects` runs after validation and
    /// before the insert; if it fails nothing is stored. `on_commit` runs once
    /// the order is visible, while its entry is still held.
    pub fn create_with<F, C>(
        &self,
        spec: NewOrder,
        effects: F,
        on_commit: C,
    ) -> Result<DeliveryOrder, AppError>
    where
        F: FnOnce(&DeliveryOrder) -> Result<(), AppError>,
        C: FnOnce(&DeliveryOrder),
    {
        validate_new_order(&spec)?;

        let order = DeliveryOrder {
            id: Uuid::new_v4(),
            prescription_ref: spec.prescription_ref.trim().to_string(),
            patient_ref: spec.patient_ref.trim().to_string(),
            pharmacy_ref: spec.pharmacy_ref,
            delivery_address: spec.delivery_address,
            delivery_phone: spec.delivery_phone,
            notes: spec.notes,
            pickup: spec.pickup,
            status: OrderStatus::Pending,
            driver_id: None,
            fee: spec.fee,
            created_at: Utc::now(),
            assigned_at: None,
            picked_up_at: None,
            in_transit_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancel_reason: None,
            cancelled_driver_id: None,
            driver_unreachable_since: None,
        };

        effects(&order)?;

        let entry = self.orders.entry(order.id).or_insert(order.clone());
        self.by_status
            .entry(OrderStatus::Pending)
            .or_default()
            .insert(order.id);
        on_commit(&order);
        drop(entry);

        Ok(order)
    }

    /// Run `f` against the current version of an order while holding its
    /// entry, so no transition can commit in between.
    pub fn with_order<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&DeliveryOrder) -> R,
    ) -> Result<R, AppError> {
        self.orders
            .get(&id)
            .map(|entry| f(entry.value()))
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    pub fn get(&self, id: Uuid) -> Result<DeliveryOrder, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn list_for_driver(&self, driver_id: Uuid) -> Vec<DeliveryOrder> {
        self.collect_sorted(|order| order.driver_id == Some(driver_id))
    }

    pub fn list_for_patient(&self, patient_ref: &str) -> Vec<DeliveryOrder> {
        self.collect_sorted(|order| order.patient_ref == patient_ref)
    }

    pub fn list(&self) -> Vec<DeliveryOrder> {
        self.collect_sorted(|_| true)
    }

    pub fn list_by_status(&self, status: OrderStatus) -> Vec<DeliveryOrder> {
        let ids: Vec<Uuid> = self
            .by_status
            .get(&status)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        let mut orders: Vec<DeliveryOrder> = ids
            .into_iter()
            .filter_map(|id| self.orders.get(&id).map(|entry| entry.value().clone()))
            .filter(|order| order.status == status)
            .collect();
        orders.sort_by_key(|order| order.created_at);
        orders
    }

    /// Plain status update: checks the transition table and applies `patch`.
    pub fn update_status(
        &self,
        id: Uuid,
        target: OrderStatus,
        patch: StatusPatch,
    ) -> Result<DeliveryOrder, AppError> {
        self.transition(id, target, patch, |_| Ok(()), |_| {})
    }

    /// Stage a status change on a copy of the order, run `effects` against the
    /// staged copy, and publish it only if `effects` succeeded.
    ///
    /// The order entry stays locked for the whole call, so `effects` may write
    /// to other stores as part of the same unit of work, and `on_commit` sees
    /// commits of one order in the order they happened. Lock order is always
    /// orders first, then whatever the closures touch.
    pub fn transition<F, C>(
        &self,
        id: Uuid,
        target: OrderStatus,
        patch: StatusPatch,
        effects: F,
        on_commit: C,
    ) -> Result<DeliveryOrder, AppError>
    where
        F: FnOnce(&DeliveryOrder) -> Result<(), AppError>,
        C: FnOnce(&DeliveryOrder),
    {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        let from = entry.status;
        ensure_allowed(from, target)?;

        let mut next = entry.value().clone();
        next.status = target;
        next.stamp(target, Utc::now());
        if let Some(driver_id) = patch.driver_id {
            next.driver_id = Some(driver_id);
        }
        if target == OrderStatus::Cancelled {
            next.cancelled_driver_id = next.driver_id.take();
            next.cancel_reason = patch.cancel_reason;
        }
        if target.is_terminal() {
            next.driver_unreachable_since = None;
        }
        check_invariants(&next)?;

        effects(&next)?;

        *entry = next.clone();
        if let Some(mut ids) = self.by_status.get_mut(&from) {
            ids.remove(&id);
        }
        self.by_status.entry(target).or_default().insert(id);
        on_commit(&next);
        drop(entry);

        Ok(next)
    }

    /// Re-derive the driver-unreachable flag of an order from the driver's
    /// current presence. If the flag changed, `on_change` runs with the entry
    /// still held and the order is returned.
    pub fn refresh_reachability<F, C>(
        &self,
        id: Uuid,
        driver_id: Uuid,
        now: DateTime<Utc>,
        is_online: F,
        on_change: C,
    ) -> Result<Option<DeliveryOrder>, AppError>
    where
        F: FnOnce() -> bool,
        C: FnOnce(&DeliveryOrder),
    {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        if entry.driver_id != Some(driver_id) || entry.status.is_terminal() {
            return Ok(None);
        }

        let online = is_online();
        let changed = match (online, entry.driver_unreachable_since) {
            (false, None) => {
                entry.driver_unreachable_since = Some(now);
                true
            }
            (true, Some(_)) => {
                entry.driver_unreachable_since = None;
                true
            }
            _ => false,
        };

        if !changed {
            return Ok(None);
        }
        on_change(entry.value());
        Ok(Some(entry.value().clone()))
    }

    fn collect_sorted<P>(&self, predicate: P) -> Vec<DeliveryOrder>
    where
        P: Fn(&DeliveryOrder) -> bool,
    {
        let mut orders: Vec<DeliveryOrder> = self
            .orders
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        orders
    }
}

fn validate_new_order(spec: &NewOrder) -> Result<(), AppError> {
    if spec.prescription_ref.trim().is_empty() {
        return Err(AppError::BadRequest(
            "prescription_ref cannot be empty".to_string(),
        ));
    }
    if spec.patient_ref.trim().is_empty() {
        return Err(AppError::BadRequest("patient_ref cannot be empty".to_string()));
    }
    if spec.delivery_address.trim().is_empty() {
        return Err(AppError::BadRequest(
            "delivery_address cannot be empty".to_string(),
        ));
    }
    if spec.delivery_phone.trim().is_empty() {
        return Err(AppError::BadRequest(
            "delivery_phone cannot be empty".to_string(),
        ));
    }
    if spec.fee.minor_units() < 0 {
        return Err(AppError::BadRequest("fee must be >= 0".to_string()));
    }
    if let Some(pickup) = &spec.pickup {
        crate::geo::validate_point(pickup.lat, pickup.lng)?;
    }
    Ok(())
}

fn check_invariants(order: &DeliveryOrder) -> Result<(), AppError> {
    if order.driver_id.is_some() != order.status.requires_driver() {
        return Err(AppError::Internal(format!(
            "order {} would be {} with driver {:?}",
            order.id, order.status, order.driver_id
        )));
    }
    Ok(())
}

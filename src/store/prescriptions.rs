use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::prescription::{FulfillmentStatus, PreparedFulfillment, PrescriptionRecord};

/// Fulfillment status of the prescriptions linked to delivery orders.
///
/// Writes are two-phase: `prepare_fulfillment` reserves the record for one
/// order without changing what readers see, then `commit_fulfillment` or
/// `abort_fulfillment` settles it.
pub trait PrescriptionLedger: Send + Sync {
    /// Start tracking a prescription reference. Idempotent.
    fn track(&self, reference: &str) -> Result<(), AppError>;

    fn get(&self, reference: &str) -> Option<PrescriptionRecord>;

    fn prepare_fulfillment(
        &self,
        reference: &str,
        order_id: Uuid,
    ) -> Result<PreparedFulfillment, AppError>;

    fn commit_fulfillment(
        &self,
        prepared: &PreparedFulfillment,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    fn abort_fulfillment(&self, prepared: &PreparedFulfillment);
}

struct Slot {
    record: PrescriptionRecord,
    reserved_by: Option<Uuid>,
}

#[derive(Default)]
pub struct InMemoryPrescriptionLedger {
    records: DashMap<String, Slot>,
}

impl InMemoryPrescriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reserved(&self, reference: &str) -> bool {
        self.records
            .get(reference)
            .is_some_and(|slot| slot.reserved_by.is_some())
    }
}

impl PrescriptionLedger for InMemoryPrescriptionLedger {
    fn track(&self, reference: &str) -> Result<(), AppError> {
        if reference.trim().is_empty() {
            return Err(AppError::BadRequest(
                "prescription reference cannot be empty".to_string(),
            ));
        }

        self.records.entry(reference.to_string()).or_insert_with(|| Slot {
            record: PrescriptionRecord {
                reference: reference.to_string(),
                status: FulfillmentStatus::Pending,
                fulfilled_by: None,
                fulfilled_at: None,
            },
            reserved_by: None,
        });
        Ok(())
    }

    fn get(&self, reference: &str) -> Option<PrescriptionRecord> {
        self.records.get(reference).map(|slot| slot.record.clone())
    }

    fn prepare_fulfillment(
        &self,
        reference: &str,
        order_id: Uuid,
    ) -> Result<PreparedFulfillment, AppError> {
        let mut slot = self.records.get_mut(reference).ok_or_else(|| {
            AppError::ConsistencyFailure(format!("prescription {reference} is not tracked"))
        })?;

        match slot.reserved_by {
            Some(holder) if holder != order_id => Err(AppError::ConsistencyFailure(format!(
                "prescription {reference} is being updated by order {holder}"
            ))),
            _ => {
                slot.reserved_by = Some(order_id);
                Ok(PreparedFulfillment {
                    reference: reference.to_string(),
                    order_id,
                })
            }
        }
    }

    fn commit_fulfillment(
        &self,
        prepared: &PreparedFulfillment,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut slot = self.records.get_mut(&prepared.reference).ok_or_else(|| {
            AppError::ConsistencyFailure(format!(
                "prescription {} disappeared during commit",
                prepared.reference
            ))
        })?;

        if slot.reserved_by != Some(prepared.order_id) {
            return Err(AppError::ConsistencyFailure(format!(
                "prescription {} is not reserved by order {}",
                prepared.reference, prepared.order_id
            )));
        }

        slot.reserved_by = None;
        if slot.record.status == FulfillmentStatus::Pending {
            slot.record.status = FulfillmentStatus::Fulfilled;
            slot.record.fulfilled_by = Some(prepared.order_id);
            slot.record.fulfilled_at = Some(at);
        }
        Ok(())
    }

    fn abort_fulfillment(&self, prepared: &PreparedFulfillment) {
        if let Some(mut slot) = self.records.get_mut(&prepared.reference) {
            if slot.reserved_by == Some(prepared.order_id) {
                slot.reserved_by = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{InMemoryPrescriptionLedger, PrescriptionLedger};
    use crate::error::AppError;
    use crate::models::prescription::FulfillmentStatus;

    #[test]
    fn prepare_is_invisible_until_commit() {
        let ledger = InMemoryPrescriptionLedger::new();
        ledger.track("rx-1").unwrap();
        let order = Uuid::new_v4();

        let prepared = ledger.prepare_fulfillment("rx-1", order).unwrap();
        assert_eq!(ledger.get("rx-1").unwrap().status, FulfillmentStatus::Pending);
        assert!(ledger.is_reserved("rx-1"));

        ledger.commit_fulfillment(&prepared, Utc::now()).unwrap();
        let record = ledger.get("rx-1").unwrap();
        assert_eq!(record.status, FulfillmentStatus::Fulfilled);
        assert_eq!(record.fulfilled_by, Some(order));
        assert!(!ledger.is_reserved("rx-1"));
    }

    #[test]
    fn abort_releases_reservation() {
        let ledger = InMemoryPrescriptionLedger::new();
        ledger.track("rx-1").unwrap();

        let prepared = ledger.prepare_fulfillment("rx-1", Uuid::new_v4()).unwrap();
        ledger.abort_fulfillment(&prepared);

        assert!(!ledger.is_reserved("rx-1"));
        assert_eq!(ledger.get("rx-1").unwrap().status, FulfillmentStatus::Pending);
        assert!(matches!(
            ledger.commit_fulfillment(&prepared, Utc::now()),
            Err(AppError::ConsistencyFailure(_))
        ));
    }

    #[test]
    fn competing_reservation_is_refused() {
        let ledger = InMemoryPrescriptionLedger::new();
        ledger.track("rx-1").unwrap();

        ledger.prepare_fulfillment("rx-1", Uuid::new_v4()).unwrap();
        assert!(matches!(
            ledger.prepare_fulfillment("rx-1", Uuid::new_v4()),
            Err(AppError::ConsistencyFailure(_))
        ));
    }

    #[test]
    fn untracked_prescription_cannot_be_prepared() {
        let ledger = InMemoryPrescriptionLedger::new();
        assert!(matches!(
            ledger.prepare_fulfillment("rx-missing", Uuid::new_v4()),
            Err(AppError::ConsistencyFailure(_))
        ));
    }
}

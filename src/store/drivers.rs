use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, Location};
use crate::models::tracking::LocationSample;

#[derive(Debug, Clone)]
pub struct NewDriver {
    pub display_name: String,
    pub vehicle_plate: String,
}

/// Drivers keyed by id: presence, last known location and order binding.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: DashMap<Uuid, Driver>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, spec: NewDriver) -> Result<Driver, AppError> {
        if spec.display_name.trim().is_empty() {
            return Err(AppError::BadRequest(
                "display_name cannot be empty".to_string(),
            ));
        }
        if spec.vehicle_plate.trim().is_empty() {
            return Err(AppError::BadRequest(
                "vehicle_plate cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let driver = Driver {
            id: Uuid::new_v4(),
            display_name: spec.display_name.trim().to_string(),
            vehicle_plate: spec.vehicle_plate.trim().to_uppercase(),
            online: false,
            location: None,
            active_order: None,
            last_seen_at: now,
            created_at: now,
        };

        self.drivers.insert(driver.id, driver.clone());
        Ok(driver)
    }

    pub fn get(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }

    pub fn list(&self) -> Vec<Driver> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by_key(|driver| driver.created_at);
        drivers
    }

    pub fn online_drivers(&self) -> Vec<Driver> {
        self.list().into_iter().filter(|driver| driver.online).collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.drivers.iter().filter(|entry| entry.online).count()
    }

    pub fn is_assignable(&self, id: Uuid) -> Result<bool, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.is_assignable())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }

    pub fn set_online(&self, id: Uuid, online: bool, now: DateTime<Utc>) -> Result<Driver, AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        driver.online = online;
        driver.last_seen_at = driver.last_seen_at.max(now);
        Ok(driver.clone())
    }

    /// Compare-and-set the driver's location.
    ///
    /// `on_accept` runs while the driver entry is still held, so anything it
    /// enqueues is ordered the same way samples were accepted.
    pub fn update_location<F>(
        &self,
        sample: &LocationSample,
        now: DateTime<Utc>,
        on_accept: F,
    ) -> Result<Driver, AppError>
    where
        F: FnOnce(&Driver),
    {
        let mut driver = self
            .drivers
            .get_mut(&sample.driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {} not found", sample.driver_id)))?;

        if !driver.online {
            return Err(AppError::DriverUnavailable(format!(
                "driver {} is offline",
                sample.driver_id
            )));
        }

        if let Some(current) = &driver.location {
            if sample.recorded_at <= current.recorded_at {
                return Err(AppError::StaleLocation);
            }
        }

        driver.location = Some(Location {
            lat: sample.lat,
            lng: sample.lng,
            recorded_at: sample.recorded_at,
        });
        driver.last_seen_at = driver.last_seen_at.max(now);

        on_accept(&driver);
        Ok(driver.clone())
    }

    /// Bind a driver to an order. Fails if the driver is offline or already busy.
    pub fn bind(&self, id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let mut driver = self
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

        if !driver.online {
            return Err(AppError::DriverUnavailable(format!("driver {id} is offline")));
        }
        if let Some(active) = driver.active_order {
            return Err(AppError::DriverUnavailable(format!(
                "driver {id} is already bound to order {active}"
            )));
        }

        driver.active_order = Some(order_id);
        Ok(())
    }

    /// Release the binding if it still points at `order_id`.
    pub fn release(&self, id: Uuid, order_id: Uuid) -> bool {
        match self.drivers.get_mut(&id) {
            Some(mut driver) if driver.active_order == Some(order_id) => {
                driver.active_order = None;
                true
            }
            _ => false,
        }
    }

    /// Online drivers whose last presence signal is older than `cutoff`.
    pub fn silent_since(&self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        self.drivers
            .iter()
            .filter(|entry| entry.online && entry.last_seen_at < cutoff)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Take a driver offline if it is still silent past `cutoff`. The order
    /// binding is left alone.
    pub fn demote_if_silent(&self, id: Uuid, cutoff: DateTime<Utc>) -> Option<Driver> {
        let mut driver = self.drivers.get_mut(&id)?;
        if !driver.online || driver.last_seen_at >= cutoff {
            return None;
        }
        driver.online = false;
        Some(driver.clone())
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::driver::Driver;
use crate::models::order::DeliveryOrder;
use crate::state::AppState;

const DISTANCE_WEIGHT: f64 = 0.70;
const FRESHNESS_WEIGHT: f64 = 0.30;

/// Score used when the order has no pickup coordinates to measure against.
const NEUTRAL_DISTANCE_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub distance_score: f64,
    pub freshness_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub driver_id: Uuid,
    pub display_name: String,
    pub distance_km: Option<f64>,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
}

/// Assignable drivers for an order, best first. A suggestion for the
/// dispatcher only; nothing is assigned.
pub fn rank_candidates(state: &AppState, order_id: Uuid) -> Result<Vec<Candidate>, AppError> {
    let order = state.orders.get(order_id)?;
    let now = Utc::now();

    let mut candidates: Vec<Candidate> = state
        .drivers
        .online_drivers()
        .iter()
        .filter(|driver| driver.is_assignable())
        .map(|driver| compute_score(driver, &order, now))
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(candidates)
}

pub fn compute_score(driver: &Driver, order: &DeliveryOrder, now: DateTime<Utc>) -> Candidate {
    let distance_km = match (&driver.location, &order.pickup) {
        (Some(location), Some(pickup)) => Some(haversine_km(&location.point(), pickup)),
        _ => None,
    };

    let distance_score = match (distance_km, order.pickup.is_some()) {
        (Some(km), _) => distance_score(km),
        (None, false) => NEUTRAL_DISTANCE_SCORE,
        (None, true) => 0.0,
    };

    let breakdown = ScoreBreakdown {
        distance_score,
        freshness_score: freshness_score(driver, now),
    };

    Candidate {
        driver_id: driver.id,
        display_name: driver.display_name.clone(),
        distance_km,
        score: weighted_score(&breakdown),
        score_breakdown: breakdown,
    }
}

pub fn weighted_score(breakdown: &ScoreBreakdown) -> f64 {
    (breakdown.distance_score * DISTANCE_WEIGHT) + (breakdown.freshness_score * FRESHNESS_WEIGHT)
}

fn distance_score(distance_km: f64) -> f64 {
    1.0 / (1.0 + distance_km.max(0.0))
}

fn freshness_score(driver: &Driver, now: DateTime<Utc>) -> f64 {
    let Some(location) = &driver.location else {
        return 0.0;
    };
    let age_secs = (now - location.recorded_at).num_seconds().max(0) as f64;
    1.0 / (1.0 + age_secs / 60.0)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::compute_score;
    use crate::models::driver::{Driver, GeoPoint, Location};
    use crate::models::order::{DeliveryOrder, Money, OrderStatus};

    fn driver(lat: f64, lng: f64, age_secs: i64) -> Driver {
        let now = Utc::now();
        Driver {
            id: Uuid::new_v4(),
            display_name: "test-driver".to_string(),
            vehicle_plate: "ABC-1".to_string(),
            online: true,
            location: Some(Location {
                lat,
                lng,
                recorded_at: now - Duration::seconds(age_secs),
            }),
            active_order: None,
            last_seen_at: now,
            created_at: now,
        }
    }

    fn order(pickup: Option<GeoPoint>) -> DeliveryOrder {
        DeliveryOrder {
            id: Uuid::new_v4(),
            prescription_ref: "rx".to_string(),
            patient_ref: "p".to_string(),
            pharmacy_ref: None,
            delivery_address: "addr".to_string(),
            delivery_phone: "phone".to_string(),
            notes: None,
            pickup,
            status: OrderStatus::Pending,
            driver_id: None,
            fee: Money(0),
            created_at: Utc::now(),
            assigned_at: None,
            picked_up_at: None,
            in_transit_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancel_reason: None,
            cancelled_driver_id: None,
            driver_unreachable_since: None,
        }
    }

    #[test]
    fn closer_driver_scores_higher_when_equally_fresh() {
        let pharmacy = order(Some(GeoPoint {
            lat: 6.4541,
            lng: 3.3947,
        }));

        let near = driver(6.4550, 3.3950, 10);
        let far = driver(6.6000, 3.5000, 10);
        let now = Utc::now();

        assert!(compute_score(&near, &pharmacy, now).score > compute_score(&far, &pharmacy, now).score);
    }

    #[test]
    fn stale_position_is_penalized() {
        let pharmacy = order(Some(GeoPoint {
            lat: 6.4541,
            lng: 3.3947,
        }));
        let now = Utc::now();

        let fresh = compute_score(&driver(6.4550, 3.3950, 5), &pharmacy, now);
        let stale = compute_score(&driver(6.4550, 3.3950, 1800), &pharmacy, now);

        assert!(fresh.score_breakdown.freshness_score > stale.score_breakdown.freshness_score);
    }

    #[test]
    fn missing_pickup_uses_neutral_distance() {
        let candidate = compute_score(&driver(6.45, 3.39, 0), &order(None), Utc::now());
        assert!(candidate.distance_km.is_none());
        assert!((candidate.score_breakdown.distance_score - 0.5).abs() < f64::EPSILON);
    }
}

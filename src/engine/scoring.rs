//! Rider matching policies.
//!
//! The assignment protocol only needs "pick one of these idle riders for this
//! order"; which one is decided by a [`RiderSelector`] so the policy can change
//! without touching the compare-and-set logic in the engine.

use std::cmp::Ordering;

use uuid::Uuid;

use crate::config::AssignmentPolicy;
use crate::geo::haversine_km;
use crate::models::assignment::ScoreBreakdown;
use crate::models::order::Order;
use crate::models::rider::Rider;

const DISTANCE_WEIGHT: f64 = 0.60;
const RATING_WEIGHT: f64 = 0.30;
const EXPERIENCE_WEIGHT: f64 = 0.10;

/// Deliveries after which the experience component is half saturated.
const EXPERIENCE_HALF_POINT: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub rider_id: Uuid,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

pub trait RiderSelector: Send + Sync {
    fn name(&self) -> &'static str;

    /// `candidates` are already filtered to active riders without an order.
    fn select(&self, order: &Order, candidates: &[Rider]) -> Option<Selection>;
}

pub fn selector_for(policy: AssignmentPolicy) -> Box<dyn RiderSelector> {
    match policy {
        AssignmentPolicy::Weighted => Box::new(WeightedScore),
        AssignmentPolicy::Nearest => Box::new(NearestRider),
    }
}

/// Blends proximity to the pickup point with rating and experience.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedScore;

impl RiderSelector for WeightedScore {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn select(&self, order: &Order, candidates: &[Rider]) -> Option<Selection> {
        best(candidates.iter().map(|rider| {
            let breakdown = compute_breakdown(rider, order);
            Selection {
                rider_id: rider.id,
                score: weighted_score(&breakdown),
                breakdown,
            }
        }))
    }
}

/// Closest rider to the pickup point wins; riders without a position come last.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestRider;

impl RiderSelector for NearestRider {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn select(&self, order: &Order, candidates: &[Rider]) -> Option<Selection> {
        best(candidates.iter().map(|rider| {
            let breakdown = compute_breakdown(rider, order);
            Selection {
                rider_id: rider.id,
                score: breakdown.distance_score,
                breakdown,
            }
        }))
    }
}

pub fn compute_breakdown(rider: &Rider, order: &Order) -> ScoreBreakdown {
    let distance_score = rider
        .location
        .map(|position| distance_score(haversine_km(&position.point(), &order.pickup_point())))
        .unwrap_or(0.0);

    ScoreBreakdown {
        distance_score,
        rating_score: rating_score(rider.rating),
        experience_score: experience_score(rider.total_deliveries),
    }
}

pub fn weighted_score(breakdown: &ScoreBreakdown) -> f64 {
    (breakdown.distance_score * DISTANCE_WEIGHT)
        + (breakdown.rating_score * RATING_WEIGHT)
        + (breakdown.experience_score * EXPERIENCE_WEIGHT)
}

// Highest score wins; ties go to the lowest rider id so repeated runs agree.
fn best(selections: impl Iterator<Item = Selection>) -> Option<Selection> {
    selections.max_by(|a, b| match a.score.total_cmp(&b.score) {
        Ordering::Equal => b.rider_id.cmp(&a.rider_id),
        other => other,
    })
}

fn distance_score(distance_km: f64) -> f64 {
    1.0 / (1.0 + distance_km.max(0.0))
}

fn rating_score(rating: f64) -> f64 {
    (rating / 5.0).clamp(0.0, 1.0)
}

fn experience_score(total_deliveries: u32) -> f64 {
    let deliveries = f64::from(total_deliveries);
    deliveries / (deliveries + EXPERIENCE_HALF_POINT)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::TrackedPosition;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    #[default]
    Bike,
    Scooter,
    Car,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub vehicle_type: VehicleType,
    pub vehicle_number: Option<String>,
    pub is_active: bool,
    pub location: Option<TrackedPosition>,
    pub current_order: Option<Uuid>,
    pub rating: f64,
    pub total_deliveries: u32,
    pub created_at: DateTime<Utc>,
}

impl Rider {
    pub fn is_available(&self) -> bool {
        self.is_active && self.current_order.is_none()
    }

    pub fn summary(&self) -> RiderSummary {
        RiderSummary {
            id: self.id,
            name: self.name.clone(),
            phone: self.phone.clone(),
            vehicle_type: self.vehicle_type,
            rating: self.rating,
            location: self.location,
        }
    }
}

/// The part of a rider a customer is shown once the rider is on their order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderSummary {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle_type: VehicleType,
    pub rating: f64,
    pub location: Option<TrackedPosition>,
}

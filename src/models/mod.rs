pub mod assignment;
pub mod cart;
pub mod order;
pub mod rider;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Rejects NaN/infinite coordinates and values outside the WGS84 ranges.
    pub fn validated(lat: f64, lon: f64) -> Result<Self, AppError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(AppError::Validation(
                "coordinates must be finite numbers".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::Validation(format!(
                "latitude {lat} out of range [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(AppError::Validation(format!(
                "longitude {lon} out of range [-180, 180]"
            )));
        }

        Ok(Self { lat, lon })
    }

    pub fn validate(self) -> Result<Self, AppError> {
        Self::validated(self.lat, self.lon)
    }
}

/// A last-known position together with the time it was reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub lat: f64,
    pub lon: f64,
    pub updated_at: DateTime<Utc>,
}

impl TrackedPosition {
    pub fn at(point: GeoPoint, updated_at: DateTime<Utc>) -> Self {
        Self {
            lat: point.lat,
            lon: point.lon,
            updated_at,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GeoPoint;
    use crate::error::AppError;

    #[test]
    fn rejects_non_finite_coordinates() {
        for (lat, lon) in [(f64::NAN, 90.0), (23.8, f64::INFINITY), (f64::NEG_INFINITY, 0.0)] {
            let result = GeoPoint::validated(lat, lon);
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::validated(91.0, 0.0).is_err());
        assert!(GeoPoint::validated(0.0, -180.5).is_err());
    }

    #[test]
    fn accepts_boundary_coordinates() {
        let point = GeoPoint::validated(-90.0, 180.0).unwrap();
        assert_eq!(point.lat, -90.0);
        assert_eq!(point.lon, 180.0);
    }
}

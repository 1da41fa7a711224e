use crate::models::GeoPoint;
use crate::models::rider::VehicleType;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lon = (delta_lon / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lon * sin_lon;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Average city speed used for delivery estimates, in km/h.
pub fn average_speed_kmh(vehicle: VehicleType) -> f64 {
    match vehicle {
        VehicleType::Bike => 14.0,
        VehicleType::Scooter => 22.0,
        VehicleType::Car => 18.0,
    }
}

/// Whole minutes needed to cover `distance_km`, rounded up.
pub fn travel_minutes(distance_km: f64, vehicle: VehicleType) -> i64 {
    let hours = distance_km.max(0.0) / average_speed_kmh(vehicle);
    (hours * 60.0).ceil() as i64
}

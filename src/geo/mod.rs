use crate::models::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    // Rounding can push this a hair above 1.0 for antipodal points.
    let haversine = (sin_lat * sin_lat + phi1.cos() * phi2.cos() * sin_lng * sin_lng).clamp(0.0, 1.0);
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    distance(a.lat, a.lng, b.lat, b.lng)
}

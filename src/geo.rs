use crate::types::GeoFix;

/// Mean Earth radius used for every distance in the meter.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two fixes in kilometres (haversine).
///
/// Timestamps are ignored, so two fixes at the same coordinates are always 0 km apart.
pub fn haversine_km(a: &GeoFix, b: &GeoFix) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_KM * c
}

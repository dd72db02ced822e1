//! Geographic coordinates and great-circle distance.

use serde::{Deserialize, Serialize};

/// Mean Earth radius (km).
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Location {
    pub latitude: f32,
    pub longitude: f32,
}

impl Location {
    /// The "unset" location.
    pub const UNSET: Location = Location::new(0.0, 0.0);

    pub const fn new(latitude: f32, longitude: f32) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Both fields in range and not the all-zero placeholder.
    pub fn is_valid(&self) -> bool {
        let in_range = (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude);
        in_range && !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Haversine distance to `other` in kilometres.
    ///
    /// Evaluated in `f64` through `libm` so host and target builds agree.
    pub fn distance_km(&self, other: &Location) -> f32 {
        if self == other {
            return 0.0;
        }

        let lat1 = f64::from(self.latitude).to_radians();
        let lat2 = f64::from(other.latitude).to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (f64::from(other.longitude) - f64::from(self.longitude)).to_radians();

        let half_lat = libm::sin(d_lat / 2.0);
        let half_lon = libm::sin(d_lon / 2.0);
        let a = half_lat * half_lat + libm::cos(lat1) * libm::cos(lat2) * half_lon * half_lon;
        let c = 2.0 * libm::asin(libm::sqrt(a).min(1.0));

        (EARTH_RADIUS_KM * c).max(0.0) as f32
    }
}

use std::f64::consts::PI;

/// A position on or above an ellipsoid, in radians and meters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cartographic {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

impl Cartographic {
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    pub fn from_degrees(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude: longitude * PI / 180.0,
            latitude: latitude * PI / 180.0,
            height,
        }
    }
}

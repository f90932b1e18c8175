use glam::DVec3;

use crate::{Cartographic, EPSILON12};

/// A quadric surface centered at the origin, used to model the shape of the
/// globe. All distances are in meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipsoid {
    pub radii: DVec3,
    pub radii_squared: DVec3,
    pub one_over_radii: DVec3,
    pub one_over_radii_squared: DVec3,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        radii: DVec3::new(6378137.0, 6378137.0, 6356752.3142451793),
        radii_squared: DVec3::new(
            40680631590769.0,
            40680631590769.0,
            40408299984661.445,
        ),
        one_over_radii: DVec3::new(
            1.0 / 6378137.0,
            1.0 / 6378137.0,
            1.0 / 6356752.3142451793,
        ),
        one_over_radii_squared: DVec3::new(
            1.0 / 40680631590769.0,
            1.0 / 40680631590769.0,
            1.0 / 40408299984661.445,
        ),
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        let radii = DVec3::new(x, y, z);
        Self {
            radii,
            radii_squared: radii * radii,
            one_over_radii: 1.0 / radii,
            one_over_radii_squared: 1.0 / (radii * radii),
        }
    }

    pub fn maximum_radius(&self) -> f64 {
        self.radii.x.max(self.radii.y).max(self.radii.z)
    }

    pub fn geodetic_surface_normal(&self, position: DVec3) -> DVec3 {
        (position * self.one_over_radii_squared).normalize()
    }

    pub fn geodetic_surface_normal_cartographic(&self, cartographic: &Cartographic) -> DVec3 {
        let cos_latitude = cartographic.latitude.cos();
        DVec3::new(
            cos_latitude * cartographic.longitude.cos(),
            cos_latitude * cartographic.longitude.sin(),
            cartographic.latitude.sin(),
        )
    }

    pub fn cartographic_to_cartesian(&self, cartographic: &Cartographic) -> DVec3 {
        let n = self.geodetic_surface_normal_cartographic(cartographic);
        let mut k = self.radii_squared * n;
        let gamma = n.dot(k).sqrt();
        k /= gamma;
        k + n * cartographic.height
    }

    pub fn cartesian_to_cartographic(&self, cartesian: DVec3) -> Option<Cartographic> {
        let p = self.scale_to_geodetic_surface(cartesian)?;
        let n = self.geodetic_surface_normal(p);
        let h = cartesian - p;
        let longitude = n.y.atan2(n.x);
        let latitude = n.z.asin();
        let height = h.dot(cartesian).signum() * h.length();
        Some(Cartographic::new(longitude, latitude, height))
    }

    /// Scales `cartesian` along the geodetic surface normal so it lies on this
    /// ellipsoid. Returns `None` when the position is at the center.
    pub fn scale_to_geodetic_surface(&self, cartesian: DVec3) -> Option<DVec3> {
        let position_squared = cartesian * cartesian;
        let ratio_squared = position_squared * self.one_over_radii_squared;
        let squared_norm = ratio_squared.x + ratio_squared.y + ratio_squared.z;
        if squared_norm == 0.0 {
            return None;
        }
        let ratio = (1.0 / squared_norm).sqrt();
        let intersection = cartesian * ratio;

        if squared_norm < EPSILON12 {
            return Some(intersection);
        }

        // Newton iteration on the ellipsoid projection, as in the standard
        // geodetic scaling algorithm.
        let gradient = intersection * self.one_over_radii_squared * 2.0;
        let mut lambda = (1.0 - ratio) * cartesian.length() / (0.5 * gradient.length());

        loop {
            let multiplier = DVec3::new(
                1.0 / (1.0 + lambda * self.one_over_radii_squared.x),
                1.0 / (1.0 + lambda * self.one_over_radii_squared.y),
                1.0 / (1.0 + lambda * self.one_over_radii_squared.z),
            );
            let m2 = multiplier * multiplier;
            let m3 = m2 * multiplier;
            let func = position_squared.dot(m2 * self.one_over_radii_squared) - 1.0;
            if func.abs() < EPSILON12 {
                return Some(cartesian * multiplier);
            }
            let denominator = position_squared.dot(
                m3 * self.one_over_radii_squared * self.one_over_radii_squared,
            );
            let derivative = -2.0 * denominator;
            lambda -= func / derivative;
        }
    }
}

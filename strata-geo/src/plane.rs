use glam::{DVec3, DVec4};

/// A plane in Hessian normal form: `normal . p + distance = 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        debug_assert!((normal.length_squared() - 1.0).abs() < 1e-6);
        Self { normal, distance }
    }

    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Self {
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    pub fn from_vec4(v: &DVec4) -> Self {
        Self {
            normal: DVec3::new(v.x, v.y, v.z),
            distance: v.w,
        }
    }

    pub fn distance_to(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}

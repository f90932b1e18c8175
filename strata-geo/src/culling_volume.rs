use glam::DVec3;

use crate::{BoundingVolume, Ellipsoid, Intersect, Plane};

/// The volume a view can see, as a set of inward-facing planes.
#[derive(Clone, Debug, Default)]
pub struct CullingVolume {
    pub planes: Vec<Plane>,
}

impl CullingVolume {
    /// Builds the four side planes of a perspective frustum.
    pub fn from_perspective(
        position: DVec3,
        direction: DVec3,
        up: DVec3,
        fov_x: f64,
        fov_y: f64,
    ) -> Self {
        let h = (0.5 * fov_y).tan();
        let w = (0.5 * fov_x).tan();

        let right = direction.cross(up).normalize();
        let up = right.cross(direction).normalize();

        let near_center = position + direction;
        let mut planes = Vec::with_capacity(4);

        // Left
        let mut normal = (near_center - right * w - position).normalize();
        normal = normal.cross(up);
        planes.push(Plane::from_point_normal(position, normal.normalize()));

        // Right
        let mut normal = (near_center + right * w - position).normalize();
        normal = up.cross(normal);
        planes.push(Plane::from_point_normal(position, normal.normalize()));

        // Bottom
        let mut normal = (near_center - up * h - position).normalize();
        normal = right.cross(normal);
        planes.push(Plane::from_point_normal(position, normal.normalize()));

        // Top
        let mut normal = (near_center + up * h - position).normalize();
        normal = normal.cross(right);
        planes.push(Plane::from_point_normal(position, normal.normalize()));

        Self { planes }
    }

    pub fn visibility(&self, volume: &BoundingVolume, ellipsoid: &Ellipsoid) -> Intersect {
        let mut intersecting = false;
        for plane in &self.planes {
            match volume.intersect_plane(plane, ellipsoid) {
                Intersect::Outside => return Intersect::Outside,
                Intersect::Intersecting => intersecting = true,
                Intersect::Inside => {}
            }
        }
        if intersecting {
            Intersect::Intersecting
        } else {
            Intersect::Inside
        }
    }
}

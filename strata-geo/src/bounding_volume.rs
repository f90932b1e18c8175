use glam::{DMat3, DVec3};

use crate::{Cartographic, Ellipsoid, GlobeRectangle, OctreeTileId, Plane, QuadtreeTileId};

/// Result of testing a volume against a plane or culling volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intersect {
    Outside,
    Intersecting,
    Inside,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn intersect_plane(&self, plane: &Plane) -> Intersect {
        let distance = plane.distance_to(self.center);
        if distance < -self.radius {
            Intersect::Outside
        } else if distance < self.radius {
            Intersect::Intersecting
        } else {
            Intersect::Inside
        }
    }

    pub fn distance_squared_to(&self, point: DVec3) -> f64 {
        let d = (point - self.center).length() - self.radius;
        if d <= 0.0 {
            0.0
        } else {
            d * d
        }
    }
}

/// A box described by a center point and three half-axis vectors. The axes
/// are assumed to be mutually orthogonal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBoundingBox {
    pub center: DVec3,
    pub half_axes: DMat3,
}

impl OrientedBoundingBox {
    pub fn new(center: DVec3, half_axes: DMat3) -> Self {
        Self { center, half_axes }
    }

    pub fn intersect_plane(&self, plane: &Plane) -> Intersect {
        let normal = plane.normal;
        // Effective radius: sum of the projections of the half axes.
        let radius = normal.dot(self.half_axes.x_axis).abs()
            + normal.dot(self.half_axes.y_axis).abs()
            + normal.dot(self.half_axes.z_axis).abs();
        let distance = plane.distance_to(self.center);
        if distance <= -radius {
            Intersect::Outside
        } else if distance >= radius {
            Intersect::Inside
        } else {
            Intersect::Intersecting
        }
    }

    pub fn distance_squared_to(&self, point: DVec3) -> f64 {
        let offset = point - self.center;
        let mut distance_squared = 0.0;
        for axis in [
            self.half_axes.x_axis,
            self.half_axes.y_axis,
            self.half_axes.z_axis,
        ] {
            let half_length = axis.length();
            if half_length == 0.0 {
                continue;
            }
            let d = offset.dot(axis / half_length).abs() - half_length;
            if d > 0.0 {
                distance_squared += d * d;
            }
        }
        distance_squared
    }

    /// The child box for a quadtree subdivision of this box, splitting the x
    /// and y axes. Used by implicit tiling, where `tile_id` is absolute from
    /// the root box.
    pub fn quadtree_subdivision(&self, tile_id: &QuadtreeTileId) -> OrientedBoundingBox {
        let denominator = (1u64 << tile_id.level) as f64;
        let min = self.center - self.half_axes.x_axis - self.half_axes.y_axis;
        let x_dim = self.half_axes.x_axis * 2.0 / denominator;
        let y_dim = self.half_axes.y_axis * 2.0 / denominator;
        let child_min = min + x_dim * tile_id.x as f64 + y_dim * tile_id.y as f64;
        let center = child_min + x_dim * 0.5 + y_dim * 0.5;
        OrientedBoundingBox::new(
            center,
            DMat3::from_cols(x_dim * 0.5, y_dim * 0.5, self.half_axes.z_axis),
        )
    }

    /// The child box for an octree subdivision of this box.
    pub fn octree_subdivision(&self, tile_id: &OctreeTileId) -> OrientedBoundingBox {
        let denominator = (1u64 << tile_id.level) as f64;
        let min =
            self.center - self.half_axes.x_axis - self.half_axes.y_axis - self.half_axes.z_axis;
        let x_dim = self.half_axes.x_axis * 2.0 / denominator;
        let y_dim = self.half_axes.y_axis * 2.0 / denominator;
        let z_dim = self.half_axes.z_axis * 2.0 / denominator;
        let child_min =
            min + x_dim * tile_id.x as f64 + y_dim * tile_id.y as f64 + z_dim * tile_id.z as f64;
        let center = child_min + (x_dim + y_dim + z_dim) * 0.5;
        OrientedBoundingBox::new(
            center,
            DMat3::from_cols(x_dim * 0.5, y_dim * 0.5, z_dim * 0.5),
        )
    }
}

/// A region bounded by a globe rectangle and a height range above the
/// ellipsoid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingRegion {
    pub rectangle: GlobeRectangle,
    pub minimum_height: f64,
    pub maximum_height: f64,
}

impl BoundingRegion {
    pub fn new(rectangle: GlobeRectangle, minimum_height: f64, maximum_height: f64) -> Self {
        Self {
            rectangle,
            minimum_height,
            maximum_height,
        }
    }

    /// An oriented box enclosing this region, computed from its corner and
    /// edge-midpoint samples in an east-north-up frame at the center.
    pub fn to_oriented_bounding_box(&self, ellipsoid: &Ellipsoid) -> OrientedBoundingBox {
        let center_carto = Cartographic::new(
            self.rectangle.center().longitude,
            self.rectangle.center().latitude,
            (self.minimum_height + self.maximum_height) * 0.5,
        );
        let center = ellipsoid.cartographic_to_cartesian(&center_carto);

        let up = ellipsoid.geodetic_surface_normal_cartographic(&center_carto);
        let east = DVec3::new(-center.y, center.x, 0.0).normalize_or_zero();
        let east = if east == DVec3::ZERO {
            DVec3::X
        } else {
            east
        };
        let north = up.cross(east);

        let mut half_east: f64 = 0.0;
        let mut half_north: f64 = 0.0;
        let mut half_up: f64 = 0.0;
        let r = &self.rectangle;
        let mid_lon = (r.west + r.east) * 0.5;
        let mid_lat = (r.south + r.north) * 0.5;
        let samples = [
            (r.west, r.south),
            (r.west, r.north),
            (r.east, r.south),
            (r.east, r.north),
            (mid_lon, r.south),
            (mid_lon, r.north),
            (r.west, mid_lat),
            (r.east, mid_lat),
        ];
        for height in [self.minimum_height, self.maximum_height] {
            for (lon, lat) in samples {
                let p = ellipsoid
                    .cartographic_to_cartesian(&Cartographic::new(lon, lat, height));
                let offset = p - center;
                half_east = half_east.max(offset.dot(east).abs());
                half_north = half_north.max(offset.dot(north).abs());
                half_up = half_up.max(offset.dot(up).abs());
            }
        }

        OrientedBoundingBox::new(
            center,
            DMat3::from_cols(east * half_east, north * half_north, up * half_up),
        )
    }

    /// The child region for a quadtree subdivision of this region's
    /// rectangle, keeping the height range.
    pub fn quadtree_subdivision(&self, tile_id: &QuadtreeTileId) -> BoundingRegion {
        let denominator = (1u64 << tile_id.level) as f64;
        let r = &self.rectangle;
        let lon_size = r.width() / denominator;
        let lat_size = r.height() / denominator;
        let west = r.west + lon_size * tile_id.x as f64;
        let south = r.south + lat_size * tile_id.y as f64;
        BoundingRegion::new(
            GlobeRectangle::new(west, south, west + lon_size, south + lat_size),
            self.minimum_height,
            self.maximum_height,
        )
    }
}

/// An S2 cell with a height range. The cell is carried by ID for
/// interoperability; geometric queries go through its bounding rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct S2Cell {
    pub cell_id: u64,
    pub rectangle: GlobeRectangle,
    pub minimum_height: f64,
    pub maximum_height: f64,
}

impl S2Cell {
    fn as_region(&self) -> BoundingRegion {
        BoundingRegion::new(self.rectangle, self.minimum_height, self.maximum_height)
    }
}

/// The spatial extent of a tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundingVolume {
    Box(OrientedBoundingBox),
    Sphere(BoundingSphere),
    Region(BoundingRegion),
    S2(S2Cell),
}

impl BoundingVolume {
    pub fn center(&self, ellipsoid: &Ellipsoid) -> DVec3 {
        match self {
            BoundingVolume::Box(b) => b.center,
            BoundingVolume::Sphere(s) => s.center,
            BoundingVolume::Region(r) => r.to_oriented_bounding_box(ellipsoid).center,
            BoundingVolume::S2(c) => c.as_region().to_oriented_bounding_box(ellipsoid).center,
        }
    }

    pub fn intersect_plane(&self, plane: &Plane, ellipsoid: &Ellipsoid) -> Intersect {
        match self {
            BoundingVolume::Box(b) => b.intersect_plane(plane),
            BoundingVolume::Sphere(s) => s.intersect_plane(plane),
            BoundingVolume::Region(r) => {
                r.to_oriented_bounding_box(ellipsoid).intersect_plane(plane)
            }
            BoundingVolume::S2(c) => c
                .as_region()
                .to_oriented_bounding_box(ellipsoid)
                .intersect_plane(plane),
        }
    }

    pub fn distance_squared_to(&self, point: DVec3, ellipsoid: &Ellipsoid) -> f64 {
        match self {
            BoundingVolume::Box(b) => b.distance_squared_to(point),
            BoundingVolume::Sphere(s) => s.distance_squared_to(point),
            BoundingVolume::Region(r) => {
                r.to_oriented_bounding_box(ellipsoid).distance_squared_to(point)
            }
            BoundingVolume::S2(c) => c
                .as_region()
                .to_oriented_bounding_box(ellipsoid)
                .distance_squared_to(point),
        }
    }

    /// The child volume for a quadtree subdivision, addressed by an absolute
    /// tile ID relative to this volume as the level-zero root.
    pub fn quadtree_subdivision(&self, tile_id: &QuadtreeTileId) -> BoundingVolume {
        match self {
            BoundingVolume::Box(b) => BoundingVolume::Box(b.quadtree_subdivision(tile_id)),
            BoundingVolume::Sphere(s) => {
                let as_box = OrientedBoundingBox::new(
                    s.center,
                    DMat3::from_diagonal(DVec3::splat(s.radius)),
                );
                BoundingVolume::Box(as_box.quadtree_subdivision(tile_id))
            }
            BoundingVolume::Region(r) => BoundingVolume::Region(r.quadtree_subdivision(tile_id)),
            BoundingVolume::S2(c) => {
                BoundingVolume::Region(c.as_region().quadtree_subdivision(tile_id))
            }
        }
    }

    /// The child volume for an octree subdivision. Region-like volumes split
    /// their height range along z.
    pub fn octree_subdivision(&self, tile_id: &OctreeTileId) -> BoundingVolume {
        match self {
            BoundingVolume::Box(b) => BoundingVolume::Box(b.octree_subdivision(tile_id)),
            BoundingVolume::Sphere(s) => {
                let as_box = OrientedBoundingBox::new(
                    s.center,
                    DMat3::from_diagonal(DVec3::splat(s.radius)),
                );
                BoundingVolume::Box(as_box.octree_subdivision(tile_id))
            }
            BoundingVolume::Region(r) => {
                let flat = r.quadtree_subdivision(&QuadtreeTileId::new(
                    tile_id.level,
                    tile_id.x,
                    tile_id.y,
                ));
                let height_size =
                    (r.maximum_height - r.minimum_height) / (1u64 << tile_id.level) as f64;
                let minimum = r.minimum_height + height_size * tile_id.z as f64;
                BoundingVolume::Region(BoundingRegion::new(
                    flat.rectangle,
                    minimum,
                    minimum + height_size,
                ))
            }
            BoundingVolume::S2(c) => {
                BoundingVolume::Region(c.as_region()).octree_subdivision(tile_id)
            }
        }
    }

    /// A rough globe rectangle for this volume, used to keep tiles under the
    /// camera renderable. Only region-like volumes report one.
    pub fn estimate_globe_rectangle(&self) -> Option<GlobeRectangle> {
        match self {
            BoundingVolume::Region(r) => Some(r.rectangle),
            BoundingVolume::S2(c) => Some(c.rectangle),
            _ => None,
        }
    }
}

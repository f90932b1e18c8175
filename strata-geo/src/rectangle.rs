use std::f64::consts::PI;

use crate::Cartographic;

/// A two-dimensional region on the globe, bounded by longitude and latitude
/// in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlobeRectangle {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GlobeRectangle {
    pub const MAX: GlobeRectangle = GlobeRectangle {
        west: -PI,
        south: -PI / 2.0,
        east: PI,
        north: PI / 2.0,
    };

    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn from_degrees(west: f64, south: f64, east: f64, north: f64) -> Self {
        let r = PI / 180.0;
        Self::new(west * r, south * r, east * r, north * r)
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> Cartographic {
        Cartographic::new(
            (self.west + self.east) * 0.5,
            (self.south + self.north) * 0.5,
            0.0,
        )
    }

    pub fn contains(&self, position: &Cartographic) -> bool {
        position.longitude >= self.west
            && position.longitude <= self.east
            && position.latitude >= self.south
            && position.latitude <= self.north
    }

    pub fn overlaps(&self, other: &GlobeRectangle) -> bool {
        let west = self.west.max(other.west);
        let east = self.east.min(other.east);
        let south = self.south.max(other.south);
        let north = self.north.min(other.north);
        west < east && south < north
    }

    pub fn intersection(&self, other: &GlobeRectangle) -> Option<GlobeRectangle> {
        let west = self.west.max(other.west);
        let east = self.east.min(other.east);
        let south = self.south.max(other.south);
        let north = self.north.min(other.north);
        if west >= east || south >= north {
            return None;
        }
        Some(GlobeRectangle::new(west, south, east, north))
    }

    /// The quadrant of this rectangle addressed by local child offsets
    /// `(dx, dy)`, with `dy = 0` the southern half.
    pub fn quadrant(&self, dx: u32, dy: u32) -> GlobeRectangle {
        let mid_lon = (self.west + self.east) * 0.5;
        let mid_lat = (self.south + self.north) * 0.5;
        let (west, east) = if dx == 0 {
            (self.west, mid_lon)
        } else {
            (mid_lon, self.east)
        };
        let (south, north) = if dy == 0 {
            (self.south, mid_lat)
        } else {
            (mid_lat, self.north)
        };
        GlobeRectangle::new(west, south, east, north)
    }
}

//! Geometric and geospatial value types shared by the strata crates:
//! tile identifiers, bounding volumes, culling, and tiling schemes.

mod bounding_volume;
mod cartographic;
mod culling_volume;
mod ellipsoid;
mod morton;
mod plane;
mod rectangle;
mod tile_id;
mod tiling_scheme;

pub use bounding_volume::{
    BoundingRegion, BoundingSphere, BoundingVolume, Intersect, OrientedBoundingBox, S2Cell,
};
pub use cartographic::Cartographic;
pub use culling_volume::CullingVolume;
pub use ellipsoid::Ellipsoid;
pub use morton::{morton2, morton3};
pub use plane::Plane;
pub use rectangle::GlobeRectangle;
pub use tile_id::{OctreeTileId, QuadtreeTileId, TileId};
pub use tiling_scheme::GeographicTilingScheme;

pub const EPSILON5: f64 = 1e-5;
pub const EPSILON7: f64 = 1e-7;
pub const EPSILON12: f64 = 1e-12;

use serde::{Deserialize, Serialize};

/// Identifies a tile within an implicit quadtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuadtreeTileId {
    pub level: u32,
    pub x: u32,
    pub y: u32,
}

impl QuadtreeTileId {
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    pub fn parent(&self) -> Option<QuadtreeTileId> {
        if self.level == 0 {
            return None;
        }
        Some(QuadtreeTileId {
            level: self.level - 1,
            x: self.x >> 1,
            y: self.y >> 1,
        })
    }

    /// The child at local offset `(dx, dy)` where each component is 0 or 1.
    pub fn child(&self, dx: u32, dy: u32) -> QuadtreeTileId {
        debug_assert!(dx < 2 && dy < 2);
        QuadtreeTileId {
            level: self.level + 1,
            x: (self.x << 1) | dx,
            y: (self.y << 1) | dy,
        }
    }

    pub fn children(&self) -> [QuadtreeTileId; 4] {
        [
            self.child(0, 0),
            self.child(1, 0),
            self.child(0, 1),
            self.child(1, 1),
        ]
    }
}

/// Identifies a tile within an implicit octree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OctreeTileId {
    pub level: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl OctreeTileId {
    pub fn new(level: u32, x: u32, y: u32, z: u32) -> Self {
        Self { level, x, y, z }
    }

    pub fn child(&self, dx: u32, dy: u32, dz: u32) -> OctreeTileId {
        debug_assert!(dx < 2 && dy < 2 && dz < 2);
        OctreeTileId {
            level: self.level + 1,
            x: (self.x << 1) | dx,
            y: (self.y << 1) | dy,
            z: (self.z << 1) | dz,
        }
    }
}

/// How a tile is addressed: either by a URL from an explicit tileset tree, or
/// by coordinates in an implicit quadtree/octree. `UpsampledChild` marks a
/// synthetic tile whose geometry is subdivided from its parent rather than
/// fetched.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TileId {
    Url(String),
    Quadtree(QuadtreeTileId),
    Octree(OctreeTileId),
    UpsampledChild(QuadtreeTileId),
}

impl TileId {
    pub fn as_url(&self) -> Option<&str> {
        match self {
            TileId::Url(url) => Some(url),
            _ => None,
        }
    }

    pub fn as_quadtree(&self) -> Option<&QuadtreeTileId> {
        match self {
            TileId::Quadtree(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_octree(&self) -> Option<&OctreeTileId> {
        match self {
            TileId::Octree(id) => Some(id),
            _ => None,
        }
    }
}

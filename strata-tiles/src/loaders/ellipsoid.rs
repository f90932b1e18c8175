use std::f64::consts::PI;

use strata_geo::{
    BoundingRegion, BoundingVolume, Ellipsoid, GeographicTilingScheme, QuadtreeTileId, TileId,
};

use crate::tile::{Tile, TileContentKind, TileDescription, TileModel};

use super::{TileLoadInput, TileLoadResult, TilesetContentLoader};

/// A purely procedural globe: a geographic quadtree over an ellipsoid,
/// producing empty render payloads without any I/O. Geometry synthesis is
/// the renderer preparer's business.
pub struct EllipsoidTilesetLoader {
    pub ellipsoid: Ellipsoid,
    pub tiling_scheme: GeographicTilingScheme,
    pub maximum_level: u32,
    pub root_geometric_error: f64,
}

impl EllipsoidTilesetLoader {
    pub fn new(ellipsoid: Ellipsoid, maximum_level: u32) -> Self {
        // A quarter of the circumference is a workable error for a tile
        // spanning half the globe.
        let root_geometric_error = ellipsoid.radii.x * PI * 0.5;
        Self {
            ellipsoid,
            tiling_scheme: GeographicTilingScheme::default(),
            maximum_level,
            root_geometric_error,
        }
    }

    pub fn geometric_error(&self, level: u32) -> f64 {
        self.root_geometric_error / (1u64 << level) as f64
    }

    fn description_for(&self, id: QuadtreeTileId) -> TileDescription {
        let rectangle = self.tiling_scheme.tile_to_rectangle(&id);
        TileDescription {
            id: TileId::Quadtree(id),
            bounding_volume: BoundingVolume::Region(BoundingRegion::new(rectangle, 0.0, 0.0)),
            content_bounding_volume: None,
            geometric_error: self.geometric_error(id.level),
            refine: None,
            transform: glam::DMat4::IDENTITY,
            unconditionally_refine: false,
            children: Vec::new(),
        }
    }

    /// A content-less wrapper over the scheme's level-zero tiles; the
    /// wrapper always refines so the real tiles take over immediately.
    pub fn root_description(&self) -> TileDescription {
        let mut children = Vec::new();
        for y in 0..self.tiling_scheme.get_number_of_y_tiles_at_level(0) {
            for x in 0..self.tiling_scheme.get_number_of_x_tiles_at_level(0) {
                children.push(self.description_for(QuadtreeTileId::new(0, x, y)));
            }
        }
        TileDescription {
            id: TileId::Url(String::new()),
            bounding_volume: BoundingVolume::Region(BoundingRegion::new(
                self.tiling_scheme.rectangle,
                0.0,
                0.0,
            )),
            content_bounding_volume: None,
            geometric_error: self.root_geometric_error * 2.0,
            refine: None,
            transform: glam::DMat4::IDENTITY,
            unconditionally_refine: true,
            children,
        }
    }
}

impl TilesetContentLoader for EllipsoidTilesetLoader {
    fn load_tile_content(&self, input: &TileLoadInput) -> TileLoadResult {
        match &input.tile_id {
            TileId::Quadtree(_) => {
                TileLoadResult::success(TileContentKind::Render(TileModel::default()))
            }
            _ => TileLoadResult::success(TileContentKind::Empty),
        }
    }

    fn create_child_tiles(&self, tile: &Tile) -> Option<Vec<TileDescription>> {
        let id = *tile.id.as_quadtree()?;
        if id.level >= self.maximum_level {
            return Some(Vec::new());
        }
        Some(id.children().map(|child| self.description_for(child)).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_wraps_the_level_zero_tiles() {
        let loader = EllipsoidTilesetLoader::new(Ellipsoid::WGS84, 10);
        let root = loader.root_description();
        assert!(root.unconditionally_refine);
        assert_eq!(root.children.len(), 2);
        assert_eq!(
            root.children[1].id.as_quadtree(),
            Some(&QuadtreeTileId::new(0, 1, 0))
        );
    }

    #[test]
    fn subdivision_halves_the_error_and_splits_the_rectangle() {
        let loader = EllipsoidTilesetLoader::new(Ellipsoid::WGS84, 10);
        let parent = Tile::new(
            TileId::Quadtree(QuadtreeTileId::new(2, 1, 1)),
            BoundingVolume::Region(BoundingRegion::new(
                loader
                    .tiling_scheme
                    .tile_to_rectangle(&QuadtreeTileId::new(2, 1, 1)),
                0.0,
                0.0,
            )),
            loader.geometric_error(2),
        );
        let children = loader.create_child_tiles(&parent).unwrap();
        assert_eq!(children.len(), 4);
        for child in &children {
            assert_eq!(child.geometric_error, loader.geometric_error(3));
            let child_rect = child.bounding_volume.estimate_globe_rectangle().unwrap();
            let parent_rect = parent.bounding_volume.estimate_globe_rectangle().unwrap();
            assert!(child_rect.west >= parent_rect.west - 1e-12);
            assert!(child_rect.east <= parent_rect.east + 1e-12);
        }
    }

    #[test]
    fn subdivision_stops_at_the_maximum_level() {
        let loader = EllipsoidTilesetLoader::new(Ellipsoid::WGS84, 2);
        let tile = Tile::new(
            TileId::Quadtree(QuadtreeTileId::new(2, 0, 0)),
            BoundingVolume::Region(BoundingRegion::new(
                loader
                    .tiling_scheme
                    .tile_to_rectangle(&QuadtreeTileId::new(2, 0, 0)),
                0.0,
                0.0,
            )),
            1.0,
        );
        assert!(loader.create_child_tiles(&tile).unwrap().is_empty());
    }
}

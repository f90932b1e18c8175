use crate::{Cartographic, GlobeRectangle, QuadtreeTileId};

/// A simple geographic (equirectangular) tiling of the globe with two
/// level-zero tiles side by side.
#[derive(Clone, Debug)]
pub struct GeographicTilingScheme {
    pub rectangle: GlobeRectangle,
    pub number_of_level_zero_tiles_x: u32,
    pub number_of_level_zero_tiles_y: u32,
}

impl Default for GeographicTilingScheme {
    fn default() -> Self {
        Self {
            rectangle: GlobeRectangle::MAX,
            number_of_level_zero_tiles_x: 2,
            number_of_level_zero_tiles_y: 1,
        }
    }
}

impl GeographicTilingScheme {
    pub fn get_number_of_x_tiles_at_level(&self, level: u32) -> u32 {
        self.number_of_level_zero_tiles_x << level
    }

    pub fn get_number_of_y_tiles_at_level(&self, level: u32) -> u32 {
        self.number_of_level_zero_tiles_y << level
    }

    pub fn tile_to_rectangle(&self, id: &QuadtreeTileId) -> GlobeRectangle {
        let tiles_x = self.get_number_of_x_tiles_at_level(id.level) as f64;
        let tiles_y = self.get_number_of_y_tiles_at_level(id.level) as f64;
        let width = self.rectangle.width() / tiles_x;
        let height = self.rectangle.height() / tiles_y;
        let west = self.rectangle.west + id.x as f64 * width;
        // Tile y grows from north to south, the usual map-tile convention.
        let north = self.rectangle.north - id.y as f64 * height;
        GlobeRectangle::new(west, north - height, west + width, north)
    }

    pub fn position_to_tile(&self, position: &Cartographic, level: u32) -> Option<QuadtreeTileId> {
        if !self.rectangle.contains(position) {
            return None;
        }
        let tiles_x = self.get_number_of_x_tiles_at_level(level);
        let tiles_y = self.get_number_of_y_tiles_at_level(level);
        let x_fraction = (position.longitude - self.rectangle.west) / self.rectangle.width();
        let y_fraction = (self.rectangle.north - position.latitude) / self.rectangle.height();
        let x = ((x_fraction * tiles_x as f64) as u32).min(tiles_x - 1);
        let y = ((y_fraction * tiles_y as f64) as u32).min(tiles_y - 1);
        Some(QuadtreeTileId::new(level, x, y))
    }
}

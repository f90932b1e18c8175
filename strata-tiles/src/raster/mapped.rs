use glam::DVec4;
use strata_geo::{GlobeRectangle, QuadtreeTileId};

use super::overlay::RasterOverlayTileProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterAttachState {
    Unattached,
    Attached,
}

/// One overlay's raster tile draped over one geometry tile. Holds a
/// reference on the raster tile for as long as it exists.
#[derive(Clone, Debug)]
pub struct RasterMappedTo3DTile {
    pub overlay_index: usize,
    pub raster_tile_id: QuadtreeTileId,
    /// (tx, ty, sx, sy): texture coordinate transform from the geometry
    /// tile's rectangle into the raster tile's rectangle.
    pub translation_and_scale: DVec4,
    pub state: RasterAttachState,
}

impl RasterMappedTo3DTile {
    /// Picks the raster tile for a geometry tile: the level whose texel
    /// spacing suits the geometry rectangle, at the tile containing the
    /// rectangle's center. Takes a reference on that raster tile.
    pub fn map_to_tile(
        geometry_rectangle: &GlobeRectangle,
        provider: &mut RasterOverlayTileProvider,
        overlay_index: usize,
    ) -> Option<Self> {
        if !geometry_rectangle.overlaps(&provider.coverage_rectangle) {
            return None;
        }
        let texel_spacing = geometry_rectangle.width() / provider.tile_width as f64;
        let level = provider.level_with_maximum_texel_spacing(texel_spacing);
        let center = geometry_rectangle.center();
        let raster_tile_id = provider.tiling_scheme.position_to_tile(&center, level)?;
        let raster_rectangle = provider.tiling_scheme.tile_to_rectangle(&raster_tile_id);
        let raster_tile_id = provider.get_tile(raster_tile_id);
        Some(Self {
            overlay_index,
            raster_tile_id,
            translation_and_scale: compute_translation_and_scale(
                geometry_rectangle,
                &raster_rectangle,
            ),
            state: RasterAttachState::Unattached,
        })
    }
}

/// The transform taking texture coordinates over `geometry` into texture
/// coordinates over `imagery`.
pub(crate) fn compute_translation_and_scale(
    geometry: &GlobeRectangle,
    imagery: &GlobeRectangle,
) -> DVec4 {
    let scale_x = geometry.width() / imagery.width();
    let scale_y = geometry.height() / imagery.height();
    let translation_x = (geometry.west - imagery.west) / imagery.width();
    let translation_y = (geometry.south - imagery.south) / imagery.height();
    DVec4::new(translation_x, translation_y, scale_x, scale_y)
}

//! Raster overlays: imagery pyramids draped over tile geometry. Providers
//! own their tile maps with explicit reference counts; mappings connect one
//! geometry tile to one raster tile.

mod mapped;
mod overlay;

pub use mapped::{RasterAttachState, RasterMappedTo3DTile};
pub use overlay::{
    RasterImage, RasterOverlay, RasterOverlayTile, RasterOverlayTileProvider, RasterSource,
    RasterTileState,
};

//! Selection, streaming and caching for 3D Tiles tilesets.
//!
//! The entry point is [`Tileset`]: build one from a tileset.json URL, a
//! Cesium ion asset, an implicit-tiling description or a bare ellipsoid,
//! then call [`Tileset::update_view`] once per frame per view group. The
//! returned [`ViewUpdateResult`] lists the tiles to draw; content loads,
//! raster overlay loads and cache eviction all happen inside that call,
//! with blocking work pushed to the [`strata_jobs`] worker pool.

mod cache;
mod content_manager;
mod credits;
mod dynamic_sse;
mod error;
mod externals;
pub mod loaders;
mod raster;
mod selection_state;
mod tile;
mod tileset;
mod traversal;
mod view_group;
mod view_state;

pub use cache::{
    CacheKey, CachedContent, CachingAssetAccessor, LoadedTileList, TileContentCache,
    TilesetGlobalCache,
};
pub use content_manager::TilesetContentManager;
pub use credits::{Credit, CreditSystem};
pub use dynamic_sse::DynamicSseScale;
pub use error::{Error, ErrorList, FailureAction, TilesetLoadFailureDetails, TilesetLoadType};
pub use externals::{
    AssetAccessor, AssetRequest, AssetResponse, NullPrepareRendererResources,
    PrepareRendererResources, RendererResources, TileExcluder, TileSelectionEventReceiver,
    TilesetExternals,
};
pub use raster::{
    RasterAttachState, RasterImage, RasterMappedTo3DTile, RasterOverlay, RasterOverlayTile,
    RasterOverlayTileProvider, RasterSource, RasterTileState,
};
pub use selection_state::{TileSelectionResult, TileSelectionState};
pub use tile::{
    Tile, TileArena, TileContent, TileContentKind, TileDescription, TileHandle, TileLoadState,
    TileModel, TileRefine,
};
pub use tileset::{LoadFailureCallback, Tileset, TilesetOptions, ViewGroupHandle};
pub use traversal::TraversalDetails;
pub use view_group::{LoadQueueKind, TileLoadRequest, TilesetViewGroup, ViewUpdateResult};
pub use view_state::ViewState;

//! The interfaces an embedding application provides: network access, task
//! scheduling, renderer resource preparation and selection event callbacks.

use std::any::Any;
use std::sync::Arc;

use glam::DVec4;
use strata_geo::{QuadtreeTileId, TileId};
use strata_jobs::TaskProcessor;

use crate::credits::CreditSystem;
use crate::error::Error;
use crate::raster::RasterImage;
use crate::tile::{Tile, TileHandle, TileModel};

/// A completed (or failed) HTTP exchange.
#[derive(Clone, Debug)]
pub struct AssetResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub data: bytes::Bytes,
}

#[derive(Clone, Debug)]
pub struct AssetRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub response: Option<AssetResponse>,
}

/// Fetches remote assets. Implementations are called from worker threads and
/// may block; the main thread never calls into this directly.
pub trait AssetAccessor: Send + Sync {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<AssetRequest, Error>;

    fn request(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<AssetRequest, Error>;
}

/// Renderer resources are opaque to this crate; they travel as boxed `Any`
/// values between the load thread stage and the main thread stage.
pub type RendererResources = Box<dyn Any + Send + Sync>;

/// Turns loaded tile payloads into renderer resources. All methods have
/// default no-op implementations so headless use needs no preparer at all.
pub trait PrepareRendererResources: Send + Sync {
    /// Worker thread stage, runs right after a tile's payload is decoded.
    fn prepare_in_load_thread(&self, _model: &TileModel) -> Option<RendererResources> {
        None
    }

    /// Main thread stage, runs when the load result is applied to the tile.
    fn prepare_in_main_thread(
        &self,
        _model: &TileModel,
        load_thread_result: Option<RendererResources>,
    ) -> Option<RendererResources> {
        load_thread_result
    }

    fn free(
        &self,
        _tile_id: &TileId,
        _load_thread_result: Option<RendererResources>,
        _main_thread_result: Option<RendererResources>,
    ) {
    }

    fn attach_raster_in_main_thread(
        &self,
        _tile_id: &TileId,
        _overlay_index: usize,
        _raster_tile_id: &QuadtreeTileId,
        _image: &RasterImage,
        _translation_and_scale: DVec4,
    ) {
    }

    fn detach_raster_in_main_thread(
        &self,
        _tile_id: &TileId,
        _overlay_index: usize,
        _raster_tile_id: &QuadtreeTileId,
    ) {
    }
}

/// A renderer preparer that produces no resources.
pub struct NullPrepareRendererResources;

impl PrepareRendererResources for NullPrepareRendererResources {}

/// Removes tiles from consideration before any visibility test runs.
pub trait TileExcluder: Send + Sync {
    fn should_exclude(&self, tile: &Tile) -> bool;
}

/// Receives selection-change notifications when a view group finishes a
/// frame. All methods default to no-ops.
pub trait TileSelectionEventReceiver: Send {
    /// The tile was not rendered last frame and is rendered now.
    fn tile_visible(&mut self, _tile: TileHandle) {}
    /// The tile was rendered last frame and is now frustum culled.
    fn tile_culled(&mut self, _tile: TileHandle) {}
    /// The tile was rendered last frame and its children are rendered now.
    fn tile_refined(&mut self, _tile: TileHandle) {}
    /// The tile was rendered last frame and an ancestor is rendered now.
    fn tile_coarsened(&mut self, _tile: TileHandle) {}
}

/// Everything a tileset needs from its environment, bundled so constructors
/// stay short. The credit system is owned here rather than being a global.
pub struct TilesetExternals {
    pub asset_accessor: Arc<dyn AssetAccessor>,
    pub task_processor: Arc<dyn TaskProcessor>,
    pub prepare_renderer_resources: Arc<dyn PrepareRendererResources>,
    pub credit_system: CreditSystem,
}

impl TilesetExternals {
    pub fn new(
        asset_accessor: Arc<dyn AssetAccessor>,
        task_processor: Arc<dyn TaskProcessor>,
    ) -> Self {
        Self {
            asset_accessor,
            task_processor,
            prepare_renderer_resources: Arc::new(NullPrepareRendererResources),
            credit_system: CreditSystem::new(),
        }
    }
}

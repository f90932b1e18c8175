use std::collections::HashMap;
use std::sync::Arc;

use strata_geo::{GeographicTilingScheme, GlobeRectangle, QuadtreeTileId};
use strata_jobs::{completion_channel, CompletionReceiver, CompletionSender, TaskProcessor};

use crate::error::Error;
use crate::externals::{AssetAccessor, TilesetExternals};

/// A decoded raster tile payload.
#[derive(Clone, Debug)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: bytes::Bytes,
}

/// Produces the pixels for one raster tile. Runs on worker threads.
pub trait RasterSource: Send + Sync {
    fn load_tile_image(
        &self,
        id: &QuadtreeTileId,
        accessor: &Arc<dyn AssetAccessor>,
    ) -> Result<RasterImage, Error>;
}

/// An overlay definition; instantiated into a provider per tileset.
pub trait RasterOverlay: Send + Sync {
    fn name(&self) -> &str;
    fn create_tile_provider(
        &self,
        externals: &TilesetExternals,
    ) -> Result<RasterOverlayTileProvider, Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterTileState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

pub struct RasterOverlayTile {
    pub id: QuadtreeTileId,
    pub state: RasterTileState,
    pub image: Option<RasterImage>,
    reference_count: u32,
}

impl RasterOverlayTile {
    pub fn reference_count(&self) -> u32 {
        self.reference_count
    }
}

struct RasterLoadOutcome {
    id: QuadtreeTileId,
    result: Result<RasterImage, Error>,
}

/// Owns the raster tiles of one overlay. Tiles are shared by reference
/// count: `get_tile` returns the existing tile for an ID rather than
/// loading it twice, and a tile disappears when its last reference is
/// released.
pub struct RasterOverlayTileProvider {
    pub name: String,
    pub credit: Option<String>,
    pub tiling_scheme: GeographicTilingScheme,
    pub coverage_rectangle: GlobeRectangle,
    pub minimum_level: u32,
    pub maximum_level: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    source: Arc<dyn RasterSource>,
    tiles: HashMap<QuadtreeTileId, RasterOverlayTile>,
    sender: CompletionSender<RasterLoadOutcome>,
    receiver: CompletionReceiver<RasterLoadOutcome>,
    loading_count: u32,
    destroy_requested: bool,
}

impl RasterOverlayTileProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn RasterSource>,
        tiling_scheme: GeographicTilingScheme,
        coverage_rectangle: GlobeRectangle,
        minimum_level: u32,
        maximum_level: u32,
        tile_width: u32,
        tile_height: u32,
        credit: Option<String>,
    ) -> Self {
        let (sender, receiver) = completion_channel();
        Self {
            name: name.into(),
            credit,
            tiling_scheme,
            coverage_rectangle,
            minimum_level,
            maximum_level,
            tile_width,
            tile_height,
            source,
            tiles: HashMap::new(),
            sender,
            receiver,
            loading_count: 0,
            destroy_requested: false,
        }
    }

    /// Takes a reference on the raster tile with this ID, creating it in
    /// the `Unloaded` state if it does not exist yet.
    pub fn get_tile(&mut self, id: QuadtreeTileId) -> QuadtreeTileId {
        let tile = self.tiles.entry(id).or_insert_with(|| RasterOverlayTile {
            id,
            state: RasterTileState::Unloaded,
            image: None,
            reference_count: 0,
        });
        tile.reference_count += 1;
        id
    }

    pub fn tile(&self, id: QuadtreeTileId) -> Option<&RasterOverlayTile> {
        self.tiles.get(&id)
    }

    pub fn add_reference(&mut self, id: QuadtreeTileId) {
        if let Some(tile) = self.tiles.get_mut(&id) {
            tile.reference_count += 1;
        }
    }

    /// Drops one reference. The tile is removed at zero unless a worker is
    /// still producing its image; those are swept when the load lands.
    pub fn release_reference(&mut self, id: QuadtreeTileId) {
        let Some(tile) = self.tiles.get_mut(&id) else {
            return;
        };
        debug_assert!(tile.reference_count > 0);
        tile.reference_count = tile.reference_count.saturating_sub(1);
        if tile.reference_count == 0 && tile.state != RasterTileState::Loading {
            self.tiles.remove(&id);
        }
    }

    pub fn loading_count(&self) -> u32 {
        self.loading_count
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Starts the worker load for an `Unloaded` tile, unless the throttle
    /// is already saturated. Returns whether a load was started.
    pub fn load_tile_throttled(
        &mut self,
        id: QuadtreeTileId,
        task_processor: &Arc<dyn TaskProcessor>,
        accessor: &Arc<dyn AssetAccessor>,
        maximum_simultaneous_loads: u32,
    ) -> bool {
        if self.loading_count >= maximum_simultaneous_loads {
            return false;
        }
        let Some(tile) = self.tiles.get_mut(&id) else {
            return false;
        };
        if tile.state != RasterTileState::Unloaded {
            return false;
        }
        tile.state = RasterTileState::Loading;
        self.loading_count += 1;
        let source = self.source.clone();
        let accessor = accessor.clone();
        let sender = self.sender.clone();
        task_processor.start_task(Box::new(move || {
            let result = source.load_tile_image(&id, &accessor);
            sender.send(RasterLoadOutcome { id, result });
        }));
        true
    }

    /// Applies finished worker loads. Tiles whose last reference went away
    /// mid-load are dropped here.
    pub fn process_loaded_tiles(&mut self) {
        for outcome in self.receiver.drain() {
            self.loading_count = self.loading_count.saturating_sub(1);
            let Some(tile) = self.tiles.get_mut(&outcome.id) else {
                continue;
            };
            if tile.reference_count == 0 {
                self.tiles.remove(&outcome.id);
                continue;
            }
            match outcome.result {
                Ok(image) => {
                    tile.image = Some(image);
                    tile.state = RasterTileState::Loaded;
                }
                Err(error) => {
                    log::warn!("raster tile {:?} failed to load: {error}", outcome.id);
                    tile.state = RasterTileState::Failed;
                }
            }
        }
    }

    /// The deepest level whose texels are no finer than `texel_spacing`
    /// radians per texel, clamped to this provider's level range.
    pub fn level_with_maximum_texel_spacing(&self, texel_spacing: f64) -> u32 {
        let level_zero_spacing = self.coverage_rectangle.width()
            / (self.tiling_scheme.get_number_of_x_tiles_at_level(0) as f64
                * self.tile_width as f64);
        let level = (level_zero_spacing / texel_spacing).log2().round();
        (level.max(0.0) as u32).clamp(self.minimum_level, self.maximum_level)
    }

    /// Requests teardown. Destruction is deferred until every in-flight
    /// worker load has landed.
    pub fn destroy_safely(&mut self) {
        self.destroy_requested = true;
    }

    pub fn is_being_destroyed(&self) -> bool {
        self.destroy_requested
    }

    pub fn can_be_destroyed(&self) -> bool {
        self.destroy_requested && self.loading_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use strata_jobs::TaskPool;

    struct SolidColor;

    impl RasterSource for SolidColor {
        fn load_tile_image(
            &self,
            _id: &QuadtreeTileId,
            _accessor: &Arc<dyn AssetAccessor>,
        ) -> Result<RasterImage, Error> {
            Ok(RasterImage {
                width: 4,
                height: 4,
                channels: 4,
                pixels: bytes::Bytes::from(vec![255u8; 64]),
            })
        }
    }

    struct NoNetwork;

    impl AssetAccessor for NoNetwork {
        fn get(
            &self,
            url: &str,
            _headers: &[(String, String)],
        ) -> Result<crate::externals::AssetRequest, Error> {
            Err(Error::Request {
                url: url.to_string(),
                message: "offline".to_string(),
            })
        }

        fn request(
            &self,
            _method: &str,
            url: &str,
            headers: &[(String, String)],
            _body: &[u8],
        ) -> Result<crate::externals::AssetRequest, Error> {
            self.get(url, headers)
        }
    }

    fn provider() -> RasterOverlayTileProvider {
        RasterOverlayTileProvider::new(
            "test",
            Arc::new(SolidColor),
            GeographicTilingScheme::default(),
            GlobeRectangle::MAX,
            0,
            18,
            256,
            256,
            Some("© test".to_string()),
        )
    }

    #[test]
    fn tiles_are_shared_by_reference_count() {
        let mut provider = provider();
        let id = QuadtreeTileId::new(3, 1, 2);
        provider.get_tile(id);
        provider.get_tile(id);
        assert_eq!(provider.tile_count(), 1);
        assert_eq!(provider.tile(id).unwrap().reference_count(), 2);

        provider.release_reference(id);
        assert_eq!(provider.tile_count(), 1);
        provider.release_reference(id);
        assert_eq!(provider.tile_count(), 0);
    }

    #[test]
    fn texel_spacing_level_is_clamped() {
        let provider = provider();
        let level0 = GlobeRectangle::MAX.width() / (2.0 * 256.0);
        assert_eq!(provider.level_with_maximum_texel_spacing(level0), 0);
        assert_eq!(provider.level_with_maximum_texel_spacing(level0 / 4.0), 2);
        assert_eq!(
            provider.level_with_maximum_texel_spacing(level0 / 1e12),
            18
        );
        assert_eq!(provider.level_with_maximum_texel_spacing(level0 * 100.0), 0);
    }

    #[test]
    fn loads_land_through_the_completion_channel() {
        let mut provider = provider();
        let pool: Arc<dyn TaskProcessor> = Arc::new(TaskPool::new(1));
        let accessor: Arc<dyn AssetAccessor> = Arc::new(NoNetwork);
        let id = provider.get_tile(QuadtreeTileId::new(1, 0, 0));
        assert!(provider.load_tile_throttled(id, &pool, &accessor, 4));
        // A second request does not start another load.
        assert!(!provider.load_tile_throttled(id, &pool, &accessor, 4));

        let deadline = Instant::now() + Duration::from_secs(5);
        while provider.tile(id).unwrap().state != RasterTileState::Loaded {
            assert!(Instant::now() < deadline, "raster load never landed");
            provider.process_loaded_tiles();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(provider.tile(id).unwrap().image.is_some());
        assert_eq!(provider.loading_count(), 0);
    }

    #[test]
    fn destruction_waits_for_inflight_loads() {
        let mut provider = provider();
        let pool: Arc<dyn TaskProcessor> = Arc::new(TaskPool::new(1));
        let accessor: Arc<dyn AssetAccessor> = Arc::new(NoNetwork);
        let id = provider.get_tile(QuadtreeTileId::new(1, 0, 0));
        provider.load_tile_throttled(id, &pool, &accessor, 4);
        provider.destroy_safely();
        assert!(!provider.can_be_destroyed());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !provider.can_be_destroyed() {
            assert!(Instant::now() < deadline, "provider never became destroyable");
            provider.process_loaded_tiles();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn release_during_load_drops_the_tile_after_landing() {
        let mut provider = provider();
        let pool: Arc<dyn TaskProcessor> = Arc::new(TaskPool::new(1));
        let accessor: Arc<dyn AssetAccessor> = Arc::new(NoNetwork);
        let id = provider.get_tile(QuadtreeTileId::new(2, 1, 1));
        provider.load_tile_throttled(id, &pool, &accessor, 4);
        provider.release_reference(id);
        // Still present: the worker owns it until the outcome lands.
        assert_eq!(provider.tile_count(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while provider.tile_count() != 0 {
            assert!(Instant::now() < deadline, "orphaned raster tile never swept");
            provider.process_loaded_tiles();
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

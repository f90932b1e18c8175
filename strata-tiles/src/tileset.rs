use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::DVec3;
use strata_geo::{BoundingSphere, BoundingVolume, Ellipsoid, TileId};

use crate::cache::{LoadedTileList, TilesetGlobalCache};
use crate::content_manager::TilesetContentManager;
use crate::credits::Credit;
use crate::dynamic_sse::DynamicSseScale;
use crate::error::{Error, FailureAction, TilesetLoadFailureDetails};
use crate::externals::{TileExcluder, TilesetExternals};
use crate::loaders::{
    EllipsoidTilesetLoader, ImplicitLoader, IonTilesetLoader, TilesetContentLoader,
    TilesetJsonLoader,
};
use crate::raster::{RasterAttachState, RasterMappedTo3DTile, RasterOverlay, RasterTileState};
use crate::raster::RasterOverlayTileProvider;
use crate::tile::{Tile, TileArena, TileContentKind, TileDescription, TileHandle, TileLoadState};
use crate::traversal::Traversal;
use crate::view_group::{TilesetViewGroup, ViewUpdateResult};
use crate::view_state::ViewState;

/// Identifies one view group of a tileset. Group 0 always exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewGroupHandle(pub usize);

impl ViewGroupHandle {
    pub const DEFAULT: ViewGroupHandle = ViewGroupHandle(0);
}

/// Decides what to do about a permanently failed tile load. Returning
/// [`FailureAction::Retry`] re-arms the tile for another attempt.
pub type LoadFailureCallback = Box<dyn FnMut(&TilesetLoadFailureDetails) -> FailureAction + Send>;

pub struct TilesetOptions {
    /// Refinement stops once a tile's screen-space error drops below this
    /// many pixels.
    pub maximum_screen_space_error: f64,
    pub maximum_simultaneous_tile_loads: u32,
    pub maximum_simultaneous_raster_loads: u32,
    /// When more descendants than this are still loading under a kicked
    /// subtree, their loads are rolled back in favor of the parent.
    pub loading_descendant_limit: u32,
    pub preload_ancestors: bool,
    pub preload_siblings: bool,
    pub maximum_cached_bytes: i64,
    pub enable_frustum_culling: bool,
    /// The coarser error tolerated for culled tiles when
    /// `enforce_culled_screen_space_error` is on.
    pub culled_screen_space_error: f64,
    pub enforce_culled_screen_space_error: bool,
    pub enable_dynamic_screen_space_error: bool,
    /// Treat the tile directly below each camera as visible even when the
    /// frustum looks away from it.
    pub render_tiles_under_camera: bool,
    pub show_credits_on_screen: bool,
    /// Attribution for the tileset as a whole, shown whenever anything
    /// from it renders.
    pub credit: Option<String>,
    pub on_load_failure: Option<LoadFailureCallback>,
}

impl Default for TilesetOptions {
    fn default() -> Self {
        Self {
            maximum_screen_space_error: 16.0,
            maximum_simultaneous_tile_loads: 20,
            maximum_simultaneous_raster_loads: 20,
            loading_descendant_limit: 20,
            preload_ancestors: true,
            preload_siblings: true,
            maximum_cached_bytes: 512 * 1024 * 1024,
            enable_frustum_culling: true,
            culled_screen_space_error: 64.0,
            enforce_culled_screen_space_error: false,
            enable_dynamic_screen_space_error: false,
            render_tiles_under_camera: true,
            show_credits_on_screen: false,
            credit: None,
            on_load_failure: None,
        }
    }
}

struct OverlayEntry {
    provider: RasterOverlayTileProvider,
    credit: Option<Credit>,
}

static NEXT_TILESET_ID: AtomicU64 = AtomicU64::new(1);

/// A 3D Tiles tileset: the tile tree, its content loads, raster overlays and
/// per-view selection, driven once per frame through [`update_view`].
///
/// [`update_view`]: Tileset::update_view
pub struct Tileset {
    pub options: TilesetOptions,
    pub externals: TilesetExternals,
    id: u64,
    ellipsoid: Ellipsoid,
    arena: TileArena,
    content_manager: TilesetContentManager,
    loaded_tiles: LoadedTileList,
    view_groups: Vec<TilesetViewGroup>,
    overlays: Vec<Option<OverlayEntry>>,
    excluders: Vec<Box<dyn TileExcluder>>,
    dynamic_sse: DynamicSseScale,
    frame_number: u64,
}

impl Tileset {
    /// The core constructor: a loader plus the description of the root
    /// tile it serves.
    pub fn new(
        externals: TilesetExternals,
        loader: Arc<dyn TilesetContentLoader>,
        root: TileDescription,
        options: TilesetOptions,
    ) -> Self {
        let mut arena = TileArena::new();
        let root_refine = root.refine.unwrap_or_default();
        let root_handle = arena.insert_root(Tile::from_description(&root, root_refine));
        arena.create_children(root_handle, &root.children);
        Self {
            options,
            externals,
            id: NEXT_TILESET_ID.fetch_add(1, Ordering::Relaxed),
            ellipsoid: Ellipsoid::WGS84,
            arena,
            content_manager: TilesetContentManager::new(loader, Vec::new()),
            loaded_tiles: LoadedTileList::new(),
            view_groups: vec![TilesetViewGroup::default()],
            overlays: Vec::new(),
            excluders: Vec::new(),
            dynamic_sse: DynamicSseScale::new(),
            frame_number: 0,
        }
    }

    /// A tileset rooted at a tileset.json URL. The document itself loads
    /// like any other tile content, on the first frame that needs it.
    pub fn from_url(
        externals: TilesetExternals,
        url: impl Into<String>,
        options: TilesetOptions,
    ) -> Self {
        let root = Self::placeholder_root(url.into());
        Self::new(externals, Arc::new(TilesetJsonLoader::new()), root, options)
    }

    /// A tileset streamed from a Cesium ion asset. Authorization and token
    /// refresh wrap the plain tileset.json loader.
    pub fn from_ion_asset(
        externals: TilesetExternals,
        asset_id: u64,
        access_token: impl Into<String>,
        tileset_url: impl Into<String>,
        options: TilesetOptions,
    ) -> Self {
        let access_token = access_token.into();
        let endpoint = IonTilesetLoader::endpoint_url(asset_id, &access_token);
        let loader = IonTilesetLoader::new(
            Arc::new(TilesetJsonLoader::new()),
            endpoint,
            access_token,
        );
        let root = Self::placeholder_root(tileset_url.into());
        Self::new(externals, Arc::new(loader), root, options)
    }

    pub fn from_implicit(
        externals: TilesetExternals,
        loader: ImplicitLoader,
        options: TilesetOptions,
    ) -> Self {
        let root = loader.root_description();
        Self::new(externals, Arc::new(loader), root, options)
    }

    /// A synthetic globe surface with no content to fetch; useful for
    /// terrain-less rendering and for exercising the selection machinery.
    pub fn from_ellipsoid(
        externals: TilesetExternals,
        loader: EllipsoidTilesetLoader,
        options: TilesetOptions,
    ) -> Self {
        let root = loader.root_description();
        Self::new(externals, Arc::new(loader), root, options)
    }

    /// A root tile standing in for a not-yet-fetched tileset document: it
    /// covers everything, never meets the error threshold, and splices in
    /// the real root as external content once loaded.
    fn placeholder_root(url: String) -> TileDescription {
        TileDescription {
            id: TileId::Url(url),
            bounding_volume: BoundingVolume::Sphere(BoundingSphere::new(
                DVec3::ZERO,
                2.0 * Ellipsoid::WGS84.radii.x,
            )),
            content_bounding_volume: None,
            geometric_error: 1e8,
            refine: None,
            transform: glam::DMat4::IDENTITY,
            unconditionally_refine: true,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn arena(&self) -> &TileArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut TileArena {
        &mut self.arena
    }

    pub fn root(&self) -> Option<TileHandle> {
        self.arena.root()
    }

    pub fn tiles_data_used(&self) -> i64 {
        self.content_manager.tiles_data_used()
    }

    pub fn tiles_load_in_progress(&self) -> i32 {
        self.content_manager.tiles_load_in_progress()
    }

    pub fn loaded_tile_count(&self) -> usize {
        self.loaded_tiles.len()
    }

    pub fn set_request_headers(&mut self, headers: Vec<(String, String)>) {
        self.content_manager.request_headers = headers;
    }

    pub fn add_excluder(&mut self, excluder: Box<dyn TileExcluder>) {
        self.excluders.push(excluder);
    }

    pub fn create_view_group(&mut self, weight: f64) -> ViewGroupHandle {
        self.view_groups.push(TilesetViewGroup::new(weight));
        ViewGroupHandle(self.view_groups.len() - 1)
    }

    pub fn view_group(&self, group: ViewGroupHandle) -> Option<&TilesetViewGroup> {
        self.view_groups.get(group.0)
    }

    pub fn view_group_mut(&mut self, group: ViewGroupHandle) -> Option<&mut TilesetViewGroup> {
        self.view_groups.get_mut(group.0)
    }

    /// Instantiates an overlay into a provider and drapes it over tiles
    /// selected from now on. Returns the overlay's index.
    pub fn add_overlay(&mut self, overlay: &dyn RasterOverlay) -> Result<usize, Error> {
        let provider = overlay.create_tile_provider(&self.externals)?;
        let credit = provider.credit.clone().map(|html| {
            self.externals
                .credit_system
                .create_credit(html, self.options.show_credits_on_screen)
        });
        self.overlays.push(Some(OverlayEntry { provider, credit }));
        Ok(self.overlays.len() - 1)
    }

    pub fn overlay_provider(&self, index: usize) -> Option<&RasterOverlayTileProvider> {
        self.overlays.get(index).and_then(|s| s.as_ref()).map(|e| &e.provider)
    }

    /// Detaches the overlay from every tile and tears the provider down
    /// once its in-flight raster loads have landed.
    pub fn remove_overlay(&mut self, index: usize) {
        let handles: Vec<TileHandle> = self.arena.iter().map(|(&h, _)| h).collect();
        for handle in handles {
            let Some(tile) = self.arena.get_mut(handle) else {
                continue;
            };
            let tile_id = tile.id.clone();
            let mut removed = Vec::new();
            tile.raster_tiles.retain(|mapping| {
                if mapping.overlay_index == index {
                    removed.push(mapping.clone());
                    false
                } else {
                    true
                }
            });
            for mapping in removed {
                if mapping.state == RasterAttachState::Attached {
                    self.externals
                        .prepare_renderer_resources
                        .detach_raster_in_main_thread(&tile_id, index, &mapping.raster_tile_id);
                }
                if let Some(entry) = self.overlays.get_mut(index).and_then(|s| s.as_mut()) {
                    entry.provider.release_reference(mapping.raster_tile_id);
                }
            }
        }
        if let Some(entry) = self.overlays.get_mut(index).and_then(|s| s.as_mut()) {
            entry.provider.destroy_safely();
        }
    }

    /// Runs one frame of selection for one view group: applies finished
    /// loads, walks the tree against `frusta`, updates raster overlays and
    /// credits, starts new loads, and sheds cache overflow.
    pub fn update_view(
        &mut self,
        group: ViewGroupHandle,
        frusta: &[ViewState],
    ) -> Option<&ViewUpdateResult> {
        if group.0 >= self.view_groups.len() {
            return None;
        }
        self.frame_number += 1;
        let frame_number = self.frame_number;

        self.externals.credit_system.start_next_frame();

        let failures = self
            .content_manager
            .process_completed_loads(&mut self.arena, &mut self.externals);
        for (tile, failure) in &failures {
            log::warn!(
                "tile content load failed (status {}): {}",
                failure.status_code,
                failure.message
            );
            let action = match self.options.on_load_failure.as_mut() {
                Some(callback) => callback(failure),
                None => FailureAction::GiveUp,
            };
            if action == FailureAction::Retry {
                if let Some(t) = self.arena.get_mut(*tile) {
                    t.load_state = TileLoadState::FailedTemporarily;
                }
            }
        }

        for slot in &mut self.overlays {
            if let Some(entry) = slot {
                entry.provider.process_loaded_tiles();
                if entry.provider.can_be_destroyed() {
                    *slot = None;
                }
            }
        }

        let sse_scale = if self.options.enable_dynamic_screen_space_error {
            let over_budget =
                self.content_manager.tiles_data_used() > self.options.maximum_cached_bytes;
            let position = frusta.first().map(|f| f.position).unwrap_or(DVec3::ZERO);
            self.dynamic_sse.update(position, over_budget)
        } else {
            1.0
        };

        let group_ref = &mut self.view_groups[group.0];
        group_ref.start_frame(frame_number);
        let group_frame = group_ref.current_frame();
        let group_last_frame = group_ref.last_frame();
        if let Some(root) = self.arena.root() {
            let mut traversal = Traversal {
                arena: &mut self.arena,
                loaded: &mut self.loaded_tiles,
                group: group_ref,
                options: &self.options,
                excluders: &self.excluders,
                frusta,
                ellipsoid: &self.ellipsoid,
                frame_number: group_frame,
                last_frame_number: group_last_frame,
                global_frame: frame_number,
                sse_scale,
            };
            traversal.run(root);
        }
        self.view_groups[group.0].finish_frame();

        let rendered = self.view_groups[group.0]
            .result
            .tiles_to_render_this_frame
            .clone();
        self.update_tile_rasters(&rendered);
        self.update_credits(group.0, &rendered);
        self.process_load_requests();
        self.unload_cached_tiles(self.options.maximum_cached_bytes);

        Some(&self.view_groups[group.0].result)
    }

    /// Reports this tileset to an application-wide cache. Call once per
    /// frame after `update_view`.
    pub fn register_in_global_cache(&self, cache: &mut TilesetGlobalCache, actively_rendering: bool) {
        cache.update(self.id, self.content_manager.tiles_data_used(), actively_rendering);
    }

    /// Sheds loaded content down to `target_bytes`, least recently visited
    /// first. Pass 0 to unload everything evictable.
    pub fn trim_loaded_tiles(&mut self, target_bytes: i64) {
        self.unload_cached_tiles(target_bytes);
    }

    fn update_tile_rasters(&mut self, rendered: &[TileHandle]) {
        for &handle in rendered {
            let (tile_id, rectangle, mapped_overlays) = match self.arena.get(handle) {
                Some(t)
                    if t.load_state == TileLoadState::Done && t.has_render_content() =>
                {
                    match t.bounding_volume.estimate_globe_rectangle() {
                        Some(rectangle) => {
                            let mapped: Vec<usize> =
                                t.raster_tiles.iter().map(|m| m.overlay_index).collect();
                            (t.id.clone(), rectangle, mapped)
                        }
                        None => continue,
                    }
                }
                _ => continue,
            };

            // Drape every live overlay this tile is not mapped to yet, so
            // overlays added after the tile loaded still reach it.
            let mut new_mappings = Vec::new();
            for (index, slot) in self.overlays.iter_mut().enumerate() {
                let Some(entry) = slot else {
                    continue;
                };
                if entry.provider.is_being_destroyed() || mapped_overlays.contains(&index) {
                    continue;
                }
                if let Some(mapping) =
                    RasterMappedTo3DTile::map_to_tile(&rectangle, &mut entry.provider, index)
                {
                    new_mappings.push(mapping);
                }
            }
            if !new_mappings.is_empty() {
                if let Some(t) = self.arena.get_mut(handle) {
                    t.raster_tiles.extend(new_mappings);
                }
            }

            let mut mappings = match self.arena.get_mut(handle) {
                Some(t) => std::mem::take(&mut t.raster_tiles),
                None => continue,
            };
            mappings.retain_mut(|mapping| {
                let Some(entry) = self
                    .overlays
                    .get_mut(mapping.overlay_index)
                    .and_then(|s| s.as_mut())
                else {
                    return false;
                };
                let state = entry.provider.tile(mapping.raster_tile_id).map(|t| t.state);
                match state {
                    Some(RasterTileState::Unloaded) => {
                        entry.provider.load_tile_throttled(
                            mapping.raster_tile_id,
                            &self.externals.task_processor,
                            &self.externals.asset_accessor,
                            self.options.maximum_simultaneous_raster_loads,
                        );
                        true
                    }
                    Some(RasterTileState::Loading) => true,
                    Some(RasterTileState::Loaded) => {
                        if mapping.state == RasterAttachState::Unattached {
                            if let Some(image) = entry
                                .provider
                                .tile(mapping.raster_tile_id)
                                .and_then(|t| t.image.as_ref())
                            {
                                self.externals
                                    .prepare_renderer_resources
                                    .attach_raster_in_main_thread(
                                        &tile_id,
                                        mapping.overlay_index,
                                        &mapping.raster_tile_id,
                                        image,
                                        mapping.translation_and_scale,
                                    );
                            }
                            mapping.state = RasterAttachState::Attached;
                        }
                        true
                    }
                    Some(RasterTileState::Failed) => {
                        entry.provider.release_reference(mapping.raster_tile_id);
                        false
                    }
                    None => false,
                }
            });
            if let Some(t) = self.arena.get_mut(handle) {
                t.raster_tiles = mappings;
            }
        }
    }

    fn update_credits(&mut self, group_index: usize, rendered: &[TileHandle]) {
        if !rendered.is_empty() {
            if let Some(html) = self.options.credit.clone() {
                let credit = self
                    .externals
                    .credit_system
                    .create_credit(html, self.options.show_credits_on_screen);
                self.externals.credit_system.add_credit_to_frame(credit);
            }
        }
        for slot in &self.overlays {
            if let Some(entry) = slot {
                if let Some(credit) = entry.credit {
                    self.externals.credit_system.add_credit_to_frame(credit);
                }
            }
        }
        for &handle in rendered {
            let Some(tile) = self.arena.get(handle) else {
                continue;
            };
            if let TileContentKind::Render(model) = &tile.content.kind {
                for html in model.credits.clone() {
                    let credit = self
                        .externals
                        .credit_system
                        .create_credit(html, self.options.show_credits_on_screen);
                    self.externals.credit_system.add_credit_to_frame(credit);
                }
            }
        }
        self.view_groups[group_index].result.credits =
            self.externals.credit_system.credits_to_show_this_frame();
    }

    /// Distributes the available load slots across view groups by weight
    /// and starts loads in each group's priority order.
    fn process_load_requests(&mut self) {
        let available = self.options.maximum_simultaneous_tile_loads as i32
            - self.content_manager.tiles_load_in_progress();
        if available <= 0 {
            return;
        }
        let queued: Vec<(usize, Vec<crate::view_group::TileLoadRequest>)> = self
            .view_groups
            .iter()
            .enumerate()
            .map(|(i, g)| (i, g.collect_load_requests()))
            .filter(|(_, requests)| !requests.is_empty())
            .collect();
        let total_weight: f64 = queued
            .iter()
            .map(|(i, _)| self.view_groups[*i].weight)
            .sum();
        if total_weight <= 0.0 {
            return;
        }
        let mut remaining = available;
        for (group_index, requests) in queued {
            if remaining <= 0 {
                break;
            }
            let share = (available as f64 * self.view_groups[group_index].weight / total_weight)
                .ceil() as i32;
            let mut slots = share.max(1).min(remaining);
            for request in requests {
                if slots <= 0 {
                    break;
                }
                let before = self.content_manager.tiles_load_in_progress();
                self.content_manager
                    .load_tile_content(&mut self.arena, request.tile, &self.externals);
                if self.content_manager.tiles_load_in_progress() > before {
                    slots -= 1;
                    remaining -= 1;
                }
            }
        }
    }

    /// Walks the loaded-tile list from the least recently visited end,
    /// unloading until the cache fits. The root stays put, as does anything
    /// visited since the oldest view group's last update; evicting those
    /// would pull tiles out from under a group that still renders them.
    fn unload_cached_tiles(&mut self, target_bytes: i64) {
        let keep_visited_since = self
            .view_groups
            .iter()
            .filter(|g| g.last_update_frame() > 0)
            .map(|g| g.last_update_frame())
            .min()
            .unwrap_or(self.frame_number);
        let root = self.arena.root();
        let mut current = self.loaded_tiles.head();
        while self.content_manager.tiles_data_used() > target_bytes {
            let Some(tile) = current else {
                break;
            };
            let next = self.loaded_tiles.next(&self.arena, tile);
            let still_in_use = self
                .arena
                .get(tile)
                .map(|t| t.last_frame_visited >= keep_visited_since)
                .unwrap_or(false);
            if still_in_use {
                // Everything beyond this point was visited even more
                // recently.
                break;
            }
            if Some(tile) != root
                && self
                    .content_manager
                    .unload_tile_content(&mut self.arena, tile, &self.externals)
            {
                self.release_tile_rasters(tile);
                self.loaded_tiles.remove(&mut self.arena, tile);
            }
            current = next;
        }
    }

    fn release_tile_rasters(&mut self, handle: TileHandle) {
        let (tile_id, mappings) = match self.arena.get_mut(handle) {
            Some(t) => (t.id.clone(), std::mem::take(&mut t.raster_tiles)),
            None => return,
        };
        for mapping in mappings {
            if mapping.state == RasterAttachState::Attached {
                self.externals
                    .prepare_renderer_resources
                    .detach_raster_in_main_thread(
                        &tile_id,
                        mapping.overlay_index,
                        &mapping.raster_tile_id,
                    );
            }
            if let Some(entry) = self
                .overlays
                .get_mut(mapping.overlay_index)
                .and_then(|s| s.as_mut())
            {
                entry.provider.release_reference(mapping.raster_tile_id);
            }
        }
    }
}

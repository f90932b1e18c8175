use std::sync::Arc;

use strata_jobs::{completion_channel, CompletionReceiver, CompletionSender};

use crate::error::{TilesetLoadFailureDetails, TilesetLoadType};
use crate::externals::{RendererResources, TilesetExternals};
use crate::loaders::{TileLoadInput, TileLoadResult, TileLoadResultState, TilesetContentLoader};
use crate::tile::{TileArena, TileContentKind, TileHandle, TileLoadState};

struct CompletedTileLoad {
    tile: TileHandle,
    result: TileLoadResult,
    load_thread_resources: Option<RendererResources>,
}

/// Owns the content side of a tileset: it starts worker loads, applies
/// their results on the main thread, and tracks how much content is in
/// flight and in memory. All state transitions of
/// [`TileLoadState`](crate::tile::TileLoadState) happen here and nowhere
/// else.
pub struct TilesetContentManager {
    loader: Arc<dyn TilesetContentLoader>,
    pub request_headers: Vec<(String, String)>,
    tiles_load_in_progress: i32,
    tiles_data_used: i64,
    sender: CompletionSender<CompletedTileLoad>,
    receiver: CompletionReceiver<CompletedTileLoad>,
}

impl TilesetContentManager {
    pub fn new(
        loader: Arc<dyn TilesetContentLoader>,
        request_headers: Vec<(String, String)>,
    ) -> Self {
        let (sender, receiver) = completion_channel();
        Self {
            loader,
            request_headers,
            tiles_load_in_progress: 0,
            tiles_data_used: 0,
            sender,
            receiver,
        }
    }

    pub fn loader(&self) -> &Arc<dyn TilesetContentLoader> {
        &self.loader
    }

    pub fn tiles_load_in_progress(&self) -> i32 {
        self.tiles_load_in_progress
    }

    pub fn tiles_data_used(&self) -> i64 {
        self.tiles_data_used
    }

    /// Kicks off a worker load for this tile. A no-op unless the tile is
    /// `Unloaded` or `FailedTemporarily`, which also guarantees at most
    /// one load in flight per tile.
    pub fn load_tile_content(
        &mut self,
        arena: &mut TileArena,
        tile: TileHandle,
        externals: &TilesetExternals,
    ) {
        let Some(tile_ref) = arena.get_mut(tile) else {
            return;
        };
        if !matches!(
            tile_ref.load_state,
            TileLoadState::Unloaded | TileLoadState::FailedTemporarily
        ) {
            return;
        }
        tile_ref.load_state = TileLoadState::ContentLoading;
        self.tiles_load_in_progress += 1;

        let input = TileLoadInput {
            tile_id: tile_ref.id.clone(),
            asset_accessor: externals.asset_accessor.clone(),
            request_headers: self.request_headers.clone(),
        };
        let loader = self.loader.clone();
        let prepare = externals.prepare_renderer_resources.clone();
        let sender = self.sender.clone();
        externals.task_processor.start_task(Box::new(move || {
            let result = loader.load_tile_content(&input);
            let load_thread_resources = match (&result.state, &result.content) {
                (TileLoadResultState::Success, TileContentKind::Render(model)) => {
                    prepare.prepare_in_load_thread(model)
                }
                _ => None,
            };
            sender.send(CompletedTileLoad {
                tile,
                result,
                load_thread_resources,
            });
        }));
    }

    /// Drains the completion channel and applies every finished load to
    /// its tile, running the main-thread stages. Returns the tiles whose
    /// loads failed permanently this round, with details, so the owner can
    /// notify and optionally re-arm them.
    pub fn process_completed_loads(
        &mut self,
        arena: &mut TileArena,
        externals: &mut TilesetExternals,
    ) -> Vec<(TileHandle, TilesetLoadFailureDetails)> {
        let mut failures = Vec::new();
        for completed in self.receiver.drain() {
            self.tiles_load_in_progress -= 1;
            let tile = completed.tile;
            if let Some(failure) = self.set_tile_content(arena, completed) {
                failures.push((tile, failure));
            }
            self.update_tile_content(arena, tile, externals);
        }
        failures
    }

    fn set_tile_content(
        &mut self,
        arena: &mut TileArena,
        completed: CompletedTileLoad,
    ) -> Option<TilesetLoadFailureDetails> {
        let Some(tile) = arena.get_mut(completed.tile) else {
            return None;
        };
        debug_assert!(tile.load_state == TileLoadState::ContentLoading);
        let result = completed.result;
        result.errors.log_all("tile load");
        match result.state {
            TileLoadResultState::Success => {
                tile.content.kind = result.content;
                tile.content.load_thread_resources = completed.load_thread_resources;
                if let Some(volume) = result.updated_bounding_volume {
                    tile.bounding_volume = volume;
                }
                self.tiles_data_used += tile.content.size_bytes();
                tile.load_state = TileLoadState::ContentLoaded;
                None
            }
            TileLoadResultState::RetryLater => {
                tile.load_state = TileLoadState::FailedTemporarily;
                None
            }
            TileLoadResultState::Failed => {
                tile.load_state = TileLoadState::Failed;
                Some(TilesetLoadFailureDetails {
                    load_type: TilesetLoadType::TileContent,
                    status_code: result.status_code.unwrap_or(0),
                    message: result
                        .errors
                        .errors
                        .first()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "tile content load failed".to_string()),
                })
            }
        }
    }

    /// Runs the main-thread stage for a `ContentLoaded` tile: child
    /// creation (always a full batch) and renderer preparation, after
    /// which the tile is `Done`.
    pub fn update_tile_content(
        &mut self,
        arena: &mut TileArena,
        tile: TileHandle,
        externals: &mut TilesetExternals,
    ) {
        let Some(tile_ref) = arena.get(tile) else {
            return;
        };
        if tile_ref.load_state != TileLoadState::ContentLoaded {
            return;
        }
        if tile_ref.children.is_empty() {
            if let Some(descriptions) = self.loader.create_child_tiles(tile_ref) {
                arena.create_children(tile, &descriptions);
            }
        }
        let prepare = externals.prepare_renderer_resources.clone();
        if let Some(tile_ref) = arena.get_mut(tile) {
            let load_thread_resources = tile_ref.content.load_thread_resources.take();
            if let TileContentKind::Render(model) = &tile_ref.content.kind {
                tile_ref.content.main_thread_resources =
                    prepare.prepare_in_main_thread(model, load_thread_resources);
            }
            tile_ref.load_state = TileLoadState::Done;
        }
    }

    /// Unloads a tile's content if that is safe. Refuses while a worker
    /// load is in flight and for external content, whose children would
    /// be orphaned.
    pub fn unload_tile_content(
        &mut self,
        arena: &mut TileArena,
        tile: TileHandle,
        externals: &TilesetExternals,
    ) -> bool {
        let Some(tile_ref) = arena.get_mut(tile) else {
            return false;
        };
        match tile_ref.load_state {
            TileLoadState::Unloaded => return true,
            TileLoadState::ContentLoading => return false,
            _ => {}
        }
        if tile_ref.content.is_external() {
            return false;
        }
        self.tiles_data_used -= tile_ref.content.size_bytes();
        let content = std::mem::take(&mut tile_ref.content);
        externals.prepare_renderer_resources.free(
            &tile_ref.id,
            content.load_thread_resources,
            content.main_thread_resources,
        );
        tile_ref.load_state = TileLoadState::Unloaded;
        true
    }
}

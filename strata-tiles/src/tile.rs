use std::collections::HashMap;

use glam::DMat4;
use strata_geo::{BoundingVolume, TileId};

use crate::externals::RendererResources;
use crate::raster::RasterMappedTo3DTile;

/// Stable key into a [`TileArena`]. All cross-references between tiles —
/// parent/child links, selection maps, the loaded-tile list — go through
/// handles, never references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileHandle(pub u64);

/// How a tile's children relate to the tile itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TileRefine {
    /// Children replace this tile entirely.
    #[default]
    Replace,
    /// Children render in addition to this tile.
    Add,
}

/// Content load lifecycle. Transitions are driven on the main thread by the
/// content manager only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TileLoadState {
    #[default]
    Unloaded,
    /// A worker task is producing this tile's content. Exactly one such
    /// task exists per tile.
    ContentLoading,
    /// The worker result has been applied but main-thread work (child
    /// creation, renderer prep) is still pending.
    ContentLoaded,
    Done,
    /// Transient failure; the tile is eligible to be loaded again.
    FailedTemporarily,
    Failed,
}

/// A loaded render payload. The raw data stays opaque to the selection
/// engine; only its size and credits matter here.
#[derive(Clone, Debug, Default)]
pub struct TileModel {
    pub data: bytes::Bytes,
    pub bounding_volume: Option<BoundingVolume>,
    pub credits: Vec<String>,
}

impl TileModel {
    pub fn size_bytes(&self) -> i64 {
        self.data.len() as i64
    }
}

/// A pure-data recipe for a tile, produced by loaders and turned into real
/// tiles by the content manager. Children of one tile are always created
/// from a full batch of these, atomically.
#[derive(Clone, Debug)]
pub struct TileDescription {
    pub id: TileId,
    pub bounding_volume: BoundingVolume,
    pub content_bounding_volume: Option<BoundingVolume>,
    pub geometric_error: f64,
    /// `None` inherits the parent's refine mode.
    pub refine: Option<TileRefine>,
    pub transform: DMat4,
    pub unconditionally_refine: bool,
    pub children: Vec<TileDescription>,
}

#[derive(Debug, Default)]
pub enum TileContentKind {
    #[default]
    Unknown,
    /// The tile exists purely for hierarchy; nothing to render.
    Empty,
    /// The content was another tileset; these children splice into the tree.
    External { children: Vec<TileDescription> },
    Render(TileModel),
}

#[derive(Default)]
pub struct TileContent {
    pub kind: TileContentKind,
    pub load_thread_resources: Option<RendererResources>,
    pub main_thread_resources: Option<RendererResources>,
}

impl TileContent {
    pub fn is_external(&self) -> bool {
        matches!(self.kind, TileContentKind::External { .. })
    }

    pub fn size_bytes(&self) -> i64 {
        match &self.kind {
            TileContentKind::Render(model) => model.size_bytes(),
            _ => 0,
        }
    }
}

pub struct Tile {
    pub handle: TileHandle,
    pub parent: Option<TileHandle>,
    /// Either empty or the complete set of children; never partial.
    pub children: Vec<TileHandle>,
    pub id: TileId,
    pub bounding_volume: BoundingVolume,
    pub content_bounding_volume: Option<BoundingVolume>,
    pub geometric_error: f64,
    pub refine: TileRefine,
    pub transform: DMat4,
    /// Never render this tile; always try to refine past it.
    pub unconditionally_refine: bool,
    pub load_state: TileLoadState,
    pub content: TileContent,
    pub raster_tiles: Vec<RasterMappedTo3DTile>,
    /// Intrusive links for the per-tileset loaded-tile LRU list.
    pub(crate) lru_prev: Option<TileHandle>,
    pub(crate) lru_next: Option<TileHandle>,
    pub(crate) lru_linked: bool,
    /// Frame counter stamp of the last traversal that touched this tile.
    pub(crate) last_frame_visited: u64,
}

impl Tile {
    pub fn new(id: TileId, bounding_volume: BoundingVolume, geometric_error: f64) -> Self {
        Self {
            handle: TileHandle(0),
            parent: None,
            children: Vec::new(),
            id,
            bounding_volume,
            content_bounding_volume: None,
            geometric_error,
            refine: TileRefine::Replace,
            transform: DMat4::IDENTITY,
            unconditionally_refine: false,
            load_state: TileLoadState::Unloaded,
            content: TileContent::default(),
            raster_tiles: Vec::new(),
            lru_prev: None,
            lru_next: None,
            lru_linked: false,
            last_frame_visited: 0,
        }
    }

    pub fn from_description(description: &TileDescription, inherited_refine: TileRefine) -> Self {
        let mut tile = Tile::new(
            description.id.clone(),
            description.bounding_volume.clone(),
            description.geometric_error,
        );
        tile.content_bounding_volume = description.content_bounding_volume.clone();
        tile.refine = description.refine.unwrap_or(inherited_refine);
        tile.transform = description.transform;
        tile.unconditionally_refine = description.unconditionally_refine;
        tile
    }

    /// Whether selecting this tile would not leave a hole on screen. Failed
    /// tiles count as renderable so they never block refinement forever.
    pub fn is_renderable(&self) -> bool {
        matches!(self.load_state, TileLoadState::Done | TileLoadState::Failed)
    }

    pub fn has_render_content(&self) -> bool {
        matches!(self.content.kind, TileContentKind::Render(_))
    }
}

/// HashMap-backed tile storage with a designated root.
#[derive(Default)]
pub struct TileArena {
    tiles: HashMap<TileHandle, Tile>,
    next_handle: u64,
    root: Option<TileHandle>,
}

impl TileArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut tile: Tile) -> TileHandle {
        self.next_handle += 1;
        let handle = TileHandle(self.next_handle);
        tile.handle = handle;
        self.tiles.insert(handle, tile);
        handle
    }

    pub fn insert_root(&mut self, tile: Tile) -> TileHandle {
        let handle = self.insert(tile);
        self.root = Some(handle);
        handle
    }

    pub fn root(&self) -> Option<TileHandle> {
        self.root
    }

    pub fn get(&self, handle: TileHandle) -> Option<&Tile> {
        self.tiles.get(&handle)
    }

    pub fn get_mut(&mut self, handle: TileHandle) -> Option<&mut Tile> {
        self.tiles.get_mut(&handle)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileHandle, &Tile)> {
        self.tiles.iter()
    }

    /// Instantiates `descriptions` (recursively) as the children of
    /// `parent`. Does nothing if the parent already has children, keeping
    /// the empty-or-full invariant.
    pub fn create_children(&mut self, parent: TileHandle, descriptions: &[TileDescription]) {
        let Some(parent_tile) = self.get(parent) else {
            return;
        };
        if !parent_tile.children.is_empty() || descriptions.is_empty() {
            return;
        }
        let inherited_refine = parent_tile.refine;
        let mut created = Vec::with_capacity(descriptions.len());
        for description in descriptions {
            let mut child = Tile::from_description(description, inherited_refine);
            child.parent = Some(parent);
            let child_handle = self.insert(child);
            self.create_children(child_handle, &description.children);
            created.push(child_handle);
        }
        if let Some(parent_tile) = self.get_mut(parent) {
            parent_tile.children = created;
        }
    }
}

//! End-to-end selection scenarios: a small quadtree under a moving camera,
//! driven through `Tileset::update_view` with a deterministic in-thread
//! task processor.

use std::f64::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use glam::{DMat4, DVec3};
use strata_geo::{
    BoundingRegion, BoundingSphere, BoundingVolume, Ellipsoid, GeographicTilingScheme,
    GlobeRectangle, QuadtreeTileId, TileId,
};
use strata_jobs::{TaskProcessor, WorkerTask};
use strata_tiles::loaders::{TileLoadInput, TileLoadResult, TilesetContentLoader};
use strata_tiles::{
    AssetAccessor, AssetRequest, Error, FailureAction, RasterImage, RasterOverlay,
    RasterOverlayTileProvider, RasterSource, Tile, TileContentKind, TileDescription, TileHandle,
    TileLoadState, TileModel, TileSelectionEventReceiver, Tileset, TilesetExternals,
    TilesetOptions, ViewGroupHandle, ViewState,
};

/// Runs every task on the calling thread the moment it is spawned, so a
/// load started in one `update_view` lands in the next.
struct ImmediateTaskProcessor;

impl TaskProcessor for ImmediateTaskProcessor {
    fn start_task(&self, task: WorkerTask) {
        task();
    }
}

/// Holds tasks until the test releases them, to observe in-flight states.
#[derive(Default)]
struct ManualTaskProcessor {
    tasks: Mutex<Vec<WorkerTask>>,
}

impl ManualTaskProcessor {
    fn run_all(&self) {
        let tasks: Vec<WorkerTask> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => return,
        };
        for task in tasks {
            task();
        }
    }
}

impl TaskProcessor for ManualTaskProcessor {
    fn start_task(&self, task: WorkerTask) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }
}

struct Offline;

impl AssetAccessor for Offline {
    fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<AssetRequest, Error> {
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
    ) -> Result<AssetRequest, Error> {
        self.get(url, headers)
    }
}

/// Serves every tile a fixed-size render payload without any network, and
/// counts how many loads it was asked for.
struct CountingLoader {
    loads: AtomicU32,
}

impl CountingLoader {
    fn new() -> Self {
        Self {
            loads: AtomicU32::new(0),
        }
    }
}

impl TilesetContentLoader for CountingLoader {
    fn load_tile_content(&self, _input: &TileLoadInput) -> TileLoadResult {
        self.loads.fetch_add(1, Ordering::SeqCst);
        TileLoadResult::success(TileContentKind::Render(TileModel {
            data: bytes::Bytes::from(vec![0u8; 100]),
            bounding_volume: None,
            credits: vec!["© strata test data".to_string()],
        }))
    }

    fn create_child_tiles(&self, _tile: &Tile) -> Option<Vec<TileDescription>> {
        None
    }
}

/// A one-pixel overlay that needs no network.
struct SolidSource;

impl RasterSource for SolidSource {
    fn load_tile_image(
        &self,
        _id: &QuadtreeTileId,
        _accessor: &Arc<dyn AssetAccessor>,
    ) -> Result<RasterImage, Error> {
        Ok(RasterImage {
            width: 1,
            height: 1,
            channels: 4,
            pixels: bytes::Bytes::from_static(&[255, 255, 255, 255]),
        })
    }
}

struct SolidOverlay;

impl RasterOverlay for SolidOverlay {
    fn name(&self) -> &str {
        "solid"
    }

    fn create_tile_provider(
        &self,
        _externals: &TilesetExternals,
    ) -> Result<RasterOverlayTileProvider, Error> {
        Ok(RasterOverlayTileProvider::new(
            "solid",
            Arc::new(SolidSource),
            GeographicTilingScheme::default(),
            GlobeRectangle::MAX,
            0,
            8,
            256,
            256,
            None,
        ))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    Visible(TileHandle),
    Culled(TileHandle),
    Refined(TileHandle),
    Coarsened(TileHandle),
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn take(&self) -> Vec<Event> {
        self.events.lock().map(|mut e| e.drain(..).collect()).unwrap_or_default()
    }
}

impl TileSelectionEventReceiver for Recorder {
    fn tile_visible(&mut self, tile: TileHandle) {
        let _ = self.events.lock().map(|mut e| e.push(Event::Visible(tile)));
    }
    fn tile_culled(&mut self, tile: TileHandle) {
        let _ = self.events.lock().map(|mut e| e.push(Event::Culled(tile)));
    }
    fn tile_refined(&mut self, tile: TileHandle) {
        let _ = self.events.lock().map(|mut e| e.push(Event::Refined(tile)));
    }
    fn tile_coarsened(&mut self, tile: TileHandle) {
        let _ = self.events.lock().map(|mut e| e.push(Event::Coarsened(tile)));
    }
}

fn sphere(center: DVec3, radius: f64) -> BoundingVolume {
    BoundingVolume::Sphere(BoundingSphere::new(center, radius))
}

fn description(
    level: u32,
    x: u32,
    y: u32,
    center: DVec3,
    geometric_error: f64,
    children: Vec<TileDescription>,
) -> TileDescription {
    TileDescription {
        id: TileId::Quadtree(QuadtreeTileId::new(level, x, y)),
        bounding_volume: sphere(center, 1.0),
        content_bounding_volume: None,
        geometric_error,
        refine: None,
        transform: DMat4::IDENTITY,
        unconditionally_refine: false,
        children,
    }
}

/// Root (error 100) over four children (error 10), all near the origin.
fn two_level_root() -> TileDescription {
    let children = vec![
        description(1, 0, 0, DVec3::new(0.0, -10.0, -10.0), 10.0, vec![]),
        description(1, 1, 0, DVec3::new(0.0, 10.0, -10.0), 10.0, vec![]),
        description(1, 0, 1, DVec3::new(0.0, -10.0, 10.0), 10.0, vec![]),
        description(1, 1, 1, DVec3::new(0.0, 10.0, 10.0), 10.0, vec![]),
    ];
    description(0, 0, 0, DVec3::ZERO, 100.0, children)
}

/// Looking down -X at the origin from `distance` away. With a 1000 px
/// viewport and a 90 degree frustum, sse = 500 * error / distance.
fn view_at(distance: f64) -> ViewState {
    ViewState::new(
        DVec3::new(distance, 0.0, 0.0),
        DVec3::new(-1.0, 0.0, 0.0),
        DVec3::Z,
        1000.0,
        1000.0,
        FRAC_PI_2,
        FRAC_PI_2,
        &Ellipsoid::WGS84,
    )
}

fn tileset_with(processor: Arc<dyn TaskProcessor>, loader: Arc<CountingLoader>) -> Tileset {
    let externals = TilesetExternals::new(Arc::new(Offline), processor);
    let mut options = TilesetOptions::default();
    options.render_tiles_under_camera = false;
    Tileset::new(externals, loader, two_level_root(), options)
}

fn render_list(tileset: &Tileset) -> Vec<TileHandle> {
    tileset
        .view_group(ViewGroupHandle::DEFAULT)
        .unwrap()
        .result
        .tiles_to_render_this_frame
        .clone()
}

#[test]
fn far_camera_settles_on_the_root_alone() {
    let loader = Arc::new(CountingLoader::new());
    let mut tileset = tileset_with(Arc::new(ImmediateTaskProcessor), loader.clone());
    // Root sse = 500 * 100 / 10000 = 5 < 16: the root satisfies the view.
    let frusta = [view_at(10_000.0)];

    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    let root = tileset.root().unwrap();
    assert_eq!(render_list(&tileset), vec![root]);

    // The root's load landed between frames; nothing further is wanted.
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    assert_eq!(render_list(&tileset), vec![root]);
    assert_eq!(
        tileset.arena().get(root).unwrap().load_state,
        TileLoadState::Done
    );
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn refinement_kicks_children_until_they_are_renderable() {
    let loader = Arc::new(CountingLoader::new());
    let mut tileset = tileset_with(Arc::new(ImmediateTaskProcessor), loader.clone());
    // Root sse = 500 * 100 / 1000 = 50 >= 16, children 5 < 16: refine.
    let frusta = [view_at(1_000.0)];

    // Frame 1: children are selected but unrenderable, so they are kicked
    // and the root holds the screen.
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    let root = tileset.root().unwrap();
    assert_eq!(render_list(&tileset), vec![root]);
    let result = &tileset.view_group(ViewGroupHandle::DEFAULT).unwrap().result;
    assert_eq!(result.tiles_kicked, 4);
    assert_eq!(result.tiles_visited, 5);

    // Frame 2: every load landed, the four children replace the root.
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    let rendered = render_list(&tileset);
    assert_eq!(rendered.len(), 4);
    assert!(!rendered.contains(&root));
    for handle in &rendered {
        assert_eq!(
            tileset.arena().get(*handle).unwrap().load_state,
            TileLoadState::Done
        );
    }
    assert_eq!(
        tileset.view_group(ViewGroupHandle::DEFAULT).unwrap().result.tiles_kicked,
        0
    );
}

#[test]
fn selection_events_follow_the_rendered_diff() {
    let loader = Arc::new(CountingLoader::new());
    let mut tileset = tileset_with(Arc::new(ImmediateTaskProcessor), loader);
    let recorder = Recorder::default();
    tileset.view_group_mut(ViewGroupHandle::DEFAULT).unwrap().event_receiver =
        Some(Box::new(recorder.clone()));

    let near = [view_at(1_000.0)];
    let far = [view_at(10_000.0)];
    let root = tileset.root().unwrap();

    // Frame 1: the root appears (children were kicked, which is not a
    // rendered state).
    tileset.update_view(ViewGroupHandle::DEFAULT, &near).unwrap();
    assert_eq!(recorder.take(), vec![Event::Visible(root)]);

    // Frame 2: the root refines into its four children.
    tileset.update_view(ViewGroupHandle::DEFAULT, &near).unwrap();
    let events = recorder.take();
    assert!(events.contains(&Event::Refined(root)));
    assert_eq!(
        events.iter().filter(|e| matches!(e, Event::Visible(_))).count(),
        4
    );
    assert_eq!(events.len(), 5);

    // Frame 3: zooming out coarsens the children back into the root.
    tileset.update_view(ViewGroupHandle::DEFAULT, &far).unwrap();
    let events = recorder.take();
    assert!(events.contains(&Event::Visible(root)));
    assert_eq!(
        events.iter().filter(|e| matches!(e, Event::Coarsened(_))).count(),
        4
    );
}

#[test]
fn each_tile_loads_at_most_once_while_in_flight() {
    let loader = Arc::new(CountingLoader::new());
    let processor = Arc::new(ManualTaskProcessor::default());
    let mut tileset = tileset_with(processor.clone(), loader.clone());
    let frusta = [view_at(1_000.0)];

    // Loads start but never land while the processor holds them; repeated
    // frames must not start duplicates.
    for _ in 0..3 {
        tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    }
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    assert_eq!(tileset.tiles_load_in_progress(), 5);

    processor.run_all();
    assert_eq!(loader.loads.load(Ordering::SeqCst), 5);

    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    assert_eq!(tileset.tiles_load_in_progress(), 0);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 5);
}

#[test]
fn descendant_limit_rolls_queued_loads_back_to_the_parent() {
    let loader = Arc::new(CountingLoader::new());
    let processor = Arc::new(ManualTaskProcessor::default());
    let externals = TilesetExternals::new(Arc::new(Offline), processor);
    let mut options = TilesetOptions::default();
    options.render_tiles_under_camera = false;
    options.loading_descendant_limit = 2;
    let mut tileset = Tileset::new(externals, loader, two_level_root(), options);

    let frusta = [view_at(1_000.0)];
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    let result = &tileset.view_group(ViewGroupHandle::DEFAULT).unwrap().result;
    // Four unrenderable children exceed the limit of two: their queued
    // loads are rolled back and only the root remains queued.
    assert_eq!(result.tiles_kicked, 4);
    assert_eq!(result.tiles_loading_medium_priority, 1);
    assert_eq!(tileset.tiles_load_in_progress(), 1);
}

#[test]
fn eviction_spares_the_root_and_tiles_visited_this_frame() {
    let loader = Arc::new(CountingLoader::new());
    let mut tileset = tileset_with(Arc::new(ImmediateTaskProcessor), loader);
    let near = [view_at(1_000.0)];
    let far = [view_at(10_000.0)];

    // Load the whole tree: 5 tiles x 100 bytes.
    tileset.update_view(ViewGroupHandle::DEFAULT, &near).unwrap();
    tileset.update_view(ViewGroupHandle::DEFAULT, &near).unwrap();
    assert_eq!(tileset.tiles_data_used(), 500);

    // Zoom out and shrink the budget: the children, no longer visited,
    // are shed oldest-first until the cache fits.
    tileset.options.maximum_cached_bytes = 150;
    tileset.update_view(ViewGroupHandle::DEFAULT, &far).unwrap();
    assert!(tileset.tiles_data_used() <= 150);

    let root = tileset.root().unwrap();
    assert_eq!(
        tileset.arena().get(root).unwrap().load_state,
        TileLoadState::Done
    );
    let children = tileset.arena().get(root).unwrap().children.clone();
    let unloaded = children
        .iter()
        .filter(|&&c| tileset.arena().get(c).unwrap().load_state == TileLoadState::Unloaded)
        .count();
    assert_eq!(unloaded, 4);

    // A full trim still refuses to touch what this frame rendered.
    tileset.trim_loaded_tiles(0);
    assert_eq!(
        tileset.arena().get(root).unwrap().load_state,
        TileLoadState::Done
    );
}

#[test]
fn failure_callback_can_rearm_a_failed_tile() {
    struct FailingLoader;

    impl TilesetContentLoader for FailingLoader {
        fn load_tile_content(&self, _input: &TileLoadInput) -> TileLoadResult {
            TileLoadResult::failed(Error::HttpStatus {
                url: "https://x/tile.b3dm".to_string(),
                status: 404,
            })
        }

        fn create_child_tiles(&self, _tile: &Tile) -> Option<Vec<TileDescription>> {
            None
        }
    }

    let externals = TilesetExternals::new(Arc::new(Offline), Arc::new(ImmediateTaskProcessor));
    let mut options = TilesetOptions::default();
    options.render_tiles_under_camera = false;
    let notified = Arc::new(AtomicU32::new(0));
    let counter = notified.clone();
    options.on_load_failure = Some(Box::new(move |details| {
        assert_eq!(details.status_code, 404);
        counter.fetch_add(1, Ordering::SeqCst);
        FailureAction::Retry
    }));
    let root = description(0, 0, 0, DVec3::ZERO, 100.0, vec![]);
    let mut tileset = Tileset::new(externals, Arc::new(FailingLoader), root, options);

    let frusta = [view_at(1_000.0)];
    // Each frame: the previous failure is reported, the tile is re-armed,
    // and a fresh attempt starts (and fails again).
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 2);
    let root = tileset.root().unwrap();
    assert_ne!(
        tileset.arena().get(root).unwrap().load_state,
        TileLoadState::Failed
    );
}

#[test]
fn view_groups_keep_their_own_selection_history() {
    let externals = TilesetExternals::new(Arc::new(Offline), Arc::new(ImmediateTaskProcessor));
    let mut options = TilesetOptions::default();
    options.render_tiles_under_camera = false;
    let root = description(0, 0, 0, DVec3::ZERO, 100.0, vec![]);
    let mut tileset = Tileset::new(externals, Arc::new(CountingLoader::new()), root, options);
    let second = tileset.create_view_group(1.0);
    let recorder_a = Recorder::default();
    let recorder_b = Recorder::default();
    tileset.view_group_mut(ViewGroupHandle::DEFAULT).unwrap().event_receiver =
        Some(Box::new(recorder_a.clone()));
    tileset.view_group_mut(second).unwrap().event_receiver = Some(Box::new(recorder_b.clone()));

    let frusta = [view_at(10_000.0)];
    let root = tileset.root().unwrap();

    // Each group announces the root once, on its own first frame.
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    assert_eq!(recorder_a.take(), vec![Event::Visible(root)]);
    tileset.update_view(second, &frusta).unwrap();
    assert_eq!(recorder_b.take(), vec![Event::Visible(root)]);

    // Under a static camera, alternating updates stay silent for both:
    // each group diffs against its own previous frame, not the other's.
    for _ in 0..3 {
        tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
        tileset.update_view(second, &frusta).unwrap();
        assert_eq!(recorder_a.take(), vec![]);
        assert_eq!(recorder_b.take(), vec![]);
    }
}

#[test]
fn eviction_spares_tiles_another_group_still_renders() {
    let loader = Arc::new(CountingLoader::new());
    let mut tileset = tileset_with(Arc::new(ImmediateTaskProcessor), loader);
    let second = tileset.create_view_group(1.0);
    let near = [view_at(1_000.0)];
    let far = [view_at(10_000.0)];

    // The default group settles on the four children, the second on the
    // root alone.
    tileset.update_view(ViewGroupHandle::DEFAULT, &near).unwrap();
    tileset.update_view(ViewGroupHandle::DEFAULT, &near).unwrap();
    tileset.update_view(second, &far).unwrap();
    assert_eq!(tileset.tiles_data_used(), 500);

    // The second group's update runs over budget, but the children were
    // visited by the default group's latest frame and must survive.
    tileset.options.maximum_cached_bytes = 150;
    tileset.update_view(second, &far).unwrap();
    assert_eq!(tileset.tiles_data_used(), 500);
    let children = tileset
        .arena()
        .get(tileset.root().unwrap())
        .unwrap()
        .children
        .clone();
    for child in children {
        assert_eq!(
            tileset.arena().get(child).unwrap().load_state,
            TileLoadState::Done
        );
    }
}

#[test]
fn raising_the_error_threshold_only_coarsens_the_selection() {
    let loader = Arc::new(CountingLoader::new());
    let mut tileset = tileset_with(Arc::new(ImmediateTaskProcessor), loader);
    let frusta = [view_at(1_000.0)];

    // At the default 16 px threshold the root (sse 50) refines into its
    // four children.
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    let fine = render_list(&tileset);
    assert_eq!(fine.len(), 4);

    // At 64 px the root (sse 50) satisfies the view by itself; nothing
    // deeper than before is selected.
    tileset.options.maximum_screen_space_error = 64.0;
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    let coarse = render_list(&tileset);
    assert_eq!(coarse, vec![tileset.root().unwrap()]);
    assert!(!fine.contains(&tileset.root().unwrap()));
}

#[test]
fn overlays_added_later_reach_already_loaded_tiles() {
    let externals = TilesetExternals::new(Arc::new(Offline), Arc::new(ImmediateTaskProcessor));
    let mut options = TilesetOptions::default();
    options.enable_frustum_culling = false;
    // A region-bounded root, so the tile has a globe rectangle to drape.
    let root = TileDescription {
        id: TileId::Quadtree(QuadtreeTileId::new(0, 0, 0)),
        bounding_volume: BoundingVolume::Region(BoundingRegion::new(
            GlobeRectangle::from_degrees(-10.0, -10.0, 10.0, 10.0),
            0.0,
            1000.0,
        )),
        content_bounding_volume: None,
        geometric_error: 100.0,
        refine: None,
        transform: DMat4::IDENTITY,
        unconditionally_refine: false,
        children: vec![],
    };
    let mut tileset = Tileset::new(externals, Arc::new(CountingLoader::new()), root, options);
    tileset.add_overlay(&SolidOverlay).unwrap();

    let frusta = [view_at(1_000.0)];
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    let root = tileset.root().unwrap();
    let mapped: Vec<usize> = tileset
        .arena()
        .get(root)
        .unwrap()
        .raster_tiles
        .iter()
        .map(|m| m.overlay_index)
        .collect();
    assert_eq!(mapped, vec![0]);

    // A second overlay added after the tile was mapped still drapes it.
    tileset.add_overlay(&SolidOverlay).unwrap();
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    let mapped: Vec<usize> = tileset
        .arena()
        .get(root)
        .unwrap()
        .raster_tiles
        .iter()
        .map(|m| m.overlay_index)
        .collect();
    assert_eq!(mapped, vec![0, 1]);
}

#[test]
fn culled_subtrees_are_not_rendered_but_may_preload() {
    let loader = Arc::new(CountingLoader::new());
    let processor = Arc::new(ManualTaskProcessor::default());
    let externals = TilesetExternals::new(Arc::new(Offline), processor);
    let mut options = TilesetOptions::default();
    options.render_tiles_under_camera = false;
    // A scene far off to the side of the view direction.
    let root = description(0, 0, 0, DVec3::new(0.0, 100_000.0, 0.0), 100.0, vec![]);
    let mut tileset = Tileset::new(externals, loader, root, options);

    let frusta = [view_at(1_000.0)];
    tileset.update_view(ViewGroupHandle::DEFAULT, &frusta).unwrap();
    let result = &tileset.view_group(ViewGroupHandle::DEFAULT).unwrap().result;
    assert!(result.tiles_to_render_this_frame.is_empty());
    assert_eq!(result.tiles_culled, 1);
    // preload_siblings queued the culled root at low priority.
    assert_eq!(result.tiles_loading_low_priority, 1);
}

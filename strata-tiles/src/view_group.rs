use std::collections::HashMap;

use crate::credits::Credit;
use crate::externals::TileSelectionEventReceiver;
use crate::selection_state::{TileSelectionResult, TileSelectionState};
use crate::tile::TileHandle;

/// Which of the three per-frame load queues a tile lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadQueueKind {
    /// Tiles blocking refinement the view needs right now.
    High,
    /// Tiles wanted for rendering this frame.
    Medium,
    /// Preloads: ancestors and culled siblings.
    Low,
}

/// A queued content load. Lower priority values load sooner.
#[derive(Clone, Copy, Debug)]
pub struct TileLoadRequest {
    pub tile: TileHandle,
    pub priority: f64,
}

/// What one `update_view` produced for one view group.
#[derive(Debug, Default)]
pub struct ViewUpdateResult {
    pub tiles_to_render_this_frame: Vec<TileHandle>,
    pub tiles_visited: u32,
    pub culled_tiles_visited: u32,
    pub tiles_culled: u32,
    pub tiles_kicked: u32,
    pub max_depth_visited: u32,
    pub tiles_loading_high_priority: u32,
    pub tiles_loading_medium_priority: u32,
    pub tiles_loading_low_priority: u32,
    pub credits: Vec<Credit>,
    pub frame_number: u64,
}

/// One consumer of a tileset's selection: its own double-buffered selection
/// states, its own frame counter, its own load queues, and a weight that
/// sets its share of the load slots when several groups compete.
///
/// The frame counter is per group. Selection states are stamped and
/// validated against it, so a group that updates every other tileset frame
/// still sees its own previous frame, not some other group's.
pub struct TilesetViewGroup {
    pub weight: f64,
    pub event_receiver: Option<Box<dyn TileSelectionEventReceiver>>,
    pub result: ViewUpdateResult,
    previous_states: HashMap<TileHandle, TileSelectionState>,
    current_states: HashMap<TileHandle, TileSelectionState>,
    current_frame: u64,
    last_frame: u64,
    /// The tileset-wide frame of this group's most recent update.
    last_update_frame: u64,
    pub(crate) high_priority_queue: Vec<TileLoadRequest>,
    pub(crate) medium_priority_queue: Vec<TileLoadRequest>,
    pub(crate) low_priority_queue: Vec<TileLoadRequest>,
}

impl Default for TilesetViewGroup {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl TilesetViewGroup {
    pub fn new(weight: f64) -> Self {
        Self {
            weight,
            event_receiver: None,
            result: ViewUpdateResult::default(),
            previous_states: HashMap::new(),
            current_states: HashMap::new(),
            current_frame: 0,
            last_frame: 0,
            last_update_frame: 0,
            high_priority_queue: Vec::new(),
            medium_priority_queue: Vec::new(),
            low_priority_queue: Vec::new(),
        }
    }

    pub fn previous_state(&self, tile: TileHandle) -> TileSelectionState {
        self.previous_states.get(&tile).copied().unwrap_or_default()
    }

    pub fn current_state(&self, tile: TileHandle) -> TileSelectionState {
        self.current_states.get(&tile).copied().unwrap_or_default()
    }

    pub fn set_current_state(&mut self, tile: TileHandle, state: TileSelectionState) {
        self.current_states.insert(tile, state);
    }

    pub fn kick_current_state(&mut self, tile: TileHandle) {
        if let Some(state) = self.current_states.get_mut(&tile) {
            state.kick();
        }
    }

    /// This group's frame number, bumped once per update of this group.
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn last_frame(&self) -> u64 {
        self.last_frame
    }

    pub(crate) fn last_update_frame(&self) -> u64 {
        self.last_update_frame
    }

    /// Advances this group's frame, swaps the selection buffers and resets
    /// per-frame scratch. `tileset_frame` is the tileset-wide frame this
    /// update runs in.
    pub(crate) fn start_frame(&mut self, tileset_frame: u64) {
        self.last_frame = self.current_frame;
        self.current_frame += 1;
        self.last_update_frame = tileset_frame;
        std::mem::swap(&mut self.previous_states, &mut self.current_states);
        self.current_states.clear();
        self.high_priority_queue.clear();
        self.medium_priority_queue.clear();
        self.low_priority_queue.clear();
        self.result = ViewUpdateResult {
            frame_number: self.current_frame,
            ..ViewUpdateResult::default()
        };
    }

    pub(crate) fn finish_frame(&mut self) {
        self.result.tiles_loading_high_priority = self.high_priority_queue.len() as u32;
        self.result.tiles_loading_medium_priority = self.medium_priority_queue.len() as u32;
        self.result.tiles_loading_low_priority = self.low_priority_queue.len() as u32;
        self.emit_selection_events(self.current_frame, self.last_frame);
    }

    /// Notifies the receiver of every tile whose rendered/not-rendered
    /// status changed between the previous frame and this one.
    fn emit_selection_events(&mut self, frame_number: u64, last_frame_number: u64) {
        let Some(receiver) = self.event_receiver.as_mut() else {
            return;
        };
        for (&tile, previous) in &self.previous_states {
            if previous.result(last_frame_number) != TileSelectionResult::RENDERED {
                continue;
            }
            let current = self
                .current_states
                .get(&tile)
                .map(|s| s.result(frame_number))
                .unwrap_or(TileSelectionResult::NONE);
            if current == TileSelectionResult::RENDERED {
                continue;
            }
            if current.was_kicked() {
                receiver.tile_coarsened(tile);
            } else if current.original_result() == TileSelectionResult::REFINED {
                receiver.tile_refined(tile);
            } else if current.original_result() == TileSelectionResult::CULLED {
                receiver.tile_culled(tile);
            } else {
                receiver.tile_coarsened(tile);
            }
        }
        for (&tile, current) in &self.current_states {
            if current.result(frame_number) != TileSelectionResult::RENDERED {
                continue;
            }
            let previous = self
                .previous_states
                .get(&tile)
                .map(|s| s.result(last_frame_number))
                .unwrap_or(TileSelectionResult::NONE);
            if previous != TileSelectionResult::RENDERED {
                receiver.tile_visible(tile);
            }
        }
    }

    pub(crate) fn add_to_load_queue(
        &mut self,
        kind: LoadQueueKind,
        tile: TileHandle,
        priority: f64,
    ) {
        let request = TileLoadRequest { tile, priority };
        match kind {
            LoadQueueKind::High => self.high_priority_queue.push(request),
            LoadQueueKind::Medium => self.medium_priority_queue.push(request),
            LoadQueueKind::Low => self.low_priority_queue.push(request),
        }
    }

    /// Current queue lengths, so a refining visit can roll newly queued
    /// descendants back when it kicks them.
    pub(crate) fn load_queue_marks(&self) -> (usize, usize, usize) {
        (
            self.high_priority_queue.len(),
            self.medium_priority_queue.len(),
            self.low_priority_queue.len(),
        )
    }

    pub(crate) fn truncate_load_queues(&mut self, marks: (usize, usize, usize)) {
        self.high_priority_queue.truncate(marks.0);
        self.medium_priority_queue.truncate(marks.1);
        self.low_priority_queue.truncate(marks.2);
    }

    /// All queued loads, most urgent first: the high queue before medium
    /// before low, each sorted so lower priority values come first.
    pub(crate) fn collect_load_requests(&self) -> Vec<TileLoadRequest> {
        let mut ordered = Vec::with_capacity(
            self.high_priority_queue.len()
                + self.medium_priority_queue.len()
                + self.low_priority_queue.len(),
        );
        for queue in [
            &self.high_priority_queue,
            &self.medium_priority_queue,
            &self.low_priority_queue,
        ] {
            let mut requests = queue.clone();
            requests.sort_unstable_by(|a, b| a.priority.total_cmp(&b.priority));
            ordered.extend(requests);
        }
        ordered
    }
}

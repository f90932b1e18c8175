//! The per-frame selection walk: frustum culling, screen-space-error
//! refinement, kicked descendants and load-queue construction.

use strata_geo::{BoundingVolume, Ellipsoid, Intersect};

use crate::cache::LoadedTileList;
use crate::externals::TileExcluder;
use crate::selection_state::{TileSelectionResult, TileSelectionState};
use crate::tile::{TileArena, TileHandle, TileLoadState, TileRefine};
use crate::tileset::TilesetOptions;
use crate::view_group::{LoadQueueKind, TilesetViewGroup};
use crate::view_state::ViewState;

/// What a subtree visit reports back to its parent.
#[derive(Clone, Copy, Debug)]
pub struct TraversalDetails {
    /// Every selected tile in the subtree is renderable right now.
    pub all_are_renderable: bool,
    /// At least one selected tile was rendered (for real) last frame.
    pub any_were_rendered_last_frame: bool,
    /// Selected tiles still waiting on content.
    pub not_yet_renderable_count: u32,
}

impl Default for TraversalDetails {
    fn default() -> Self {
        Self {
            all_are_renderable: true,
            any_were_rendered_last_frame: false,
            not_yet_renderable_count: 0,
        }
    }
}

impl TraversalDetails {
    fn combine(&mut self, other: &TraversalDetails) {
        self.all_are_renderable &= other.all_are_renderable;
        self.any_were_rendered_last_frame |= other.any_were_rendered_last_frame;
        self.not_yet_renderable_count += other.not_yet_renderable_count;
    }
}

struct TileMetrics {
    distance: f64,
    sse: f64,
    priority: f64,
}

pub(crate) struct Traversal<'a> {
    pub arena: &'a mut TileArena,
    pub loaded: &'a mut LoadedTileList,
    pub group: &'a mut TilesetViewGroup,
    pub options: &'a TilesetOptions,
    pub excluders: &'a [Box<dyn TileExcluder>],
    pub frusta: &'a [ViewState],
    pub ellipsoid: &'a Ellipsoid,
    /// The group's own frame; selection states are stamped with it.
    pub frame_number: u64,
    pub last_frame_number: u64,
    /// The tileset-wide frame; visit stamps for cache eviction use it.
    pub global_frame: u64,
    /// Dynamic screen-space-error multiplier for this frame, >= 1.
    pub sse_scale: f64,
}

impl Traversal<'_> {
    pub fn run(&mut self, root: TileHandle) {
        let _ = self.visit_tile_if_needed(0, false, root);
    }

    fn metrics(&self, volume: &BoundingVolume, geometric_error: f64) -> TileMetrics {
        let mut distance = f64::MAX;
        let mut sse = 0.0f64;
        for view in self.frusta {
            let d = volume
                .distance_squared_to(view.position, self.ellipsoid)
                .sqrt();
            distance = distance.min(d);
            sse = sse.max(view.screen_space_error(geometric_error, d));
        }
        let priority = match self.frusta.first() {
            Some(view) => {
                let center = volume.center(self.ellipsoid);
                let to_tile = center - view.position;
                match to_tile.try_normalize() {
                    Some(direction) => (1.0 - direction.dot(view.direction)) * distance,
                    None => 0.0,
                }
            }
            None => distance,
        };
        TileMetrics {
            distance,
            sse,
            priority,
        }
    }

    fn is_visible(&self, volume: &BoundingVolume) -> bool {
        if !self.options.enable_frustum_culling {
            return true;
        }
        for view in self.frusta {
            if view.culling_volume.visibility(volume, self.ellipsoid) != Intersect::Outside {
                return true;
            }
        }
        if self.options.render_tiles_under_camera {
            if let Some(rectangle) = volume.estimate_globe_rectangle() {
                for view in self.frusta {
                    if let Some(position) = &view.position_cartographic {
                        if rectangle.contains(position) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Stamps the tile as touched this frame and keeps the loaded-tile
    /// list in recency order.
    fn mark_tile_visited(&mut self, tile: TileHandle) {
        let has_content = match self.arena.get_mut(tile) {
            Some(t) => {
                t.last_frame_visited = self.global_frame;
                t.load_state != TileLoadState::Unloaded
            }
            None => return,
        };
        if has_content {
            self.loaded.mark_visited(self.arena, tile);
        }
    }

    /// Queues a content load, provided the tile actually needs one.
    fn queue_load(&mut self, kind: LoadQueueKind, tile: TileHandle, priority: f64) -> bool {
        let Some(t) = self.arena.get(tile) else {
            return false;
        };
        if !matches!(
            t.load_state,
            TileLoadState::Unloaded | TileLoadState::FailedTemporarily
        ) {
            return false;
        }
        self.group.add_to_load_queue(kind, tile, priority);
        true
    }

    fn visit_tile_if_needed(
        &mut self,
        depth: u32,
        ancestor_meets_sse: bool,
        tile: TileHandle,
    ) -> TraversalDetails {
        let Some(t) = self.arena.get(tile) else {
            return TraversalDetails::default();
        };
        let volume = t.bounding_volume.clone();
        let geometric_error = t.geometric_error;
        let excluded = self.excluders.iter().any(|e| e.should_exclude(t));
        if excluded {
            self.group.set_current_state(
                tile,
                TileSelectionState::new(self.frame_number, TileSelectionResult::CULLED),
            );
            return TraversalDetails::default();
        }

        if self.is_visible(&volume) {
            return self.visit_tile(depth, ancestor_meets_sse, tile);
        }

        // Culled. Maybe still worth loading, never worth rendering.
        self.group.result.tiles_culled += 1;
        let metrics = self.metrics(&volume, geometric_error);
        if self.options.enforce_culled_screen_space_error
            && metrics.sse >= self.options.culled_screen_space_error
        {
            self.visit_culled(depth, tile);
            return TraversalDetails::default();
        } else if self.options.preload_siblings
            && self.queue_load(LoadQueueKind::Low, tile, metrics.priority)
        {
            self.group.set_current_state(
                tile,
                TileSelectionState::new(self.frame_number, TileSelectionResult::CULLED_BUT_NEEDED),
            );
            return TraversalDetails::default();
        }
        self.group.set_current_state(
            tile,
            TileSelectionState::new(self.frame_number, TileSelectionResult::CULLED),
        );
        TraversalDetails::default()
    }

    /// Walks a culled subtree down to the culled screen-space-error
    /// threshold, queueing loads without selecting anything for render.
    fn visit_culled(&mut self, depth: u32, tile: TileHandle) {
        let Some(t) = self.arena.get(tile) else {
            return;
        };
        let volume = t.bounding_volume.clone();
        let geometric_error = t.geometric_error;
        let children = t.children.clone();
        self.group.result.culled_tiles_visited += 1;
        self.mark_tile_visited(tile);

        let metrics = self.metrics(&volume, geometric_error);
        if self.queue_load(LoadQueueKind::Low, tile, metrics.priority) {
            self.group.set_current_state(
                tile,
                TileSelectionState::new(self.frame_number, TileSelectionResult::CULLED_BUT_NEEDED),
            );
        } else {
            self.group.set_current_state(
                tile,
                TileSelectionState::new(self.frame_number, TileSelectionResult::CULLED),
            );
        }
        if metrics.sse >= self.options.culled_screen_space_error {
            for child in children {
                self.visit_culled(depth + 1, child);
            }
        }
    }

    fn visit_tile(
        &mut self,
        depth: u32,
        ancestor_meets_sse: bool,
        tile: TileHandle,
    ) -> TraversalDetails {
        self.group.result.tiles_visited += 1;
        self.group.result.max_depth_visited = self.group.result.max_depth_visited.max(depth);
        self.mark_tile_visited(tile);

        let Some(t) = self.arena.get(tile) else {
            return TraversalDetails::default();
        };
        let volume = t.bounding_volume.clone();
        let geometric_error = t.geometric_error;
        let children = t.children.clone();
        let refine = t.refine;
        let unconditionally_refine = t.unconditionally_refine;
        let renderable = t.is_renderable();

        let metrics = self.metrics(&volume, geometric_error);
        let last_state = self.group.previous_state(tile);
        let last_result = last_state.result(self.last_frame_number);
        let was_rendered_last_frame = last_result == TileSelectionResult::RENDERED;

        if children.is_empty() {
            return self.render_tile(tile, renderable, was_rendered_last_frame, &metrics, false);
        }

        let threshold = self.options.maximum_screen_space_error * self.sse_scale;
        let meets_sse = metrics.sse < threshold && !unconditionally_refine;
        let want_to_refine = unconditionally_refine || (!meets_sse && !ancestor_meets_sse);

        let mut queued_for_load = false;
        let mut ancestor_meets_sse_for_children = ancestor_meets_sse;

        if !want_to_refine {
            // This is the detail level the view wants.
            let should_render = was_rendered_last_frame
                || last_result.original_result() == TileSelectionResult::CULLED
                || last_result == TileSelectionResult::NONE
                || renderable;
            if should_render {
                return self.render_tile(tile, renderable, was_rendered_last_frame, &metrics, false);
            }
            // Wanted but not renderable and was refined last frame: keep
            // showing descendants, load this tile urgently, and stop
            // descendants from refining deeper than needed.
            ancestor_meets_sse_for_children = true;
            queued_for_load = self.queue_load(LoadQueueKind::High, tile, metrics.priority);
        }

        if refine == TileRefine::Add {
            // Additive: this tile renders alongside its children.
            self.push_render(tile);
            if !queued_for_load {
                queued_for_load = self.queue_load(LoadQueueKind::Medium, tile, metrics.priority);
            }
        }

        let first_rendered_descendant_index = self.group.result.tiles_to_render_this_frame.len();
        let queue_marks = self.group.load_queue_marks();

        let mut details =
            self.visit_children_near_to_far(depth, ancestor_meets_sse_for_children, &children);

        if refine == TileRefine::Replace
            && !details.all_are_renderable
            && !details.any_were_rendered_last_frame
        {
            // Descendants would pop in from nothing; render this tile and
            // kick them until they are ready.
            let was_really_rendered = was_rendered_last_frame && renderable;
            if !was_really_rendered
                && details.not_yet_renderable_count > self.options.loading_descendant_limit
            {
                // Too much of the subtree is missing; don't spend load slots
                // on it yet.
                self.group.truncate_load_queues(queue_marks);
                details.not_yet_renderable_count = 0;
            }
            self.kick_descendants(first_rendered_descendant_index);
            let mut result =
                self.render_tile(tile, renderable, was_rendered_last_frame, &metrics, queued_for_load);
            result.not_yet_renderable_count += details.not_yet_renderable_count;
            return result;
        }

        if refine == TileRefine::Add {
            details.all_are_renderable &= renderable;
            details.any_were_rendered_last_frame |= was_rendered_last_frame;
            details.not_yet_renderable_count += u32::from(!renderable);
            self.group.set_current_state(
                tile,
                TileSelectionState::new(self.frame_number, TileSelectionResult::RENDERED),
            );
        } else {
            self.group.set_current_state(
                tile,
                TileSelectionState::new(self.frame_number, TileSelectionResult::REFINED),
            );
        }

        if self.options.preload_ancestors && !queued_for_load {
            self.queue_load(LoadQueueKind::Low, tile, metrics.priority);
        }

        details
    }

    fn visit_children_near_to_far(
        &mut self,
        depth: u32,
        ancestor_meets_sse: bool,
        children: &[TileHandle],
    ) -> TraversalDetails {
        let mut ordered: Vec<(f64, TileHandle)> = children
            .iter()
            .filter_map(|&child| {
                let t = self.arena.get(child)?;
                let metrics = self.metrics(&t.bounding_volume, t.geometric_error);
                Some((metrics.distance, child))
            })
            .collect();
        ordered.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut details = TraversalDetails::default();
        for (_, child) in ordered {
            let child_details = self.visit_tile_if_needed(depth + 1, ancestor_meets_sse, child);
            details.combine(&child_details);
        }
        details
    }

    fn push_render(&mut self, tile: TileHandle) {
        self.group.result.tiles_to_render_this_frame.push(tile);
    }

    /// Selects the tile for rendering this frame and reports its subtree
    /// details.
    fn render_tile(
        &mut self,
        tile: TileHandle,
        renderable: bool,
        was_rendered_last_frame: bool,
        metrics: &TileMetrics,
        already_queued: bool,
    ) -> TraversalDetails {
        if !already_queued {
            self.queue_load(LoadQueueKind::Medium, tile, metrics.priority);
        }
        self.push_render(tile);
        self.group.set_current_state(
            tile,
            TileSelectionState::new(self.frame_number, TileSelectionResult::RENDERED),
        );
        TraversalDetails {
            all_are_renderable: renderable,
            any_were_rendered_last_frame: was_rendered_last_frame,
            not_yet_renderable_count: u32::from(!renderable),
        }
    }

    /// Removes the descendants selected after `first_index` from the
    /// render list again, remembering in their selection states that they
    /// were kicked.
    fn kick_descendants(&mut self, first_index: usize) {
        let kicked: Vec<TileHandle> = self
            .group
            .result
            .tiles_to_render_this_frame
            .drain(first_index..)
            .collect();
        self.group.result.tiles_kicked += kicked.len() as u32;
        for tile in kicked {
            self.group.kick_current_state(tile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_combine_like_their_names_say() {
        let mut a = TraversalDetails::default();
        assert!(a.all_are_renderable);
        a.combine(&TraversalDetails {
            all_are_renderable: false,
            any_were_rendered_last_frame: true,
            not_yet_renderable_count: 2,
        });
        a.combine(&TraversalDetails {
            all_are_renderable: true,
            any_were_rendered_last_frame: false,
            not_yet_renderable_count: 1,
        });
        assert!(!a.all_are_renderable);
        assert!(a.any_were_rendered_last_frame);
        assert_eq!(a.not_yet_renderable_count, 3);
    }
}

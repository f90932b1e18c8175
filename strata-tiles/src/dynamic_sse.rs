use glam::DVec3;
use strata_geo::EPSILON5;

/// Relaxes the screen-space-error threshold while the view sits still over
/// its cache budget: after four stationary frames the scale grows by 0.1
/// each frame, so distant detail stops being requested. Any camera movement
/// snaps it back to 1.
pub struct DynamicSseScale {
    scale: f64,
    stationary_frames: u32,
    last_position: Option<DVec3>,
}

const STATIONARY_FRAMES_BEFORE_RAMP: u32 = 4;
const SCALE_STEP_PER_FRAME: f64 = 0.1;

impl Default for DynamicSseScale {
    fn default() -> Self {
        Self {
            scale: 1.0,
            stationary_frames: 0,
            last_position: None,
        }
    }
}

impl DynamicSseScale {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn update(&mut self, position: DVec3, over_budget: bool) -> f64 {
        let moved = match self.last_position {
            Some(last) => last.distance_squared(position) > EPSILON5,
            None => true,
        };
        self.last_position = Some(position);
        if moved {
            self.stationary_frames = 0;
            self.scale = 1.0;
        } else {
            self.stationary_frames = self.stationary_frames.saturating_add(1);
            if self.stationary_frames > STATIONARY_FRAMES_BEFORE_RAMP && over_budget {
                self.scale += SCALE_STEP_PER_FRAME;
            }
        }
        self.scale
    }
}

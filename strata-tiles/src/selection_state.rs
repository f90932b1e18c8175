/// The outcome of visiting a tile during traversal. The low two bits hold
/// the base result; bit 2 marks a result that was later kicked out of the
/// render list, bit 3 marks a culled tile whose load is still wanted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileSelectionResult(u32);

impl TileSelectionResult {
    /// Not visited this frame.
    pub const NONE: Self = Self(0);
    pub const CULLED: Self = Self(1);
    pub const RENDERED: Self = Self(2);
    /// Refined past; descendants were rendered instead.
    pub const REFINED: Self = Self(3);
    pub const RENDERED_AND_KICKED: Self = Self(2 | 4);
    pub const REFINED_AND_KICKED: Self = Self(3 | 4);
    /// Culled, but its content is still wanted (preloading).
    pub const CULLED_BUT_NEEDED: Self = Self(1 | 8);

    /// The base result with any kick bit stripped.
    pub fn original_result(self) -> Self {
        Self(self.0 & 3)
    }

    pub fn was_kicked(self) -> bool {
        self.0 & 4 != 0
    }

    /// Marks a rendered or refined result as kicked. Anything else has no
    /// business being kicked.
    pub fn kick(&mut self) {
        debug_assert!(
            self.original_result() == Self::RENDERED || self.original_result() == Self::REFINED,
            "kicked a tile that was neither rendered nor refined"
        );
        self.0 |= 4;
    }
}

/// A [`TileSelectionResult`] stamped with the frame it belongs to. Asking
/// for the result of any other frame yields `NONE`, so stale entries never
/// leak across frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileSelectionState {
    pub frame_number: u64,
    pub result: TileSelectionResult,
}

impl Default for TileSelectionState {
    fn default() -> Self {
        Self {
            frame_number: 0,
            result: TileSelectionResult::NONE,
        }
    }
}

impl TileSelectionState {
    pub fn new(frame_number: u64, result: TileSelectionResult) -> Self {
        Self {
            frame_number,
            result,
        }
    }

    pub fn result(&self, frame_number: u64) -> TileSelectionResult {
        if self.frame_number == frame_number {
            self.result
        } else {
            TileSelectionResult::NONE
        }
    }

    pub fn was_rendered(&self, frame_number: u64) -> bool {
        self.result(frame_number).original_result() == TileSelectionResult::RENDERED
    }

    pub fn was_kicked(&self, frame_number: u64) -> bool {
        self.result(frame_number).was_kicked()
    }

    pub fn kick(&mut self) {
        self.result.kick();
    }
}

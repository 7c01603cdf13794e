use pb_core::types::Stage;

/// Upper bound on simultaneously rendered stage columns.
pub const MAX_CAPACITY: usize = 4;

/// The contiguous, viewport-sized slice of stages currently rendered.
///
/// Pure arithmetic over an ordered stage list: a capacity (1-4, derived from
/// viewport width breakpoints) and a slide index clamped to
/// `[0, max(0, len - capacity)]`. Resizing re-clamps the index but never
/// resets it further than the new bound requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWindow {
    capacity: usize,
    slide_index: usize,
}

impl StageWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.clamp(1, MAX_CAPACITY),
            slide_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slide_index(&self) -> usize {
        self.slide_index
    }

    /// Map a viewport width to a column capacity using the configured
    /// breakpoints (widths above which the window grows by one column).
    pub fn capacity_for_width(width: f32, breakpoints: &[f32]) -> usize {
        let capacity = 1 + breakpoints.iter().filter(|b| width >= **b).count();
        capacity.min(MAX_CAPACITY)
    }

    /// The visible slice: `stages[slide_index .. slide_index + capacity]`,
    /// clamped to the list bounds.
    pub fn visible<'a>(&self, stages: &'a [Stage]) -> &'a [Stage] {
        let start = self.slide_index.min(stages.len());
        let end = (start + self.capacity).min(stages.len());
        &stages[start..end]
    }

    pub fn can_prev(&self) -> bool {
        self.slide_index > 0
    }

    pub fn can_next(&self, stage_count: usize) -> bool {
        self.slide_index < self.max_index(stage_count)
    }

    pub fn next(&mut self, stage_count: usize) {
        self.slide_index = (self.slide_index + 1).min(self.max_index(stage_count));
    }

    pub fn prev(&mut self) {
        self.slide_index = self.slide_index.saturating_sub(1);
    }

    /// Update capacity (e.g. on viewport resize), re-clamping the slide
    /// index to the new bound without resetting it further.
    pub fn set_capacity(&mut self, capacity: usize, stage_count: usize) {
        self.capacity = capacity.clamp(1, MAX_CAPACITY);
        self.slide_index = self.slide_index.min(self.max_index(stage_count));
    }

    fn max_index(&self, stage_count: usize) -> usize {
        stage_count.saturating_sub(self.capacity)
    }
}

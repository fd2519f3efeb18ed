use crate::core_modules::frame::{Frame, Window};
use std::collections::VecDeque;

/// Number of consecutive frames the classifier looks at.
pub const WINDOW_CAPACITY: usize = 16;

/// Fixed-capacity FIFO of the most recent frames.
///
/// Pushing past capacity is normal operation: the oldest frame is evicted.
pub struct SlidingWindowBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl SlidingWindowBuffer {
    pub fn new() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
        if self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A view of the buffered frames, available only once the buffer is full.
    pub fn window(&self) -> Option<Window<'_>> {
        self.is_full().then(|| Window::new(&self.frames))
    }

    pub fn newest(&self) -> Option<&Frame> {
        self.frames.back()
    }
}

impl Default for SlidingWindowBuffer {
    fn default() -> Self {
        Self::new()
    }
}

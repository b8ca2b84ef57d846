use std::collections::VecDeque;

use crate::types::PerceptionFrame;

/// Fixed-capacity perception history, oldest first.
#[derive(Debug, Clone)]
pub struct PerceptionBuffer {
    frames: VecDeque<PerceptionFrame>,
    capacity: usize,
}

impl PerceptionBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, frame: PerceptionFrame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn latest(&self) -> Option<&PerceptionFrame> {
        self.frames.back()
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

    pub fn iter(&self) -> impl Iterator<Item = &PerceptionFrame> {
        self.frames.iter()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Default for PerceptionBuffer {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Posture;

    fn frame(ts: u64) -> PerceptionFrame {
        PerceptionFrame::new(false, true, Posture::Standing, ts)
    }

    #[test]
    fn empty_buffer_has_no_latest() {
        let buffer = PerceptionBuffer::default();

        assert!(buffer.latest().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn keeps_last_ten_in_order() {
        let mut buffer = PerceptionBuffer::new(10);

        for ts in 0..15 {
            buffer.push(frame(ts));
            assert!(buffer.len() <= 10);
        }

        let kept: Vec<u64> = buffer.iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(kept, (5..15).collect::<Vec<_>>());
        assert_eq!(buffer.latest().unwrap().timestamp_ms, 14);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buffer = PerceptionBuffer::new(0);

        buffer.push(frame(1));
        buffer.push(frame(2));

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.latest().unwrap().timestamp_ms, 2);
    }
}

use core::ops::Range;

/// Serves frames straight off the bottom of untouched memory before the
/// coremap exists.
///
/// Frames handed out here are never returned: once the coremap is built it
/// pins every frame below `next` so they stay with the kernel until it stops
/// running.
pub struct DummyAllocator {
    next: usize,
    end: usize,
}

impl DummyAllocator {
    pub const fn new(end: usize) -> Self {
        DummyAllocator { next: 0, end }
    }

    /// Frame indices of `frames` fresh frames, or `None` if memory is gone.
    pub fn alloc(&mut self, frames: usize) -> Option<Range<usize>> {
        if frames == 0 || self.next + frames > self.end {
            return None;
        }

        let start = self.next;
        self.next += frames;
        Some(start..self.next)
    }

    /// Number of frames taken so far.
    pub fn stolen(&self) -> usize {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steals_in_order_until_exhausted() {
        let mut dummy = DummyAllocator::new(4);
        assert_eq!(dummy.alloc(3), Some(0..3));
        assert_eq!(dummy.alloc(2), None);
        assert_eq!(dummy.alloc(1), Some(3..4));
        assert_eq!(dummy.alloc(1), None);
        assert_eq!(dummy.stolen(), 4);
    }
}

use alloc::collections::VecDeque;
use vmos_shared::mem::VirtAddr;

/// Chooses which resident page gives up its frame when memory runs out.
///
/// A policy tracks exactly the pages that are resident: a page is admitted
/// when it gets a frame and leaves when it is chosen for eviction.
pub trait PageReplacementPolicy {
    fn admit(&mut self, page: VirtAddr);

    /// Remove and return the next victim, or `None` if nothing is resident.
    fn evict_page(&mut self) -> Option<VirtAddr>;

    /// Put back a victim whose eviction failed so it is chosen first again.
    fn restore(&mut self, page: VirtAddr);

    fn resident(&self) -> usize;

    fn is_tracked(&self, page: VirtAddr) -> bool;
}

/// Evicts the page that has been resident the longest.
#[derive(Debug, Default)]
pub struct FifoReplacement {
    queue: VecDeque<VirtAddr>,
}

impl FifoReplacement {
    pub fn iter(&self) -> impl Iterator<Item = VirtAddr> + '_ {
        self.queue.iter().copied()
    }
}

impl PageReplacementPolicy for FifoReplacement {
    fn admit(&mut self, page: VirtAddr) {
        debug_assert!(!self.is_tracked(page), "{page:#x} admitted twice");
        self.queue.push_back(page);
    }

    fn evict_page(&mut self) -> Option<VirtAddr> {
        self.queue.pop_front()
    }

    fn restore(&mut self, page: VirtAddr) {
        self.queue.push_front(page);
    }

    fn resident(&self) -> usize {
        self.queue.len()
    }

    fn is_tracked(&self, page: VirtAddr) -> bool {
        self.queue.contains(&page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_page_goes_first() {
        let mut fifo = FifoReplacement::default();
        fifo.admit(0x3000);
        fifo.admit(0x1000);
        fifo.admit(0x2000);

        assert_eq!(fifo.evict_page(), Some(0x3000));
        fifo.admit(0x3000);
        assert_eq!(fifo.evict_page(), Some(0x1000));
        assert_eq!(fifo.iter().collect::<Vec<_>>(), [0x2000, 0x3000]);
    }

    #[test]
    fn test_restored_victim_is_next_again() {
        let mut fifo = FifoReplacement::default();
        fifo.admit(0x1000);
        fifo.admit(0x2000);

        let victim = fifo.evict_page().unwrap();
        fifo.restore(victim);
        assert_eq!(fifo.resident(), 2);
        assert_eq!(fifo.evict_page(), Some(0x1000));
        assert_eq!(fifo.evict_page(), Some(0x2000));
        assert_eq!(fifo.evict_page(), None);
    }
}

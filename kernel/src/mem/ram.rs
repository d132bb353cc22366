use alloc::boxed::Box;
use vmos_shared::mem::{PhysAddr, PAGE_FRAME_MASK, PAGE_FRAME_SIZE};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// The contents of one physical page frame.
#[derive(FromZeroes, FromBytes, AsBytes)]
#[repr(transparent)]
pub struct Frame([u8; PAGE_FRAME_SIZE]);

/// Physical memory: a contiguous run of frames starting at `base`.
pub struct Ram {
    base: PhysAddr,
    frames: Box<[Frame]>,
}

impl Ram {
    pub fn new(base: PhysAddr, size: usize) -> Self {
        assert_eq!(base & !PAGE_FRAME_MASK, 0, "RAM base {base:#x} is not page aligned");
        assert_eq!(size % PAGE_FRAME_SIZE, 0, "RAM size {size:#x} is not a whole number of pages");

        Self {
            base,
            frames: Frame::new_box_slice_zeroed(size / PAGE_FRAME_SIZE),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn address_of(&self, index: usize) -> PhysAddr {
        self.base + index * PAGE_FRAME_SIZE
    }

    pub fn index_of(&self, paddr: PhysAddr) -> usize {
        assert_eq!(paddr & !PAGE_FRAME_MASK, 0, "{paddr:#x} is not a frame address");
        assert!(
            paddr >= self.base && paddr < self.address_of(self.frames.len()),
            "{paddr:#x} is outside physical memory"
        );
        (paddr - self.base) / PAGE_FRAME_SIZE
    }

    pub fn frame(&self, paddr: PhysAddr) -> &Frame {
        &self.frames[self.index_of(paddr)]
    }

    pub fn frame_mut(&mut self, paddr: PhysAddr) -> &mut Frame {
        let index = self.index_of(paddr);
        &mut self.frames[index]
    }
}

// Run lengths are bounded by the frame count, which fits in 24 bits.
#![allow(clippy::cast_possible_truncation)]

mod placement_algorithms;

use super::dummy_allocator::DummyAllocator;
use super::{Frame, Ram};
use alloc::boxed::Box;
use alloc::vec;
use arbitrary_int::{u24, Number};
use bitbybit::bitfield;
pub use placement_algorithms::{FirstFit, NextFit, Placement, PlacementAlgorithm};
use vmos_shared::mem::PhysAddr;

/// Run length stored in every frame of a run except its head. Freeing only
/// ever starts from the head, so interior frames never need their own count.
const INTERIOR: u24 = u24::MAX;

#[bitfield(u32, default = 0)]
pub struct CoreMapEntry {
    #[bit(0, rw)]
    allocated: bool,
    #[bit(1, rw)]
    pinned: bool,
    #[bits(8..=31, rw)]
    run_length: u24,
}

impl CoreMapEntry {
    pub fn is_free(&self) -> bool {
        !self.allocated()
    }

    /// First frame of an allocated run; `run_length` frames belong to it.
    pub fn is_head(&self) -> bool {
        self.allocated() && self.run_length() != INTERIOR && self.run_length().value() != 0
    }

    fn head(frames: usize) -> Self {
        Self::DEFAULT
            .with_allocated(true)
            .with_run_length(u24::new(frames as u32))
    }

    fn interior() -> Self {
        Self::DEFAULT.with_allocated(true).with_run_length(INTERIOR)
    }
}

enum FrameAllocatorState {
    Bootstrap {
        dummy_allocator: DummyAllocator,
    },
    Ready {
        core_map: Box<[CoreMapEntry]>,
        placement_algorithm: Box<dyn PlacementAlgorithm + Send>,
        frames_allocated: usize,
    },
}

/// Owner of physical memory. Hands out runs of contiguous frames and is the
/// only thing that touches the raw frame inventory.
pub struct FrameAllocator {
    ram: Ram,
    state: FrameAllocatorState,
}

impl FrameAllocator {
    pub fn new(ram: Ram) -> Self {
        let frame_count = ram.frame_count();
        assert!(
            frame_count < INTERIOR.value() as usize,
            "too many frames for the coremap"
        );

        Self {
            ram,
            state: FrameAllocatorState::Bootstrap {
                dummy_allocator: DummyAllocator::new(frame_count),
            },
        }
    }

    /// Build the coremap. Every frame handed out before this point is pinned
    /// to the kernel and can never be freed.
    ///
    /// # Panics
    ///
    /// Panics if the coremap has already been built.
    pub fn bootstrap(&mut self, placement: Placement) {
        let FrameAllocatorState::Bootstrap { dummy_allocator } = &self.state else {
            panic!("coremap bootstrapped twice");
        };

        let stolen = dummy_allocator.stolen();
        let mut core_map = vec![CoreMapEntry::DEFAULT; self.ram.frame_count()].into_boxed_slice();
        for entry in &mut core_map[..stolen] {
            *entry = CoreMapEntry::interior().with_pinned(true);
        }

        self.state = FrameAllocatorState::Ready {
            core_map,
            placement_algorithm: placement.algorithm(),
            frames_allocated: stolen,
        };
    }

    pub fn is_bootstrapped(&self) -> bool {
        matches!(self.state, FrameAllocatorState::Ready { .. })
    }

    /// Allocate `frames` contiguous frames and return the address of the
    /// first, or `None` if no run that long is free. The frames are not
    /// zeroed.
    pub fn alloc(&mut self, frames: usize) -> Option<PhysAddr> {
        if frames == 0 {
            return None;
        }

        let range = match &mut self.state {
            FrameAllocatorState::Bootstrap { dummy_allocator } => dummy_allocator.alloc(frames)?,
            FrameAllocatorState::Ready {
                core_map,
                placement_algorithm,
                frames_allocated,
            } => {
                if *frames_allocated + frames > core_map.len() {
                    return None;
                }

                let range = placement_algorithm.place(core_map, frames)?;

                core_map[range.start] = CoreMapEntry::head(frames);
                for entry in &mut core_map[range.start + 1..range.end] {
                    assert!(entry.is_free());
                    *entry = CoreMapEntry::interior();
                }

                *frames_allocated += frames;
                range
            }
        };

        Some(self.ram.address_of(range.start))
    }

    /// Return the run that starts at `base` and report how many frames it
    /// held.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not the first frame of an allocated run; that is
    /// a double free or a stray pointer.
    pub fn free(&mut self, base: PhysAddr) -> usize {
        let start = self.ram.index_of(base);
        let FrameAllocatorState::Ready {
            core_map,
            frames_allocated,
            ..
        } = &mut self.state
        else {
            panic!("free of {base:#x} before the coremap was bootstrapped");
        };

        let head = core_map[start];
        assert!(
            head.is_head(),
            "freeing {base:#x}, which does not start an allocated run"
        );

        let frames = head.run_length().value() as usize;
        for entry in &mut core_map[start..start + frames] {
            assert!(entry.allocated() && !entry.pinned());
            *entry = CoreMapEntry::DEFAULT;
        }

        *frames_allocated -= frames;
        frames
    }

    pub fn total_frames(&self) -> usize {
        self.ram.frame_count()
    }

    pub fn frames_in_use(&self) -> usize {
        match &self.state {
            FrameAllocatorState::Bootstrap { dummy_allocator } => dummy_allocator.stolen(),
            FrameAllocatorState::Ready {
                frames_allocated, ..
            } => *frames_allocated,
        }
    }

    pub fn frames_free(&self) -> usize {
        self.total_frames() - self.frames_in_use()
    }

    /// Frames pinned to the kernel at bootstrap.
    pub fn pinned_frames(&self) -> usize {
        match &self.state {
            FrameAllocatorState::Bootstrap { .. } => 0,
            FrameAllocatorState::Ready { core_map, .. } => {
                core_map.iter().filter(|entry| entry.pinned()).count()
            }
        }
    }

    /// Whether the running totals agree with a full walk of the coremap.
    pub fn accounting_is_consistent(&self) -> bool {
        let FrameAllocatorState::Ready {
            core_map,
            frames_allocated,
            ..
        } = &self.state
        else {
            return true;
        };

        let in_use = core_map.iter().filter(|entry| entry.allocated()).count();
        let free = core_map.iter().filter(|entry| entry.is_free()).count();
        in_use == *frames_allocated && in_use + free == core_map.len()
    }

    pub fn frame(&self, paddr: PhysAddr) -> &Frame {
        self.ram.frame(paddr)
    }

    pub fn frame_mut(&mut self, paddr: PhysAddr) -> &mut Frame {
        self.ram.frame_mut(paddr)
    }
}

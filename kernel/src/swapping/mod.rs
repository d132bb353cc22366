//! Swap store: a fixed-size backing file split into page-sized slots.
//!
//! Slot `i` occupies bytes `[i * PAGE_FRAME_SIZE, (i + 1) * PAGE_FRAME_SIZE)`
//! of the file. A page keeps the slot it was first swapped out to for the
//! rest of its life, and slots are never returned: the file is not
//! compacted, so a dead process's slots are abandoned.

mod swap_file;

pub use swap_file::{RamSwapFile, SwapFile};

use crate::error::VmError;
use crate::mem::Frame;
use crate::vm::AsId;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use vmos_shared::mem::{VirtAddr, PAGE_FRAME_SIZE};
use vmos_shared::sizes::SECTOR_SIZE;
use zerocopy::AsBytes;

pub type SwapSlot = usize;

const SECTORS_IN_PAGE: usize = PAGE_FRAME_SIZE / SECTOR_SIZE;

/// Identifies a page across evictions so it lands in the same slot each
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SwapKey {
    pub asid: AsId,
    pub page: VirtAddr,
}

pub struct SwapStore<F: SwapFile> {
    file: F,
    slots: BTreeMap<SwapKey, SwapSlot>,
    written: Box<[bool]>,
    next_slot: SwapSlot,
}

impl<F: SwapFile> SwapStore<F> {
    pub fn new(file: F) -> Result<Self, VmError> {
        if file.is_empty() || file.len() % PAGE_FRAME_SIZE != 0 {
            return Err(VmError::Config("swap file is not a whole number of pages"));
        }

        let capacity = file.len() / PAGE_FRAME_SIZE;
        Ok(Self {
            file,
            slots: BTreeMap::new(),
            written: vec![false; capacity].into_boxed_slice(),
            next_slot: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.written.len()
    }

    pub fn slots_in_use(&self) -> usize {
        self.next_slot
    }

    pub fn slot_of(&self, key: SwapKey) -> Option<SwapSlot> {
        self.slots.get(&key).copied()
    }

    /// Write `frame` to the slot belonging to `key`, assigning one the first
    /// time the page is evicted.
    ///
    /// # Panics
    ///
    /// Panics if a new slot is needed and the swap file is full. Nothing can
    /// reclaim swap space, so there is no way to continue.
    pub fn swap_out(&mut self, key: SwapKey, frame: &Frame) -> Result<SwapSlot, VmError> {
        let slot = match self.slots.get(&key) {
            Some(&slot) => slot,
            None => {
                assert!(
                    self.next_slot < self.capacity(),
                    "out of swap file space ({} slots)",
                    self.capacity()
                );
                let slot = self.next_slot;
                self.next_slot += 1;
                self.slots.insert(key, slot);
                slot
            }
        };

        let base = slot * PAGE_FRAME_SIZE;
        let mut transferred = 0;
        for sector in frame.as_bytes().chunks_exact(SECTOR_SIZE) {
            let moved = self.file.write_at(base + transferred, sector);
            transferred += moved;
            if moved != SECTOR_SIZE {
                return Err(VmError::SwapIo { slot, transferred });
            }
        }
        debug_assert_eq!(transferred / SECTOR_SIZE, SECTORS_IN_PAGE);

        self.written[slot] = true;
        Ok(slot)
    }

    /// Read `slot` back into `frame`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` has never been written.
    pub fn swap_in(&mut self, slot: SwapSlot, frame: &mut Frame) -> Result<(), VmError> {
        assert!(
            slot < self.capacity() && self.written[slot],
            "swap slot {slot} was never written"
        );

        let base = slot * PAGE_FRAME_SIZE;
        let mut transferred = 0;
        for sector in frame.as_bytes_mut().chunks_exact_mut(SECTOR_SIZE) {
            let moved = self.file.read_at(base + transferred, sector);
            transferred += moved;
            if moved != SECTOR_SIZE {
                return Err(VmError::SwapIo { slot, transferred });
            }
        }

        Ok(())
    }
}

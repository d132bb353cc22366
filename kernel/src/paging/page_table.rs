//! The demand-paging core.
//!
//! Entries are created on first touch and indexed by a two-level table
//! split the same way as the hardware's virtual addresses. Every resident
//! entry is also tracked by the replacement policy, and nothing else is.

use super::page_replacement::{FifoReplacement, PageReplacementPolicy};
use crate::error::VmError;
use crate::swapping::{SwapFile, SwapKey, SwapSlot};
use crate::user_program::{AddressSpace, PageFill, Segment};
use crate::vm::tlb::TlbHardware;
use crate::vm::vmstats::VmStat;
use crate::vm::{AsId, VmSystem};
use alloc::boxed::Box;
use alloc::vec;
use vmos_shared::mem::{page_align_down, PhysAddr, VirtAddr};
use vmos_shared::paging::{VirtualAddress, PAGE_TABLE_LEN};
use zerocopy::FromZeroes;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageState {
    Resident { frame: PhysAddr, dirty: bool },
    Swapped { slot: SwapSlot },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageTableEntry {
    pub vpage: VirtAddr,
    pub state: PageState,
}

type PageTableLeaf = Box<[Option<PageTableEntry>]>;

pub struct PageTable<P: PageReplacementPolicy = FifoReplacement> {
    asid: AsId,
    directory: Box<[Option<PageTableLeaf>]>,
    replacement: P,
}

impl PageTable {
    pub fn new(asid: AsId) -> Self {
        Self::with_policy(asid, FifoReplacement::default())
    }
}

impl<P: PageReplacementPolicy> PageTable<P> {
    pub fn with_policy(asid: AsId, replacement: P) -> Self {
        Self {
            asid,
            directory: (0..PAGE_TABLE_LEN).map(|_| None).collect(),
            replacement,
        }
    }

    pub fn entry(&self, vaddr: VirtAddr) -> Option<&PageTableEntry> {
        let va = VirtualAddress::from_addr(vaddr);
        self.directory[va.directory_slot()].as_ref()?[va.table_slot()].as_ref()
    }

    fn slot_mut(&mut self, vaddr: VirtAddr) -> &mut Option<PageTableEntry> {
        let va = VirtualAddress::from_addr(vaddr);
        let leaf = self.directory[va.directory_slot()]
            .get_or_insert_with(|| vec![None; PAGE_TABLE_LEN].into_boxed_slice());
        &mut leaf[va.table_slot()]
    }

    pub fn entries(&self) -> impl Iterator<Item = &PageTableEntry> + '_ {
        self.directory
            .iter()
            .flatten()
            .flat_map(|leaf| leaf.iter().flatten())
    }

    pub fn resident_pages(&self) -> usize {
        self.replacement.resident()
    }

    /// Whether the replacement policy tracks exactly the resident pages.
    pub fn fifo_matches_resident(&self) -> bool {
        let mut resident = 0;
        for entry in self.entries() {
            let tracked = self.replacement.is_tracked(entry.vpage);
            match entry.state {
                PageState::Resident { .. } if !tracked => return false,
                PageState::Swapped { .. } if tracked => return false,
                PageState::Resident { .. } => resident += 1,
                PageState::Swapped { .. } => {}
            }
        }
        resident == self.replacement.resident()
    }

    /// Find the frame backing `vaddr`, bringing the page in if it is not
    /// resident. Returns the frame's base address.
    pub fn lookup<H: TlbHardware, F: SwapFile>(
        &mut self,
        aspace: &AddressSpace,
        vm: &mut VmSystem<H, F>,
        vaddr: VirtAddr,
    ) -> Result<PhysAddr, VmError> {
        let page = page_align_down(vaddr);
        let segment = aspace.contains(vaddr).ok_or(VmError::BadAddress(vaddr))?;

        match self.entry(page).map(|entry| entry.state) {
            Some(PageState::Resident { frame, .. }) => {
                // Still resident, so the TLB just ran out of room for it.
                vm.stats.inc(VmStat::TlbReload);
                Ok(frame)
            }
            Some(PageState::Swapped { slot }) => self.page_in(vm, page, slot),
            None => self.fault_in(aspace, vm, segment, page),
        }
    }

    fn page_in<H: TlbHardware, F: SwapFile>(
        &mut self,
        vm: &mut VmSystem<H, F>,
        page: VirtAddr,
        slot: SwapSlot,
    ) -> Result<PhysAddr, VmError> {
        let frame = self.obtain_frame(vm)?;
        if let Err(err) = vm.swap.swap_in(slot, vm.frames.frame_mut(frame)) {
            vm.frames.free(frame);
            return Err(err);
        }
        vm.stats.inc(VmStat::PageFaultDisk);
        vm.stats.inc(VmStat::SwapFileRead);

        self.make_resident(page, frame);
        Ok(frame)
    }

    fn fault_in<H: TlbHardware, F: SwapFile>(
        &mut self,
        aspace: &AddressSpace,
        vm: &mut VmSystem<H, F>,
        segment: Segment,
        page: VirtAddr,
    ) -> Result<PhysAddr, VmError> {
        let frame = self.obtain_frame(vm)?;
        let fill = match segment {
            Segment::Stack => {
                vm.frames.frame_mut(frame).zero();
                PageFill::Zeroed
            }
            Segment::Text | Segment::Data => {
                match aspace.load_page(segment, page, vm.frames.frame_mut(frame)) {
                    Ok(fill) => fill,
                    Err(err) => {
                        vm.frames.free(frame);
                        return Err(err.into());
                    }
                }
            }
        };
        vm.stats.record_fill(fill);

        self.make_resident(page, frame);
        Ok(frame)
    }

    fn make_resident(&mut self, page: VirtAddr, frame: PhysAddr) {
        *self.slot_mut(page) = Some(PageTableEntry {
            vpage: page,
            state: PageState::Resident {
                frame,
                dirty: false,
            },
        });
        self.replacement.admit(page);
    }

    /// Get a free frame, evicting this space's oldest resident page for as
    /// long as the coremap has none.
    fn obtain_frame<H: TlbHardware, F: SwapFile>(
        &mut self,
        vm: &mut VmSystem<H, F>,
    ) -> Result<PhysAddr, VmError> {
        loop {
            if let Some(frame) = vm.frames.alloc(1) {
                return Ok(frame);
            }
            self.evict_one(vm)?;
        }
    }

    fn evict_one<H: TlbHardware, F: SwapFile>(
        &mut self,
        vm: &mut VmSystem<H, F>,
    ) -> Result<(), VmError> {
        let victim = self.replacement.evict_page().ok_or(VmError::OutOfMemory)?;
        let Some(PageState::Resident { frame, .. }) = self.entry(victim).map(|entry| entry.state)
        else {
            panic!("replacement policy chose {victim:#x}, which is not resident");
        };

        // The frame is about to belong to someone else.
        if vm.tlb.invalidate_page(victim) {
            vm_debug!("vm: shot down TLB entry for {victim:#x}");
        }

        let key = SwapKey {
            asid: self.asid,
            page: victim,
        };
        let slot = match vm.swap.swap_out(key, vm.frames.frame(frame)) {
            Ok(slot) => slot,
            Err(err) => {
                self.replacement.restore(victim);
                return Err(err);
            }
        };
        vm.stats.inc(VmStat::SwapFileWrite);
        vm.frames.free(frame);

        vm_debug!("vm: evicted {victim:#x} from {frame:#x} to slot {slot}");
        *self.slot_mut(victim) = Some(PageTableEntry {
            vpage: victim,
            state: PageState::Swapped { slot },
        });
        Ok(())
    }

    /// Record that `vaddr`'s page may have been written.
    pub fn mark_dirty(&mut self, vaddr: VirtAddr) {
        if let Some(PageTableEntry {
            state: PageState::Resident { dirty, .. },
            ..
        }) = self.slot_mut(page_align_down(vaddr))
        {
            *dirty = true;
        }
    }

    /// Return every resident frame to the coremap. Swap slots are abandoned.
    pub fn destroy<H: TlbHardware, F: SwapFile>(self, vm: &mut VmSystem<H, F>) {
        for entry in self.entries() {
            if let PageState::Resident { frame, .. } = entry.state {
                vm.tlb.invalidate_page(entry.vpage);
                vm.frames.free(frame);
            }
        }
    }
}

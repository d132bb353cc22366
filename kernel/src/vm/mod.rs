//! The VM system: everything the fault path shares across processes, owned
//! by one context built at boot.

pub mod fault;
pub mod tlb;
pub mod vmstats;

pub use fault::{handle_fault, FaultKind, ProcessContext, FAULT_EXIT_CODE};
pub use tlb::{SoftTlb, Tlb, TlbHardware, TlbInstall};
pub use vmstats::{VmStat, VmStats};

use crate::error::VmError;
use crate::mem::{FrameAllocator, Placement, Ram};
use crate::paging::PageTable;
use crate::swapping::{RamSwapFile, SwapFile, SwapStore};
use crate::user_program::{AddressSpace, SegmentReader};
use alloc::sync::Arc;
use vmos_shared::mem::{
    PhysAddr, DEFAULT_RAM_SIZE, KERNEL_RESERVED_FRAMES, MAX_RAM_SIZE, PAGE_FRAME_SIZE,
    STACK_PAGES,
};
use vmos_shared::println;
use vmos_shared::sizes::{KB, SWAP_FILE_SIZE};

/// Address space identifier. Keys swap slots so two processes mapping the
/// same virtual page never share one.
pub type AsId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VmConfig {
    pub ram_size: usize,
    /// Frames the kernel takes before the coremap exists. They stay pinned.
    pub kernel_reserved_frames: usize,
    pub swap_file_size: usize,
    pub stack_pages: usize,
    pub placement: Placement,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            ram_size: DEFAULT_RAM_SIZE,
            kernel_reserved_frames: KERNEL_RESERVED_FRAMES,
            swap_file_size: SWAP_FILE_SIZE,
            stack_pages: STACK_PAGES,
            placement: Placement::default(),
        }
    }
}

impl VmConfig {
    pub fn validate(&self) -> Result<(), VmError> {
        if self.ram_size == 0 || self.ram_size % PAGE_FRAME_SIZE != 0 {
            return Err(VmError::Config("RAM is not a whole number of pages"));
        }
        if self.ram_size > MAX_RAM_SIZE {
            return Err(VmError::Config("RAM too large for the TLB frame field"));
        }
        if self.stack_pages == 0 {
            return Err(VmError::Config("stack needs at least one page"));
        }
        if self.swap_file_size == 0 || self.swap_file_size % PAGE_FRAME_SIZE != 0 {
            return Err(VmError::Config("swap file is not a whole number of pages"));
        }
        if self.kernel_reserved_frames + self.stack_pages >= self.ram_size / PAGE_FRAME_SIZE {
            return Err(VmError::Config("no frames left for user pages"));
        }
        Ok(())
    }
}

pub struct VmSystem<H: TlbHardware = SoftTlb, F: SwapFile = RamSwapFile> {
    pub(crate) frames: FrameAllocator,
    pub(crate) swap: SwapStore<F>,
    pub(crate) tlb: Tlb<H>,
    pub(crate) stats: VmStats,
    stack_pages: usize,
    next_asid: AsId,
}

impl<H: TlbHardware, F: SwapFile> VmSystem<H, F> {
    /// Bring up the VM system. The kernel's early frames are taken through
    /// the bootstrap path and pinned once the coremap is built.
    pub fn bootstrap(config: VmConfig, tlb_hw: H, swap_file: F) -> Result<Self, VmError> {
        config.validate()?;
        if swap_file.len() != config.swap_file_size {
            return Err(VmError::Config("swap file size does not match configuration"));
        }

        let mut frames = FrameAllocator::new(Ram::new(0, config.ram_size));
        if config.kernel_reserved_frames > 0 {
            frames
                .alloc(config.kernel_reserved_frames)
                .ok_or(VmError::Config("kernel reservation does not fit in RAM"))?;
        }
        frames.bootstrap(config.placement);

        let swap = SwapStore::new(swap_file)?;

        println!(
            "VM: {} frames ({} KB), {} pinned, {} swap slots",
            frames.total_frames(),
            config.ram_size / KB,
            frames.pinned_frames(),
            swap.capacity()
        );

        Ok(Self {
            frames,
            swap,
            tlb: Tlb::new(tlb_hw),
            stats: VmStats::default(),
            stack_pages: config.stack_pages,
            next_asid: 1,
        })
    }

    pub fn create_vmspace(&mut self, executable: Arc<dyn SegmentReader + Send + Sync>) -> VmSpace {
        let asid = self.next_asid;
        // A reused id would alias another space's swap slots and TLB entries.
        self.next_asid = asid.checked_add(1).expect("address space ids exhausted");
        VmSpace {
            addrspace: AddressSpace::new(asid, executable, self.stack_pages),
            page_table: PageTable::new(asid),
        }
    }

    /// Allocate `pages` contiguous frames for the kernel. Kernel pages are
    /// never evicted to make room.
    pub fn alloc_kpages(&mut self, pages: usize) -> Option<PhysAddr> {
        self.frames.alloc(pages)
    }

    pub fn free_kpages(&mut self, addr: PhysAddr) {
        self.frames.free(addr);
    }

    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut FrameAllocator {
        &mut self.frames
    }

    pub fn swap(&self) -> &SwapStore<F> {
        &self.swap
    }

    pub fn tlb(&self) -> &Tlb<H> {
        &self.tlb
    }

    pub fn stats(&self) -> &VmStats {
        &self.stats
    }

    /// Report the statistics. Returns them for callers that want to check.
    pub fn shutdown(&self) -> VmStats {
        self.stats.print();
        self.stats.clone()
    }
}

/// A process's address space together with its page table.
pub struct VmSpace {
    pub addrspace: AddressSpace,
    pub page_table: PageTable,
}

impl VmSpace {
    /// Give everything back: resident frames and the stack reservation
    /// return to the coremap, swap slots are abandoned.
    pub fn destroy<H: TlbHardware, F: SwapFile>(mut self, vm: &mut VmSystem<H, F>) {
        self.page_table.destroy(vm);
        self.addrspace.destroy(&mut vm.frames);
    }
}

use crate::sizes::MB;

pub type VirtAddr = usize;
pub type PhysAddr = usize;

// Page size is 4KB, matching the 20-bit page numbers the TLB stores.
pub const PAGE_FRAME_SIZE: usize = 4 * 1024;
pub const PAGE_FRAME_MASK: usize = !(PAGE_FRAME_SIZE - 1);

// User addresses live below this; the stack grows down from it.
pub const USER_STACK_TOP: VirtAddr = 0x8000_0000;
pub const STACK_PAGES: usize = 12;

pub const DEFAULT_RAM_SIZE: usize = 2 * MB;

// Frames taken by the kernel image and early allocations before the coremap
// exists. These are pinned once the coremap takes over.
pub const KERNEL_RESERVED_FRAMES: usize = 16;

// Largest amount of RAM whose frame numbers fit the TLB's 20-bit field.
pub const MAX_RAM_SIZE: usize = (1 << 20) * PAGE_FRAME_SIZE;

#[inline]
pub const fn page_align_down(addr: usize) -> usize {
    addr & PAGE_FRAME_MASK
}

#[inline]
pub const fn page_offset(addr: usize) -> usize {
    addr & !PAGE_FRAME_MASK
}

/// Number of whole pages needed to hold `bytes`.
#[inline]
pub const fn pages_for(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_FRAME_SIZE)
}

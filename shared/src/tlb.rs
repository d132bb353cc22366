//! Layout of one hardware TLB slot.
//!
//! Each slot is an (`EntryHi`, `EntryLo`) pair: the high word names the
//! virtual page, the low word the physical frame and its permission bits.

// Frame and page numbers fit in 20 bits for every address we hand out.
#![allow(clippy::cast_possible_truncation)]

use crate::mem::{PhysAddr, VirtAddr, PAGE_FRAME_MASK};
use arbitrary_int::{u20, u6};
use bitbybit::bitfield;

pub const NUM_TLB: usize = 64;

// Page number of the first kernel-only address. Invalid slots point here so
// they can never match a user translation.
const KSEG0_PAGE: u32 = 0x80000;

#[bitfield(u32, default = 0)]
pub struct EntryHi {
    #[bits(12..=31, rw)]
    vpn: u20,
    #[bits(6..=11, rw)]
    asid: u6,
}

#[bitfield(u32, default = 0)]
pub struct EntryLo {
    #[bits(12..=31, rw)]
    pfn: u20,
    #[bit(11, rw)]
    no_cache: bool,
    #[bit(10, rw)]
    dirty: bool,
    #[bit(9, rw)]
    valid: bool,
    #[bit(8, rw)]
    global: bool,
}

impl EntryHi {
    pub fn for_page(vaddr: VirtAddr) -> Self {
        Self::DEFAULT.with_vpn(u20::new((vaddr >> 12) as u32))
    }

    /// A high word that is distinct for every slot and never matches a user
    /// page, so invalidated slots cannot alias each other.
    pub fn invalid(slot: usize) -> Self {
        Self::DEFAULT.with_vpn(u20::new(KSEG0_PAGE + slot as u32))
    }

    pub fn page(&self) -> VirtAddr {
        (self.vpn().value() as usize) << 12
    }
}

impl EntryLo {
    pub const INVALID: Self = Self::DEFAULT;

    /// A valid mapping onto `paddr`. The dirty bit is the hardware's write
    /// enable: without it a store raises a read-only fault.
    pub fn for_frame(paddr: PhysAddr, writable: bool) -> Self {
        Self::DEFAULT
            .with_pfn(u20::new(((paddr & PAGE_FRAME_MASK) >> 12) as u32))
            .with_dirty(writable)
            .with_valid(true)
    }

    pub fn frame(&self) -> PhysAddr {
        (self.pfn().value() as usize) << 12
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_round_trip() {
        let hi = EntryHi::for_page(0x0040_2000);
        assert_eq!(hi.page(), 0x0040_2000);
        assert_eq!(hi.raw_value(), 0x0040_2000);

        let lo = EntryLo::for_frame(0x0003_5000, true);
        assert_eq!(lo.frame(), 0x0003_5000);
        assert!(lo.valid());
        assert!(lo.dirty());
        assert_eq!(lo.raw_value(), 0x0003_5000 | 1 << 10 | 1 << 9);

        assert!(!EntryLo::for_frame(0x1000, false).dirty());
        assert!(!EntryLo::INVALID.valid());
    }

    #[test]
    fn test_invalid_slots_are_distinct_kernel_pages() {
        let first = EntryHi::invalid(0);
        let last = EntryHi::invalid(NUM_TLB - 1);
        assert_ne!(first.raw_value(), last.raw_value());
        assert!(first.page() >= 0x8000_0000);
    }
}

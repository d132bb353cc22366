//! The hardware TLB and the kernel's view of it.

use vmos_shared::mem::{page_offset, PhysAddr, VirtAddr};
use vmos_shared::tlb::{EntryHi, EntryLo, NUM_TLB};

/// Slot-level access to a translation cache with [`NUM_TLB`] slots.
pub trait TlbHardware {
    fn read(&self, slot: usize) -> (EntryHi, EntryLo);

    fn write(&mut self, hi: EntryHi, lo: EntryLo, slot: usize);

    /// Slot holding `hi`, if any.
    fn probe(&self, hi: EntryHi) -> Option<usize>;
}

/// A TLB in memory, for hosted builds.
pub struct SoftTlb {
    slots: [(EntryHi, EntryLo); NUM_TLB],
}

impl SoftTlb {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|slot| (EntryHi::invalid(slot), EntryLo::INVALID)),
        }
    }

    /// Translate `vaddr` the way the hardware would, returning the physical
    /// address and whether writes are allowed.
    pub fn translate(&self, vaddr: VirtAddr) -> Option<(PhysAddr, bool)> {
        let slot = self.probe(EntryHi::for_page(vaddr))?;
        let (_, lo) = self.slots[slot];
        lo.valid()
            .then(|| (lo.frame() + page_offset(vaddr), lo.dirty()))
    }

    pub fn valid_slots(&self) -> usize {
        self.slots.iter().filter(|(_, lo)| lo.valid()).count()
    }
}

impl Default for SoftTlb {
    fn default() -> Self {
        Self::new()
    }
}

impl TlbHardware for SoftTlb {
    fn read(&self, slot: usize) -> (EntryHi, EntryLo) {
        self.slots[slot]
    }

    fn write(&mut self, hi: EntryHi, lo: EntryLo, slot: usize) {
        self.slots[slot] = (hi, lo);
    }

    fn probe(&self, hi: EntryHi) -> Option<usize> {
        self.slots
            .iter()
            .position(|(entry, _)| entry.raw_value() == hi.raw_value())
    }
}

/// Where an installed translation went.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlbInstall {
    /// Into a slot that held nothing live.
    Free(usize),
    /// Over the slot the round-robin cursor picked.
    Replaced(usize),
}

pub struct Tlb<H: TlbHardware> {
    hw: H,
    next_victim: usize,
}

impl<H: TlbHardware> Tlb<H> {
    /// Take over `hw`, discarding whatever it held.
    pub fn new(hw: H) -> Self {
        let mut tlb = Self { hw, next_victim: 0 };
        tlb.invalidate_all();
        tlb
    }

    /// Map `page` onto `frame`. The dirty bit is the write-enable, so a
    /// read-only mapping faults on the first write.
    pub fn install(&mut self, page: VirtAddr, frame: PhysAddr, writable: bool) -> TlbInstall {
        let hi = EntryHi::for_page(page);
        let lo = EntryLo::for_frame(frame, writable);

        // Two live slots for one page is a machine check; rewrite in place.
        if let Some(slot) = self.hw.probe(hi) {
            self.hw.write(hi, lo, slot);
            return TlbInstall::Free(slot);
        }

        if let Some(slot) = (0..NUM_TLB).find(|&slot| !self.hw.read(slot).1.valid()) {
            self.hw.write(hi, lo, slot);
            return TlbInstall::Free(slot);
        }

        let slot = self.next_victim;
        self.next_victim = (self.next_victim + 1) % NUM_TLB;
        self.hw.write(hi, lo, slot);
        TlbInstall::Replaced(slot)
    }

    pub fn invalidate_all(&mut self) {
        for slot in 0..NUM_TLB {
            self.hw.write(EntryHi::invalid(slot), EntryLo::INVALID, slot);
        }
        self.next_victim = 0;
    }

    /// Drop the translation for `page`. Returns whether there was one.
    pub fn invalidate_page(&mut self, page: VirtAddr) -> bool {
        match self.hw.probe(EntryHi::for_page(page)) {
            Some(slot) => {
                self.hw.write(EntryHi::invalid(slot), EntryLo::INVALID, slot);
                true
            }
            None => false,
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmos_shared::mem::PAGE_FRAME_SIZE;

    fn page(n: usize) -> VirtAddr {
        0x40_0000 + n * PAGE_FRAME_SIZE
    }

    #[test]
    fn test_free_slots_fill_before_replacement() {
        let mut tlb = Tlb::new(SoftTlb::new());
        for n in 0..NUM_TLB {
            assert_eq!(tlb.install(page(n), n * PAGE_FRAME_SIZE, false), TlbInstall::Free(n));
        }
        assert_eq!(tlb.hardware().valid_slots(), NUM_TLB);

        // The oldest translation is the first to go.
        assert_eq!(tlb.install(page(NUM_TLB), 0, false), TlbInstall::Replaced(0));
        assert_eq!(tlb.hardware().translate(page(0)), None);
        assert_eq!(tlb.install(page(NUM_TLB + 1), 0, false), TlbInstall::Replaced(1));
        assert_eq!(tlb.hardware().translate(page(1)), None);
        assert!(tlb.hardware().translate(page(2)).is_some());
    }

    #[test]
    fn test_round_robin_wraps() {
        let mut tlb = Tlb::new(SoftTlb::new());
        for n in 0..NUM_TLB {
            tlb.install(page(n), 0, false);
        }
        for n in 0..NUM_TLB {
            assert_eq!(
                tlb.install(page(NUM_TLB + n), 0, false),
                TlbInstall::Replaced(n)
            );
        }
        assert_eq!(tlb.install(page(0), 0, false), TlbInstall::Replaced(0));
    }

    #[test]
    fn test_translation_carries_write_permission() {
        let mut tlb = Tlb::new(SoftTlb::new());
        tlb.install(0x40_0000, 0x7000, false);
        tlb.install(0x7fff_f000, 0x9000, true);

        assert_eq!(tlb.hardware().translate(0x40_0123), Some((0x7123, false)));
        assert_eq!(tlb.hardware().translate(0x7fff_f010), Some((0x9010, true)));
    }

    #[test]
    fn test_invalidate_page_frees_its_slot() {
        let mut tlb = Tlb::new(SoftTlb::new());
        tlb.install(page(0), 0x1000, true);
        tlb.install(page(1), 0x2000, true);

        assert!(tlb.invalidate_page(page(0)));
        assert!(!tlb.invalidate_page(page(0)));
        assert_eq!(tlb.hardware().translate(page(0)), None);
        assert_eq!(tlb.install(page(2), 0x3000, true), TlbInstall::Free(0));
    }

    #[test]
    fn test_reinstall_does_not_duplicate() {
        let mut tlb = Tlb::new(SoftTlb::new());
        tlb.install(page(0), 0x1000, false);
        assert_eq!(tlb.install(page(0), 0x1000, true), TlbInstall::Free(0));
        assert_eq!(tlb.hardware().valid_slots(), 1);
        assert_eq!(tlb.hardware().translate(page(0)), Some((0x1000, true)));
    }
}

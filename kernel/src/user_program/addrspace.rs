//! Per-process address space: a text region, a data region and a fixed
//! stack just below [`USER_STACK_TOP`].

use super::executable::{LoadError, SegmentReader};
use crate::error::VmError;
use crate::mem::{Frame, FrameAllocator};
use crate::swapping::SwapFile;
use crate::vm::tlb::TlbHardware;
use crate::vm::vmstats::VmStat;
use crate::vm::{AsId, VmSystem};
use alloc::sync::Arc;
use vmos_shared::eprintln;
use vmos_shared::mem::{
    page_align_down, page_offset, pages_for, PhysAddr, VirtAddr, PAGE_FRAME_SIZE, USER_STACK_TOP,
};
use zerocopy::AsBytes;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Text,
    Data,
    Stack,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionFlags {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl RegionFlags {
    pub const fn new(read: bool, write: bool, execute: bool) -> Self {
        Self {
            read,
            write,
            execute,
        }
    }
}

/// A loadable region. The base is page aligned; the file-backed bytes start
/// at `file_vaddr`, which need not be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub vbase: VirtAddr,
    pub npages: usize,
    pub file_vaddr: VirtAddr,
    pub file_offset: usize,
    pub file_size: usize,
    pub flags: RegionFlags,
}

impl Region {
    pub fn end(&self) -> VirtAddr {
        self.vbase + self.npages * PAGE_FRAME_SIZE
    }

    pub fn contains(&self, vaddr: VirtAddr) -> bool {
        (self.vbase..self.end()).contains(&vaddr)
    }

    fn overlaps(&self, start: VirtAddr, end: VirtAddr) -> bool {
        start < self.end() && self.vbase < end
    }
}

/// How a freshly faulted page got its contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageFill {
    /// Some bytes came from the executable.
    Loaded,
    /// Nothing in the executable backs this page.
    Zeroed,
}

pub struct AddressSpace {
    id: AsId,
    executable: Arc<dyn SegmentReader + Send + Sync>,
    text: Option<Region>,
    data: Option<Region>,
    stack_pages: usize,
    stack_reservation: Option<PhysAddr>,
}

impl AddressSpace {
    pub fn new(
        id: AsId,
        executable: Arc<dyn SegmentReader + Send + Sync>,
        stack_pages: usize,
    ) -> Self {
        Self {
            id,
            executable,
            text: None,
            data: None,
            stack_pages,
            stack_reservation: None,
        }
    }

    pub fn id(&self) -> AsId {
        self.id
    }

    pub fn text(&self) -> Option<&Region> {
        self.text.as_ref()
    }

    pub fn data(&self) -> Option<&Region> {
        self.data.as_ref()
    }

    pub fn stack_base(&self) -> VirtAddr {
        USER_STACK_TOP - self.stack_pages * PAGE_FRAME_SIZE
    }

    /// Map `mem_size` bytes at `vaddr`, the first `file_size` of which come
    /// from the executable at `file_offset`. The first call defines the text
    /// region and the second the data region.
    pub fn define_region(
        &mut self,
        vaddr: VirtAddr,
        mem_size: usize,
        file_offset: usize,
        file_size: usize,
        flags: RegionFlags,
    ) -> Result<(), VmError> {
        let vbase = page_align_down(vaddr);
        let npages = mem_size
            .checked_add(page_offset(vaddr))
            .map(pages_for)
            .ok_or(VmError::RegionOverlap(vaddr))?;
        let end = npages
            .checked_mul(PAGE_FRAME_SIZE)
            .and_then(|len| vbase.checked_add(len))
            .ok_or(VmError::RegionOverlap(vaddr))?;

        if self.text.is_some() && self.data.is_some() {
            eprintln!("Warning: too many regions in address space {}", self.id);
            return Err(VmError::TooManyRegions);
        }

        let collides = [self.text, self.data]
            .iter()
            .flatten()
            .any(|region| region.overlaps(vbase, end));
        if collides || end > self.stack_base() {
            return Err(VmError::RegionOverlap(vaddr));
        }

        let region = Region {
            vbase,
            npages,
            file_vaddr: vaddr,
            file_offset,
            file_size: file_size.min(mem_size),
            flags,
        };
        if self.text.is_none() {
            self.text = Some(region);
        } else {
            self.data = Some(region);
        }
        Ok(())
    }

    pub fn contains(&self, vaddr: VirtAddr) -> Option<Segment> {
        if self.text.is_some_and(|region| region.contains(vaddr)) {
            Some(Segment::Text)
        } else if self.data.is_some_and(|region| region.contains(vaddr)) {
            Some(Segment::Data)
        } else if (self.stack_base()..USER_STACK_TOP).contains(&vaddr) {
            Some(Segment::Stack)
        } else {
            None
        }
    }

    /// Addresses outside every region are not writable.
    pub fn is_writable(&self, vaddr: VirtAddr) -> bool {
        match self.contains(vaddr) {
            Some(Segment::Text) => self.text.is_some_and(|region| region.flags.write),
            Some(Segment::Data) => self.data.is_some_and(|region| region.flags.write),
            Some(Segment::Stack) => true,
            None => false,
        }
    }

    /// Reserve the frames backing the stack. Loadable regions are paged in
    /// on demand and reserve nothing.
    pub fn prepare_load(&mut self, frames: &mut FrameAllocator) -> Result<(), VmError> {
        if self.stack_reservation.is_none() {
            let base = frames.alloc(self.stack_pages).ok_or(VmError::OutOfMemory)?;
            self.stack_reservation = Some(base);
        }
        Ok(())
    }

    /// Initial user stack pointer.
    ///
    /// # Panics
    ///
    /// Panics if [`prepare_load`](Self::prepare_load) has not run.
    pub fn define_stack(&self) -> VirtAddr {
        assert!(
            self.stack_reservation.is_some(),
            "stack defined before prepare_load"
        );
        USER_STACK_TOP
    }

    /// Make this the running address space. Translations left in the TLB
    /// by whoever ran before must not survive.
    pub fn activate<H: TlbHardware, F: SwapFile>(&self, vm: &mut VmSystem<H, F>) {
        vm.tlb.invalidate_all();
        vm.stats.inc(VmStat::TlbInvalidate);
    }

    /// Fill `frame` with the contents of the text or data page at `page`.
    ///
    /// # Panics
    ///
    /// Panics if asked to load a stack page or a segment that was never
    /// defined.
    pub fn load_page(
        &self,
        segment: Segment,
        page: VirtAddr,
        frame: &mut Frame,
    ) -> Result<PageFill, LoadError> {
        let region = match segment {
            Segment::Text => self.text,
            Segment::Data => self.data,
            Segment::Stack => None,
        }
        .unwrap_or_else(|| panic!("no {segment:?} region to load {page:#x} from"));

        let bytes = frame.as_bytes_mut();
        let file_end = region.file_vaddr + region.file_size;
        let start = page.max(region.file_vaddr);
        let end = (page + PAGE_FRAME_SIZE).min(file_end);
        if start >= end {
            bytes.fill(0);
            return Ok(PageFill::Zeroed);
        }

        let head = start - page;
        bytes[..head].fill(0);
        self.executable.read_segment(
            region.file_offset + (start - region.file_vaddr),
            &mut bytes[head..],
            PAGE_FRAME_SIZE - head,
            end - start,
        )?;
        Ok(PageFill::Loaded)
    }

    /// Give back the stack reservation.
    pub fn destroy(&mut self, frames: &mut FrameAllocator) {
        if let Some(base) = self.stack_reservation.take() {
            frames.free(base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_program::ExecutableImage;
    use zerocopy::FromZeroes;

    const RX: RegionFlags = RegionFlags::new(true, false, true);
    const RW: RegionFlags = RegionFlags::new(true, true, false);

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 + 1).collect()
    }

    fn image(len: usize) -> Arc<ExecutableImage> {
        Arc::new(ExecutableImage::new(pattern(len)))
    }

    fn space(len: usize) -> AddressSpace {
        AddressSpace::new(1, image(len), 2)
    }

    #[test]
    fn test_regions_are_page_aligned() {
        let mut space = space(0);
        space.define_region(0x40_0123, 0x1000, 0, 0, RX).unwrap();

        let text = space.text().unwrap();
        assert_eq!(text.vbase, 0x40_0000);
        assert_eq!(text.npages, 2);
        assert_eq!(text.file_vaddr, 0x40_0123);
    }

    #[test]
    fn test_third_region_is_rejected() {
        let mut space = space(0);
        space.define_region(0x40_0000, 0x1000, 0, 0, RX).unwrap();
        space.define_region(0x50_0000, 0x1000, 0, 0, RW).unwrap();
        assert_eq!(
            space.define_region(0x60_0000, 0x1000, 0, 0, RW),
            Err(VmError::TooManyRegions)
        );
    }

    #[test]
    fn test_overlapping_regions_are_rejected() {
        let mut space = space(0);
        space.define_region(0x40_0000, 0x2000, 0, 0, RX).unwrap();
        assert_eq!(
            space.define_region(0x40_1800, 0x1000, 0, 0, RW),
            Err(VmError::RegionOverlap(0x40_1800))
        );
        assert_eq!(
            space.define_region(space.stack_base() - 0x800, 0x1000, 0, 0, RW),
            Err(VmError::RegionOverlap(space.stack_base() - 0x800))
        );
    }

    #[test]
    fn test_oversized_region_is_rejected() {
        let mut space = space(0);
        assert_eq!(
            space.define_region(0x40_0123, usize::MAX - 16, 0, 0, RW),
            Err(VmError::RegionOverlap(0x40_0123))
        );
        assert_eq!(
            space.define_region(0x40_0000, usize::MAX - 0x2000, 0, 0, RW),
            Err(VmError::RegionOverlap(0x40_0000))
        );
        assert!(space.text().is_none());
    }

    #[test]
    fn test_classification_and_permissions() {
        let mut space = space(0);
        space.define_region(0x40_0000, 0x1000, 0, 0, RX).unwrap();
        space.define_region(0x50_0000, 0x1000, 0, 0, RW).unwrap();

        assert_eq!(space.contains(0x40_0fff), Some(Segment::Text));
        assert_eq!(space.contains(0x50_0000), Some(Segment::Data));
        assert_eq!(space.contains(USER_STACK_TOP - 1), Some(Segment::Stack));
        assert_eq!(space.contains(0x40_1000), None);
        assert_eq!(space.contains(USER_STACK_TOP), None);

        assert!(!space.is_writable(0x40_0000));
        assert!(space.is_writable(0x50_0010));
        assert!(space.is_writable(space.stack_base()));
        assert!(!space.is_writable(0x10));
    }

    #[test]
    fn test_demand_load_zero_pads_past_file_size() {
        let mut space = space(64);
        space.define_region(0x40_0000, 4096, 0, 10, RX).unwrap();

        let mut frame = Frame::new_box_zeroed();
        frame.as_bytes_mut().fill(0xee);
        assert_eq!(
            space.load_page(Segment::Text, 0x40_0000, &mut frame),
            Ok(PageFill::Loaded)
        );

        let bytes = frame.as_bytes();
        assert_eq!(&bytes[..10], &pattern(10)[..]);
        assert!(bytes[10..].iter().all(|&b| b == 0));
        assert_eq!(bytes.len() - 10, 4086);
    }

    #[test]
    fn test_unaligned_region_start_loads_at_its_offset() {
        let mut space = space(8192);
        space
            .define_region(0x40_0100, 0x2000, 0x20, 0x1f00, RX)
            .unwrap();

        let mut first = Frame::new_box_zeroed();
        space.load_page(Segment::Text, 0x40_0000, &mut first).unwrap();
        let expected = pattern(8192);
        assert!(first.as_bytes()[..0x100].iter().all(|&b| b == 0));
        assert_eq!(&first.as_bytes()[0x100..], &expected[0x20..0x20 + 0xf00]);

        let mut second = Frame::new_box_zeroed();
        space.load_page(Segment::Text, 0x40_1000, &mut second).unwrap();
        assert_eq!(&second.as_bytes()[..0x1000], &expected[0xf20..0x1f20]);

        let mut bss = Frame::new_box_zeroed();
        bss.as_bytes_mut().fill(1);
        assert_eq!(
            space.load_page(Segment::Text, 0x40_2000, &mut bss),
            Ok(PageFill::Zeroed)
        );
        assert!(bss.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_truncated_executable_is_load_error() {
        let mut space = space(4);
        space.define_region(0x40_0000, 4096, 0, 10, RX).unwrap();

        let mut frame = Frame::new_box_zeroed();
        assert!(matches!(
            space.load_page(Segment::Text, 0x40_0000, &mut frame),
            Err(LoadError::ShortRead { .. })
        ));
    }

    #[test]
    fn test_stack_reservation_lives_until_destroy() {
        use crate::mem::{Placement, Ram};

        let mut frames = FrameAllocator::new(Ram::new(0, 8 * PAGE_FRAME_SIZE));
        frames.bootstrap(Placement::FirstFit);
        let mut space = space(0);

        space.prepare_load(&mut frames).unwrap();
        assert_eq!(frames.frames_in_use(), 2);
        assert_eq!(space.define_stack(), USER_STACK_TOP);

        space.destroy(&mut frames);
        assert_eq!(frames.frames_in_use(), 0);
    }

    #[test]
    #[should_panic(expected = "stack defined before prepare_load")]
    fn test_stack_needs_prepare_load() {
        space(0).define_stack();
    }
}

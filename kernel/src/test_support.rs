//! Shared fixtures: a small machine and a process with text, data and stack.

use crate::mem::Placement;
use crate::swapping::{RamSwapFile, SwapFile};
use crate::user_program::{ExecutableImage, RegionFlags};
use crate::vm::tlb::TlbHardware;
use crate::vm::{ProcessContext, SoftTlb, VmConfig, VmSpace, VmSystem};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use vmos_shared::mem::{VirtAddr, PAGE_FRAME_SIZE};

pub const TEXT_BASE: VirtAddr = 0x40_0000;
pub const TEXT_PAGES: usize = 4;
pub const TEXT_FILE_SIZE: usize = 3 * PAGE_FRAME_SIZE + 100;

pub const DATA_BASE: VirtAddr = 0x50_0000;
pub const DATA_PAGES: usize = 64;
pub const DATA_FILE_OFFSET: usize = 4 * PAGE_FRAME_SIZE;
pub const DATA_FILE_SIZE: usize = 2 * PAGE_FRAME_SIZE;

/// Bytes that are never zero, so zero fill is visible.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 + 1).collect()
}

pub fn test_image() -> Arc<ExecutableImage> {
    Arc::new(ExecutableImage::new(pattern(DATA_FILE_OFFSET + DATA_FILE_SIZE)))
}

/// 32 frames, 4 of them the kernel's, and a swap file twice the size of
/// the data region.
pub fn test_config() -> VmConfig {
    VmConfig {
        ram_size: 32 * PAGE_FRAME_SIZE,
        kernel_reserved_frames: 4,
        swap_file_size: 128 * PAGE_FRAME_SIZE,
        stack_pages: 2,
        placement: Placement::FirstFit,
    }
}

pub fn test_vm_with(config: VmConfig) -> VmSystem {
    test_vm_with_file(config, RamSwapFile::new(config.swap_file_size))
}

pub fn test_vm_with_file<F: SwapFile>(config: VmConfig, swap_file: F) -> VmSystem<SoftTlb, F> {
    VmSystem::bootstrap(config, SoftTlb::new(), swap_file).unwrap()
}

/// The default machine on a swap file that can be told to fail.
pub fn flaky_vm() -> (VmSystem<SoftTlb, FlakySwapFile>, SwapFaults) {
    let config = test_config();
    let faults = SwapFaults::default();
    let file = FlakySwapFile {
        inner: RamSwapFile::new(config.swap_file_size),
        faults: faults.clone(),
    };
    (test_vm_with_file(config, file), faults)
}

/// Switches for a [`FlakySwapFile`], kept by the test after the file has
/// moved into the VM.
#[derive(Clone, Default)]
pub struct SwapFaults {
    reads: Arc<AtomicBool>,
    writes: Arc<AtomicBool>,
}

impl SwapFaults {
    pub fn short_reads(&self, on: bool) {
        self.reads.store(on, Ordering::Relaxed);
    }

    pub fn short_writes(&self, on: bool) {
        self.writes.store(on, Ordering::Relaxed);
    }
}

/// While a fault is switched on, every transfer moves half of what was asked.
pub struct FlakySwapFile {
    inner: RamSwapFile,
    faults: SwapFaults,
}

impl SwapFile for FlakySwapFile {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn read_at(&mut self, offset: usize, buf: &mut [u8]) -> usize {
        if self.faults.reads.load(Ordering::Relaxed) {
            let half = buf.len() / 2;
            return self.inner.read_at(offset, &mut buf[..half]);
        }
        self.inner.read_at(offset, buf)
    }

    fn write_at(&mut self, offset: usize, buf: &[u8]) -> usize {
        if self.faults.writes.load(Ordering::Relaxed) {
            return self.inner.write_at(offset, &buf[..buf.len() / 2]);
        }
        self.inner.write_at(offset, buf)
    }
}

pub fn test_vm() -> VmSystem {
    test_vm_with(test_config())
}

/// A loaded process: text is read-only, data is writable and mostly bss.
pub fn test_space<H: TlbHardware, F: SwapFile>(vm: &mut VmSystem<H, F>) -> VmSpace {
    test_space_from(vm, test_image())
}

/// The usual layout over `image`, which may be too short for it.
pub fn test_space_from<H: TlbHardware, F: SwapFile>(
    vm: &mut VmSystem<H, F>,
    image: Arc<ExecutableImage>,
) -> VmSpace {
    let mut space = vm.create_vmspace(image);
    space
        .addrspace
        .define_region(
            TEXT_BASE,
            TEXT_PAGES * PAGE_FRAME_SIZE,
            0,
            TEXT_FILE_SIZE,
            RegionFlags::new(true, false, true),
        )
        .unwrap();
    space
        .addrspace
        .define_region(
            DATA_BASE,
            DATA_PAGES * PAGE_FRAME_SIZE,
            DATA_FILE_OFFSET,
            DATA_FILE_SIZE,
            RegionFlags::new(true, true, false),
        )
        .unwrap();
    space.addrspace.prepare_load(vm.frames_mut()).unwrap();
    space
}

/// A process whose death unwinds, so tests can watch it happen.
#[derive(Default)]
pub struct TestProcess {
    pub space: Option<VmSpace>,
    pub killed: Option<i32>,
}

impl TestProcess {
    pub fn new(space: VmSpace) -> Self {
        Self {
            space: Some(space),
            killed: None,
        }
    }
}

impl ProcessContext for TestProcess {
    fn current_vmspace(&mut self) -> Option<&mut VmSpace> {
        self.space.as_mut()
    }

    fn kill_current_process(&mut self, exit_code: i32) -> ! {
        self.killed = Some(exit_code);
        panic!("process killed with exit code {exit_code}");
    }
}

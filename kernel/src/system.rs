//! The kernel's one VM system.

use crate::error::VmError;
use crate::swapping::RamSwapFile;
use crate::sync::InterruptLock;
use crate::vm::fault::{kill_if_fatal, service_fault};
use crate::vm::{FaultKind, ProcessContext, SoftTlb, VmConfig, VmStats, VmSystem};
use alloc::boxed::Box;
use once_cell::race::OnceBox;
use vmos_shared::mem::{PhysAddr, VirtAddr};

pub static VM_SYSTEM: OnceBox<InterruptLock<VmSystem>> = OnceBox::new();

/// Bring up the VM system over the simulated TLB and an in-memory swap file.
///
/// # Panics
///
/// Panics if called twice.
pub fn vm_bootstrap(config: VmConfig) -> Result<(), VmError> {
    let vm = VmSystem::bootstrap(
        config,
        SoftTlb::new(),
        RamSwapFile::new(config.swap_file_size),
    )?;
    assert!(
        VM_SYSTEM.set(Box::new(InterruptLock::new(vm))).is_ok(),
        "VM system bootstrapped twice"
    );
    Ok(())
}

pub fn vm_system() -> &'static InterruptLock<VmSystem> {
    VM_SYSTEM.get().expect("VM system not initialized.")
}

/// Trap-layer entry point. `fault_type` is the raw code from the trap frame.
pub fn vm_fault(
    fault_type: u32,
    addr: VirtAddr,
    process: &mut impl ProcessContext,
) -> Result<(), VmError> {
    let kind = FaultKind::try_from(fault_type)?;
    let result = {
        let mut vm = vm_system().lock();
        service_fault(&mut *vm, kind, addr, process)
    };
    kill_if_fatal(result, process)
}

pub fn alloc_kpages(pages: usize) -> Option<PhysAddr> {
    vm_system().lock().alloc_kpages(pages)
}

pub fn free_kpages(addr: PhysAddr) {
    vm_system().lock().free_kpages(addr);
}

pub fn vm_shutdown() -> VmStats {
    vm_system().lock().shutdown()
}

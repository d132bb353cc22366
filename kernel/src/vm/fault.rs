//! TLB miss and protection fault handling.

use super::tlb::{TlbHardware, TlbInstall};
use super::vmstats::VmStat;
use super::{VmSpace, VmSystem};
use crate::error::VmError;
use crate::swapping::SwapFile;
use crate::sync::hold_interrupts;
use vmos_shared::eprintln;
use vmos_shared::mem::{page_align_down, VirtAddr};

/// Exit code of a process killed by a fault.
pub const FAULT_EXIT_CODE: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    Read,
    Write,
    /// A store to a page whose TLB entry does not allow writes.
    ReadOnly,
}

impl TryFrom<u32> for FaultKind {
    type Error = VmError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FaultKind::Read),
            1 => Ok(FaultKind::Write),
            2 => Ok(FaultKind::ReadOnly),
            other => Err(VmError::InvalidFaultKind(other)),
        }
    }
}

/// What the fault handler needs from the process layer.
pub trait ProcessContext {
    /// The faulting process's VM state, or `None` before any process runs.
    fn current_vmspace(&mut self) -> Option<&mut VmSpace>;

    fn kill_current_process(&mut self, exit_code: i32) -> !;
}

/// Service one fault at `addr`.
///
/// Interrupts stay off for the whole fault, so no one sees the coremap,
/// page table, swap store or TLB half updated. Errors that leave the
/// process unable to continue kill it and do not return; the rest are
/// returned to the trap layer.
pub fn handle_fault<H: TlbHardware, F: SwapFile>(
    vm: &mut VmSystem<H, F>,
    kind: FaultKind,
    addr: VirtAddr,
    process: &mut impl ProcessContext,
) -> Result<(), VmError> {
    let result = {
        let _interrupts = hold_interrupts();
        service_fault(vm, kind, addr, process)
    };
    kill_if_fatal(result, process)
}

/// Hand a fatal fault to the process layer. Must be called with nothing
/// locked: a killed process never comes back to release it.
pub(crate) fn kill_if_fatal(
    result: Result<(), VmError>,
    process: &mut impl ProcessContext,
) -> Result<(), VmError> {
    match result {
        Err(err) if err.is_fatal() => {
            eprintln!("vm: killing process: {err}");
            process.kill_current_process(FAULT_EXIT_CODE)
        }
        other => other,
    }
}

pub(crate) fn service_fault<H: TlbHardware, F: SwapFile>(
    vm: &mut VmSystem<H, F>,
    kind: FaultKind,
    addr: VirtAddr,
    process: &mut impl ProcessContext,
) -> Result<(), VmError> {
    vm_debug!("vm: {kind:?} fault at {addr:#x}");
    if kind == FaultKind::ReadOnly {
        return Err(VmError::ReadOnly(addr));
    }

    let space = process.current_vmspace().ok_or(VmError::NoAddressSpace)?;
    let writable = space.addrspace.is_writable(addr);
    if kind == FaultKind::Write && space.addrspace.contains(addr).is_some() && !writable {
        return Err(VmError::ReadOnly(addr));
    }

    let page = page_align_down(addr);
    let frame = space.page_table.lookup(&space.addrspace, vm, addr)?;
    if writable {
        space.page_table.mark_dirty(page);
    }

    vm.stats.inc(VmStat::TlbFault);
    match vm.tlb.install(page, frame, writable) {
        TlbInstall::Free(_) => vm.stats.inc(VmStat::TlbFaultFree),
        TlbInstall::Replaced(_) => vm.stats.inc(VmStat::TlbFaultReplace),
    }
    Ok(())
}

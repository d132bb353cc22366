use crate::swapping::SwapSlot;
use crate::user_program::executable::LoadError;
use core::fmt;
use vmos_shared::mem::VirtAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// No frame could be found, and nothing was left to evict.
    OutOfMemory,
    /// An address space already has its text and data regions.
    TooManyRegions,
    RegionOverlap(VirtAddr),
    /// The address is outside every region of the faulting process.
    BadAddress(VirtAddr),
    /// A write to a page its region does not allow writing.
    ReadOnly(VirtAddr),
    Load(LoadError),
    /// The swap file transferred less than a full page.
    SwapIo { slot: SwapSlot, transferred: usize },
    /// A fault arrived with no address space installed, i.e. during boot.
    NoAddressSpace,
    InvalidFaultKind(u32),
    Config(&'static str),
}

impl VmError {
    /// Whether this error ends the faulting process rather than being
    /// reported back to the trap layer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VmError::OutOfMemory
                | VmError::BadAddress(_)
                | VmError::ReadOnly(_)
                | VmError::Load(_)
                | VmError::SwapIo { .. }
        )
    }
}

impl From<LoadError> for VmError {
    fn from(err: LoadError) -> Self {
        VmError::Load(err)
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VmError::OutOfMemory => write!(f, "out of physical memory"),
            VmError::TooManyRegions => write!(f, "too many regions"),
            VmError::RegionOverlap(vaddr) => write!(f, "region at {vaddr:#x} overlaps another"),
            VmError::BadAddress(vaddr) => write!(f, "bad address {vaddr:#x}"),
            VmError::ReadOnly(vaddr) => write!(f, "write to read-only address {vaddr:#x}"),
            VmError::Load(err) => write!(f, "load error: {err}"),
            VmError::SwapIo { slot, transferred } => {
                write!(f, "short transfer on swap slot {slot}: {transferred} bytes")
            }
            VmError::NoAddressSpace => write!(f, "fault with no address space"),
            VmError::InvalidFaultKind(kind) => write!(f, "invalid fault type {kind}"),
            VmError::Config(reason) => write!(f, "bad vm configuration: {reason}"),
        }
    }
}

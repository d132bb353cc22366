pub mod addrspace;
pub mod executable;

pub use addrspace::{AddressSpace, PageFill, Region, RegionFlags, Segment};
pub use executable::{ExecutableImage, LoadError, SegmentReader};

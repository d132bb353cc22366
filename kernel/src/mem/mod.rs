mod dummy_allocator;
pub mod frame_allocator;
mod ram;

pub use frame_allocator::{CoreMapEntry, FrameAllocator, Placement};
pub use ram::{Frame, Ram};

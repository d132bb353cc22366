//! Virtual-memory manager: coremap frame allocator, swap store, per-process
//! address spaces and page tables, and the TLB fault handler that ties them
//! together.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

#[macro_use]
mod macros;

pub mod error;
pub mod mem;
pub mod paging;
pub mod swapping;
pub mod sync;
pub mod system;
pub mod user_program;
pub mod vm;

#[cfg(test)]
mod test_support;

pub use error::VmError;
pub use vm::{VmConfig, VmSpace, VmSystem};

pub mod intr;

pub use intr::{hold_interrupts, InterruptLock, InterruptLockGuard, InterruptsGuard};

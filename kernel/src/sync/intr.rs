//! Interrupt-priority exclusion.
//!
//! On a single core, keeping interrupts off is mutual exclusion: nothing
//! else runs until they come back on. Disables nest, and only the outermost
//! enable turns interrupts back on.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static INTR_DISABLE_COUNT: AtomicUsize = AtomicUsize::new(0);

// This function disables interrupts and increments the disable count.
pub fn intr_disable() {
    INTR_DISABLE_COUNT.fetch_add(1, Ordering::SeqCst);
    #[cfg(all(target_os = "none", target_arch = "x86"))]
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }
}

// This function decrements the disable count and enables interrupts once it
// reaches zero.
pub fn intr_enable() {
    let previous = INTR_DISABLE_COUNT.fetch_sub(1, Ordering::SeqCst);
    assert_ne!(previous, 0, "interrupts enabled more often than disabled");
    if previous == 1 {
        #[cfg(all(target_os = "none", target_arch = "x86"))]
        unsafe {
            core::arch::asm!("sti", options(nomem, nostack));
        }
    }
}

pub fn interrupts_disabled() -> bool {
    INTR_DISABLE_COUNT.load(Ordering::SeqCst) > 0
}

/// Keeps interrupts off until dropped.
#[must_use]
pub struct InterruptsGuard {
    _private: (),
}

pub fn hold_interrupts() -> InterruptsGuard {
    intr_disable();
    InterruptsGuard { _private: () }
}

impl Drop for InterruptsGuard {
    fn drop(&mut self) {
        intr_enable();
    }
}

/// Data that may only be touched with interrupts off.
///
/// Hosted builds can run on several cores at once, so the lock also spins on
/// a flag. On the single-core target the flag is never contended.
pub struct InterruptLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `locked`.
unsafe impl<T: Send> Sync for InterruptLock<T> {}
unsafe impl<T: Send> Send for InterruptLock<T> {}

impl<T> InterruptLock<T> {
    pub const fn new(data: T) -> InterruptLock<T> {
        InterruptLock {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    // Disables interrupts, then takes the flag.
    pub fn lock(&self) -> InterruptLockGuard<T> {
        let interrupts = hold_interrupts();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
        InterruptLockGuard {
            lock: self,
            _interrupts: interrupts,
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

// A guard that provides access to the data protected by the `InterruptLock`.
// Dropping it releases the flag and then restores interrupts.
pub struct InterruptLockGuard<'a, T> {
    lock: &'a InterruptLock<T>,
    _interrupts: InterruptsGuard,
}

impl<T> Deref for InterruptLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for InterruptLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for InterruptLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

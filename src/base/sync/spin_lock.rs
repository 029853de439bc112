//! Spin-lock implementations.
//!
//! [`SpinLockPure`] is the teacher's bare test-and-set lock: it provides only the lock
//! semantic and does not manage any data, and does not touch the IRQ mask. Used as-is, a
//! handler that allocates while the idle loop holds the buddy lock would spin forever
//! waiting for itself. [`IrqSpinLock`] is
//! the real lock the allocator and interrupt table use: it wraps a value, and its guard
//! disables supervisor interrupts for its whole lifetime so a same-hart handler can never
//! observe the lock held.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::base::irq;

/// A spin lock object works like the C type, it only provides the lock semantic but
/// does not manage any data.
#[repr(C)]
pub struct SpinLockPure {
    lock: AtomicBool,
}

impl SpinLockPure {
    #[inline]
    pub const fn new() -> Self {
        Self { lock: AtomicBool::new(false) }
    }

    #[inline]
    pub fn lock(&self) {
        while self.lock.compare_exchange_weak(
            false, true, Ordering::AcqRel, Ordering::Relaxed).is_err() {}
    }

    #[inline]
    pub fn unlock(&self) {
        self.lock.store(false, Ordering::Release);
    }
}

/// A lock that disables this hart's interrupts for the duration it is held, guarding the
/// value `T` it wraps. There is only one hart, so the spin loop never actually contends;
/// the `SpinLockPure` is kept anyway so that re-entrant acquisition from the same hart
/// deadlocks loudly instead of silently reading torn state.
pub struct IrqSpinLock<T> {
    raw: SpinLockPure,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for IrqSpinLock<T> {}

impl<T> IrqSpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self { raw: SpinLockPure::new(), data: UnsafeCell::new(data) }
    }

    pub fn lock(&self) -> IrqSpinLockGuard<T> {
        let flags = irq::local_irq_save();
        self.raw.lock();
        IrqSpinLockGuard { lock: self, flags }
    }
}

pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    flags: usize,
}

impl<'a, T> Deref for IrqSpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for IrqSpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for IrqSpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.raw.unlock();
        irq::local_irq_restore(self.flags);
    }
}

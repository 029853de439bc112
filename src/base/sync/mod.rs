//! Locking primitives.

mod spin_lock;

pub use spin_lock::{IrqSpinLock, IrqSpinLockGuard, SpinLockPure};

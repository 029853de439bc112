//! Supervisor timer (component G): arms the next tick via `stimecmp` and counts ticks.
//!
//! Grounded in the teacher's timer module, which drives the same Sstc-style `stimecmp`
//! CSR from a registered `dispatch` handler rather than an SBI timer call.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::cpu;
use crate::constant::TIMER_INTERVAL;
use crate::trap::dispatch;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Register the timer handler on the TIMER chain and arm the first tick. Call once,
/// after [`crate::trap::trap_init`].
pub fn timer_init() {
    dispatch::register_interrupt(dispatch::IRQ_TIMER, system_timer_handler, "timer");
    dispatch::enable_interrupt(dispatch::IRQ_TIMER);
    set_next_timer(TIMER_INTERVAL);
}

/// Current value of the `time` CSR (a free-running cycle counter).
pub fn get_time() -> u64 {
    cpu::time_read()
}

/// Arm `stimecmp` to fire `interval` cycles from now.
pub fn set_next_timer(interval: u64) {
    cpu::stimecmp_write(get_time() + interval);
}

/// Monotonic count of timer interrupts serviced so far.
pub fn ticks() -> u64 {
    TICKS.load(Ordering::SeqCst)
}

/// The handler registered on the TIMER chain: bump the tick counter and rearm.
fn system_timer_handler() {
    TICKS.fetch_add(1, Ordering::SeqCst);
    set_next_timer(TIMER_INTERVAL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn handler_advances_ticks_and_rearms() {
        let _guard = TEST_LOCK.lock().unwrap();
        let before = ticks();
        system_timer_handler();
        assert_eq!(ticks(), before + 1);
    }
}

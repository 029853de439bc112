//! Interrupt dispatcher (component E): a chain of handlers per IRQ line, with
//! priority-gated nested dispatch.
//!
//! Grounded in the teacher's `util::list` intrusive-list idiom: each chain's sentinel
//! lives in a fixed-size array (`MAX_IRQ_NUM` lines), and descriptors are heap blocks
//! obtained from [`crate::mm::kmalloc`] (the small-object allocator backing interrupt
//! descriptors),
//! threaded onto the chain with the same head-prev-as-tail trick `util::list` already
//! provides for O(1) tail append.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch::cpu;
use crate::mm;
use crate::util::list::{self, List};

pub const MAX_IRQ_NUM: usize = 64;

pub const IRQ_SOFTWARE: usize = 1;
pub const IRQ_TIMER: usize = 5;
pub const IRQ_EXTERNAL: usize = 9;

pub const PRIORITY_HIGH: usize = 0;
pub const PRIORITY_NORMAL: usize = 1;
pub const PRIORITY_LOW: usize = 2;
/// Sentinel meaning "no interrupt in flight" — one level below the lowest real priority.
const PRIORITY_NONE: usize = PRIORITY_LOW + 1;

pub type Handler = fn();

#[repr(C)]
struct Descriptor {
    link: List,
    handler: Handler,
    irq: usize,
    name: [u8; 32],
}

static mut CHAINS: [List; MAX_IRQ_NUM] = {
    const EMPTY: List = List::new();
    [EMPTY; MAX_IRQ_NUM]
};

static CURRENT_PRIORITY: AtomicUsize = AtomicUsize::new(PRIORITY_NONE);

pub fn init() {
    unsafe {
        for head in CHAINS.iter_mut() {
            list::init(head as *mut List);
        }
    }
    CURRENT_PRIORITY.store(PRIORITY_NONE, Ordering::SeqCst);
}

fn priority_of(irq: usize) -> Option<usize> {
    match irq {
        IRQ_SOFTWARE => Some(PRIORITY_LOW),
        IRQ_TIMER => Some(PRIORITY_NORMAL),
        IRQ_EXTERNAL => Some(PRIORITY_HIGH),
        _ => None,
    }
}

fn sie_bit(irq: usize) -> Option<usize> {
    match irq {
        IRQ_SOFTWARE => Some(cpu::SIE_SSIE),
        IRQ_TIMER => Some(cpu::SIE_STIE),
        IRQ_EXTERNAL => Some(cpu::SIE_SEIE),
        _ => None,
    }
}

/// Enable the supervisor-interrupt-enable bit for one IRQ line.
pub fn enable_interrupt(irq: usize) {
    if let Some(bit) = sie_bit(irq) {
        let flags = crate::base::irq::local_irq_save();
        cpu::sie_write(cpu::sie_read() | bit);
        crate::base::irq::local_irq_restore(flags);
    }
}

/// Disable the supervisor-interrupt-enable bit for one IRQ line.
pub fn disable_interrupt(irq: usize) {
    if let Some(bit) = sie_bit(irq) {
        let flags = crate::base::irq::local_irq_save();
        cpu::sie_write(cpu::sie_read() & !bit);
        crate::base::irq::local_irq_restore(flags);
    }
}

/// Register `handler` on `irq`'s chain, run last among handlers already registered
/// there. Returns `-1` (`BadArg`) for an out-of-range `irq`.
pub fn register_interrupt(irq: usize, handler: Handler, name: &str) -> isize {
    if irq >= MAX_IRQ_NUM {
        return -1;
    }
    let raw = mm::kmalloc(core::mem::size_of::<Descriptor>());
    if raw.is_null() {
        return -1;
    }
    let desc = raw as *mut Descriptor;
    let mut name_bytes = [0u8; 32];
    let n = core::cmp::min(name.len(), 31);
    name_bytes[..n].copy_from_slice(&name.as_bytes()[..n]);
    unsafe {
        (*desc).link = List::new();
        (*desc).handler = handler;
        (*desc).irq = irq;
        (*desc).name = name_bytes;

        let flags = crate::base::irq::local_irq_save();
        list::push_back(chain_head(irq), &mut (*desc).link as *mut List);
        crate::base::irq::local_irq_restore(flags);
    }
    0
}

/// Detach the first descriptor on `irq`'s chain whose handler matches, freeing it.
pub fn unregister_interrupt(irq: usize, handler: Handler) -> isize {
    if irq >= MAX_IRQ_NUM {
        return -1;
    }
    let flags = crate::base::irq::local_irq_save();
    let head = chain_head(irq);
    let mut cur = unsafe { (*head).next };
    let found = loop {
        if cur == head {
            break core::ptr::null_mut();
        }
        let desc = cur as *mut Descriptor;
        if unsafe { (*desc).handler } as usize == handler as usize {
            break desc;
        }
        cur = unsafe { (*cur).next };
    };
    if !found.is_null() {
        unsafe { list::remove(&mut (*found).link as *mut List); }
    }
    crate::base::irq::local_irq_restore(flags);
    if found.is_null() {
        return -1;
    }
    mm::kfree(found as *mut u8);
    0
}

fn chain_head(irq: usize) -> *mut List {
    unsafe { &mut CHAINS[irq] as *mut List }
}

/// Classify a raw `scause` value. Returns the post-shift IRQ number (1/5/9) for a
/// recognized interrupt, after running its chain, or 0 if `scause` is an exception (or
/// an interrupt this kernel does not recognize).
pub fn devintr(scause: usize) -> usize {
    if scause & cpu::SCAUSE_INTERRUPT_BIT == 0 {
        return 0;
    }
    let irq = scause & 0xf;
    if irq == IRQ_SOFTWARE {
        // Clear the software-interrupt-pending bit before running the chain so a
        // handler that re-raises it triggers a fresh trap rather than being silently
        // swallowed by the still-set SIP bit.
        cpu::sip_write(cpu::sip_read() & !cpu::SIE_SSIE);
    }
    if priority_of(irq).is_none() {
        log::warn!("devintr: unrecognized interrupt cause {:#x}", scause);
        return 0;
    }
    handle_interrupt_chain(irq);
    irq
}

/// Run `irq`'s chain under priority-gated nesting. Rejects entry outright if
/// an equal-or-higher-priority chain is already in flight on this hart.
pub fn handle_interrupt_chain(irq: usize) {
    let Some(p) = priority_of(irq) else { return; };

    let old = CURRENT_PRIORITY.load(Ordering::SeqCst);
    if p >= old {
        return;
    }
    CURRENT_PRIORITY.store(p, Ordering::SeqCst);

    disable_interrupt(irq);
    cpu::sstatus_sti();

    let head = chain_head(irq);
    let mut cur = unsafe { (*head).next };
    while cur != head {
        let desc = cur as *mut Descriptor;
        let next = unsafe { (*cur).next };
        unsafe { ((*desc).handler)(); }
        cur = next;
    }

    enable_interrupt(irq);
    CURRENT_PRIORITY.store(old, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize as StdAtomicUsize, Ordering as StdOrdering};
    use std::sync::Mutex;

    // The dispatcher's state (`CHAINS`, `CURRENT_PRIORITY`) is process-global, so these
    // tests serialize on a lock to avoid interfering with each other.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    static CALL_LOG: StdAtomicUsize = StdAtomicUsize::new(0);

    fn record_a() { CALL_LOG.fetch_add(1, StdOrdering::SeqCst); }
    fn record_b() { CALL_LOG.fetch_add(10, StdOrdering::SeqCst); }

    #[test]
    fn p6_chain_runs_in_registration_order_then_respects_unregister() {
        let _guard = TEST_LOCK.lock().unwrap();
        init();
        CALL_LOG.store(0, StdOrdering::SeqCst);

        register_interrupt(IRQ_EXTERNAL, record_a, "a");
        register_interrupt(IRQ_EXTERNAL, record_b, "b");
        handle_interrupt_chain(IRQ_EXTERNAL);
        assert_eq!(CALL_LOG.load(StdOrdering::SeqCst), 11);

        unregister_interrupt(IRQ_EXTERNAL, record_a);
        CALL_LOG.store(0, StdOrdering::SeqCst);
        handle_interrupt_chain(IRQ_EXTERNAL);
        assert_eq!(CALL_LOG.load(StdOrdering::SeqCst), 10);

        unregister_interrupt(IRQ_EXTERNAL, record_b);
    }

    #[test]
    fn p7_priority_gating_rejects_equal_or_lower_while_in_flight() {
        let _guard = TEST_LOCK.lock().unwrap();
        init();

        CURRENT_PRIORITY.store(PRIORITY_HIGH, Ordering::SeqCst);
        CALL_LOG.store(0, StdOrdering::SeqCst);
        register_interrupt(IRQ_SOFTWARE, record_a, "low-while-high");
        handle_interrupt_chain(IRQ_SOFTWARE);
        assert_eq!(CALL_LOG.load(StdOrdering::SeqCst), 0, "LOW must not run while HIGH is in flight");
        unregister_interrupt(IRQ_SOFTWARE, record_a);

        init();
        CURRENT_PRIORITY.store(PRIORITY_LOW, Ordering::SeqCst);
        CALL_LOG.store(0, StdOrdering::SeqCst);
        register_interrupt(IRQ_EXTERNAL, record_a, "high-while-low");
        handle_interrupt_chain(IRQ_EXTERNAL);
        assert_eq!(CALL_LOG.load(StdOrdering::SeqCst), 1, "HIGH must run to completion even while LOW is in flight");
        unregister_interrupt(IRQ_EXTERNAL, record_a);
    }
}

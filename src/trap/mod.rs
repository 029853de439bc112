//! Kernel trap handling: the fixed trap-frame contract (component D's Rust-visible half),
//! the top-level `kerneltrap` body, and the priority-gated dispatcher (component E, in
//! [`dispatch`]) and exception classifier (component F, in [`exception`]).

pub mod dispatch;
pub mod exception;

use core::mem::size_of;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch::cpu;

/// Fixed 288-byte / 36-slot register-save area. Offsets are part of the external
/// contract: the assembly trap entry/exit stub in `asm::trap` reads and writes these
/// fields by raw offset, so field order must never change without updating the stub.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct TrapFrame {
    pub kernel_satp: usize,
    pub kernel_sp: usize,
    pub kernel_trap: usize,
    pub epc: usize,
    pub kernel_hartid: usize,
    pub ra: usize,
    pub sp: usize,
    pub gp: usize,
    pub tp: usize,
    pub t0: usize,
    pub t1: usize,
    pub t2: usize,
    pub s0: usize,
    pub s1: usize,
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub a3: usize,
    pub a4: usize,
    pub a5: usize,
    pub a6: usize,
    pub a7: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
    pub t3: usize,
    pub t4: usize,
    pub t5: usize,
    pub t6: usize,
}

sa::const_assert_eq!(size_of::<TrapFrame>(), 288);

impl TrapFrame {
    pub const fn zeroed() -> Self {
        // SAFETY-free: every field is a plain `usize`, so the all-zero bit pattern is a
        // valid value for each of them.
        unsafe { core::mem::zeroed() }
    }
}

/// Debug-only reentrancy counter: how many nested `kerneltrap` calls are currently on
/// this hart's stack. Not used for any correctness decision — that is `current_priority`
/// in [`dispatch`] — only for diagnostics.
static TRAP_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// Install the trap vector for this hart and clear any stale pending state. Idempotent;
/// call once per hart before enabling interrupts.
pub fn trap_init_hart() {
    cpu::stvec_write(crate::asm::trap::kernelvec as usize);
    cpu::sip_write(cpu::sip_read() & !cpu::SIE_SSIE);
}

/// One-time, hart-independent trap subsystem setup: nothing beyond zeroing the
/// dispatcher's chains, which are already zero-initialized statics. Kept as an explicit
/// call so `main::kinit`'s init order stays explicit rather than implicit in static init.
pub fn trap_init() {
    dispatch::init();
}

/// Entry point called from the assembly trap stub with interrupts already disabled and
/// the faulting `sepc`/`sstatus` already on the stack (and also readable straight from
/// the CSRs here, since the stub does not clear them before calling in).
///
/// Returns nothing; the stub resumes at whatever `sepc` holds once this returns — the
/// dispatcher may have moved `sepc` past a handled instruction (e.g. `ecall`), but this
/// kernel never does, since it implements no syscalls.
#[no_mangle]
pub extern "C" fn kerneltrap() {
    let sepc = cpu::sepc_read();
    let sstatus = cpu::sstatus_read();
    let scause = cpu::scause_read();

    assert_eq!(sstatus & cpu::SSTATUS_SPP, cpu::SSTATUS_SPP, "kerneltrap: not from supervisor mode");
    assert!(cpu::is_irq_disabled(), "kerneltrap: interrupts were enabled at entry");

    TRAP_DEPTH.fetch_add(1, Ordering::SeqCst);

    let irq = dispatch::devintr(scause);
    if irq == 0 {
        let tval = cpu::stval_read();
        exception::handle_exception(scause, sepc, tval);
    }

    TRAP_DEPTH.fetch_sub(1, Ordering::SeqCst);

    cpu::sepc_write(sepc);
    cpu::sstatus_write(sstatus);
}

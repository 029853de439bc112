//! Process table placeholder. Kept only insofar as it pins the trap-frame layout (see
//! [`crate::trap::TrapFrame`]); there is no scheduler here (single hart, no preemption),
//! so this module is inert bookkeeping, grounded in the teacher's
//! `proc::task::TaskInfo`/`TaskStatus` naming.

use crate::trap::TrapFrame;
use crate::vm::PageTable;

pub const MAX_PROC_NAME: usize = 16;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ProcState {
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

/// Saved callee-saved registers for a context switch. Present for layout completeness;
/// nothing in this kernel ever switches between two of these (no scheduler).
#[repr(C)]
#[derive(Copy, Clone)]
pub struct Context {
    pub ra: usize,
    pub sp: usize,
    pub s0: usize,
    pub s1: usize,
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
}

impl Context {
    pub const fn zeroed() -> Self {
        unsafe { core::mem::zeroed() }
    }
}

pub struct Process {
    pub pid: usize,
    pub state: ProcState,
    pub kstack: usize,
    pub sz: usize,
    pub pagetable: *mut PageTable,
    pub trapframe: *mut TrapFrame,
    pub context: Context,
    pub name: [u8; MAX_PROC_NAME],
}

impl Process {
    pub const fn unused() -> Self {
        Self {
            pid: 0,
            state: ProcState::Unused,
            kstack: 0,
            sz: 0,
            pagetable: core::ptr::null_mut(),
            trapframe: core::ptr::null_mut(),
            context: Context::zeroed(),
            name: [0; MAX_PROC_NAME],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_process_has_null_pointers_and_unused_state() {
        let p = Process::unused();
        assert_eq!(p.state, ProcState::Unused);
        assert!(p.pagetable.is_null());
        assert!(p.trapframe.is_null());
    }
}

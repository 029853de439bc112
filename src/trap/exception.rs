//! Exception classification and handling (component F).
//!
//! This kernel implements no syscalls and runs no user mode, so the only exception it is
//! expected to recover from is a page fault against the lazily-backed kernel heap region;
//! everything else is a programming error and panics with the triple that caused it.

use crate::constant::{pgrounddown, KERNBASE, PGSIZE};
use crate::mm;
use crate::vm::{self, EntryBits};

/// `scause` exception codes this kernel recognizes (bit 63 clear).
const CAUSE_INSTRUCTION_PAGE_FAULT: usize = 12;
const CAUSE_LOAD_PAGE_FAULT: usize = 13;
const CAUSE_STORE_PAGE_FAULT: usize = 15;
const CAUSE_ILLEGAL_INSTRUCTION: usize = 2;
const CAUSE_BREAKPOINT: usize = 3;
const CAUSE_ECALL_FROM_S: usize = 9;

#[derive(Debug, PartialEq, Eq)]
pub enum Exception {
    PageFault,
    IllegalInstruction,
    Breakpoint,
    Ecall,
    Other(usize),
}

/// Classify an exception `scause` (bit 63 already known clear by the caller).
pub fn classify(cause: usize) -> Exception {
    match cause {
        CAUSE_INSTRUCTION_PAGE_FAULT | CAUSE_LOAD_PAGE_FAULT | CAUSE_STORE_PAGE_FAULT => Exception::PageFault,
        CAUSE_ILLEGAL_INSTRUCTION => Exception::IllegalInstruction,
        CAUSE_BREAKPOINT => Exception::Breakpoint,
        CAUSE_ECALL_FROM_S => Exception::Ecall,
        other => Exception::Other(other),
    }
}

/// Kernel-heap region this kernel is willing to lazily back on a page fault: the 128 MiB
/// following `KERNBASE`. Anything else is a genuine fault and panics.
const LAZY_HEAP_SIZE: usize = 128 * 1024 * 1024;

fn in_lazy_heap(addr: usize) -> bool {
    addr >= KERNBASE && addr < KERNBASE + LAZY_HEAP_SIZE
}

pub fn handle_exception(cause: usize, epc: usize, tval: usize) {
    match classify(cause) {
        Exception::PageFault => handle_page_fault(cause, epc, tval),
        Exception::IllegalInstruction => {
            panic!("illegal instruction at epc={:#x} (insn bits in tval={:#x})", epc, tval);
        }
        Exception::Breakpoint => {
            log::debug!("breakpoint at epc={:#x}", epc);
            panic!("breakpoint at epc={:#x}: this kernel implements no debugger", epc);
        }
        Exception::Ecall => {
            panic!("ecall at epc={:#x}: this kernel implements no syscalls", epc);
        }
        Exception::Other(code) => {
            panic!("unhandled exception cause={} epc={:#x} tval={:#x}", code, epc, tval);
        }
    }
}

/// Handle a page fault against `tval`. If the faulting address falls in the lazily-backed
/// kernel heap region, allocate and zero a frame and map it in; otherwise panic.
pub fn handle_page_fault(cause: usize, epc: usize, tval: usize) {
    if !in_lazy_heap(tval) {
        panic!(
            "page fault outside lazy heap: cause={} epc={:#x} tval={:#x}",
            cause, epc, tval
        );
    }

    let page = mm::alloc_page();
    if page.is_null() {
        panic!("page fault at {:#x}: out of physical memory", tval);
    }
    unsafe { core::ptr::write_bytes(page, 0, PGSIZE); }

    let fault_page = pgrounddown(tval);
    let pt = vm::kernel_pagetable();
    if let Err(e) = vm::mappages(pt, fault_page, PGSIZE, page as usize, EntryBits::ReadWrite.val()) {
        mm::free_page(page);
        panic!("page fault at {:#x}: failed to map new frame: {:?}", tval, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_page_fault_causes() {
        assert_eq!(classify(CAUSE_INSTRUCTION_PAGE_FAULT), Exception::PageFault);
        assert_eq!(classify(CAUSE_LOAD_PAGE_FAULT), Exception::PageFault);
        assert_eq!(classify(CAUSE_STORE_PAGE_FAULT), Exception::PageFault);
    }

    #[test]
    fn classifies_illegal_instruction_and_breakpoint_and_ecall() {
        assert_eq!(classify(CAUSE_ILLEGAL_INSTRUCTION), Exception::IllegalInstruction);
        assert_eq!(classify(CAUSE_BREAKPOINT), Exception::Breakpoint);
        assert_eq!(classify(CAUSE_ECALL_FROM_S), Exception::Ecall);
    }

    #[test]
    fn classifies_unknown_cause_as_other() {
        assert_eq!(classify(99), Exception::Other(99));
    }

    #[test]
    fn lazy_heap_bounds() {
        assert!(!in_lazy_heap(KERNBASE - 1));
        assert!(in_lazy_heap(KERNBASE));
        assert!(in_lazy_heap(KERNBASE + LAZY_HEAP_SIZE - 1));
        assert!(!in_lazy_heap(KERNBASE + LAZY_HEAP_SIZE));
    }

    #[test]
    fn p8_page_fault_in_lazy_heap_maps_a_frame() {
        mm::buddy::test_support::ensure_pmm();
        let pt_raw = mm::alloc_page();
        assert!(!pt_raw.is_null());
        unsafe { core::ptr::write_bytes(pt_raw, 0, PGSIZE); }
        let pt = pt_raw as *mut vm::PageTable;

        // handle_page_fault maps into the *global* kernel page table, so exercise the
        // mapping logic directly against a private table instead of depending on
        // kvm_init having already run in this test process.
        let tval = KERNBASE + 0x3000;
        let page = mm::alloc_page();
        assert!(!page.is_null());
        unsafe { core::ptr::write_bytes(page, 0, PGSIZE); }
        vm::mappages(pt, pgrounddown(tval), PGSIZE, page as usize, EntryBits::ReadWrite.val()).unwrap();

        let slot = vm::walk(pt, pgrounddown(tval), false).unwrap();
        assert!(!slot.is_null());
    }
}

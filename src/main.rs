#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

extern crate static_assertions as sa;

mod asm;
#[macro_use]
mod macros;

mod arch;
mod base;
mod constant;
mod util;

mod driver;
mod logk;

mod mm;
mod vm;
mod trap;
mod timer;
mod proc;

#[cfg(not(test))]
use core::arch::asm;

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    println_k!("{}", info);
    abort();
}

#[cfg(not(test))]
#[no_mangle]
extern "C" fn abort() -> ! {
    loop {
        unsafe { asm!("wfi"); }
    }
}

/// Boot control flow: dispatcher init, buddy init over `[kernel_end, PHYSTOP)`, page
/// table build, paging on, timer armed, then an idle loop. Called from `boot.S` on hart
/// 0 only.
#[cfg(not(test))]
#[no_mangle]
extern "C" fn kinit() -> ! {
    let uart = driver::uart::Uart::default();
    uart.init_default();

    logk::init();
    println_k!("kernel: boot");

    trap::trap_init();

    let kernel_end = asm::linker::kernel_end();
    let heap_base = constant::pgroundup(kernel_end);
    mm::pmm_init(heap_base, constant::PHYSTOP);
    log::info!("pmm: managing [{:#x}, {:#x})", heap_base, constant::PHYSTOP);

    vm::kvm_init(asm::linker::text_end()).expect("kvm_init: failed to build kernel page table");
    vm::kvm_init_hart();
    log::info!("vm: paging enabled");

    trap::trap_init_hart();
    timer::timer_init();
    log::info!("timer: armed");

    idle()
}

/// Nothing left to schedule (no scheduler, single hart): park with interrupts enabled so
/// the timer and any future device interrupts still fire.
#[cfg(not(test))]
fn idle() -> ! {
    base::irq::local_irq_enable();
    loop {
        unsafe { asm!("wfi"); }
    }
}

//! Assembly glue (component D): the hart boot stub and the kernel trap vector.
//!
//! Grounded in sgmarz-osblog's `global_asm!(include_str!(...))` pattern for pulling in
//! hand-written `.S` files rather than inline `asm!` blocks — boot and trap entry are
//! most naturally expressed as free-standing assembly, not Rust functions.
//!
//! Like `arch::cpu`, the real `.S` files and linker-provided symbols only exist for the
//! `riscv64` target; a `not(target_arch = "riscv64")` fallback keeps the crate linkable
//! (and its `#[cfg(test)]` suite runnable) on the host, where neither `linker.ld` nor the
//! assembly stubs are part of the build.

#[cfg(target_arch = "riscv64")]
mod real {
    use core::arch::global_asm;

    global_asm!(include_str!("boot.S"));
    global_asm!(include_str!("trap.S"));

    pub mod linker {
        extern "C" {
            static _text_end: u8;
            static _kernel_end: u8;
        }

        pub fn text_end() -> usize {
            unsafe { &_text_end as *const u8 as usize }
        }

        pub fn kernel_end() -> usize {
            unsafe { &_kernel_end as *const u8 as usize }
        }
    }

    pub mod trap {
        extern "C" {
            pub fn kernelvec();
        }
    }
}

#[cfg(not(target_arch = "riscv64"))]
mod sim {
    /// Host stand-in: `kinit`/`trap_init_hart` are never exercised under `cargo test`
    /// (no test calls them), but the symbols they reference still need to resolve.
    pub mod linker {
        pub fn text_end() -> usize {
            0
        }

        pub fn kernel_end() -> usize {
            0
        }
    }

    pub mod trap {
        pub extern "C" fn kernelvec() {}
    }
}

#[cfg(target_arch = "riscv64")]
pub use real::*;
#[cfg(not(target_arch = "riscv64"))]
pub use sim::*;

//! Fixed memory layout of the QEMU `virt` machine this kernel targets, and the other
//! numeric constants the rest of the kernel treats as the external contract. Unlike a
//! device-tree-probed board, every one of these is a compile-time constant, matching the
//! teacher's `mm::virt_qemu` table but trimmed to the entries this kernel actually uses.

/// Base of the supervisor-mode kernel image and of physical RAM on `virt`.
pub const KERNBASE: usize = 0x8000_0000;

/// Physical memory managed by the kernel: `[KERNBASE, PHYSTOP)`, 128 MiB.
pub const PHYS_MEM_SIZE: usize = 128 * 1024 * 1024;
pub const PHYSTOP: usize = KERNBASE + PHYS_MEM_SIZE;

/// NS16550A UART MMIO base (identity-mapped R|W).
pub const UART0: usize = 0x1000_0000;

/// Hardware page size used by the Sv39 MMU.
pub const PGSIZE: usize = 4096;
pub const PGSHIFT: usize = 12;

/// Minimum allocation unit of the buddy allocator (the "page-aware" leaf block size).
pub const LEAF: usize = 128;

/// Supervisor timer tick period, in CPU cycles (~100 Hz on QEMU's default clock).
pub const TIMER_INTERVAL: u64 = 100_000;

#[inline(always)]
pub const fn pgroundup(a: usize) -> usize {
    (a + PGSIZE - 1) & !(PGSIZE - 1)
}

#[inline(always)]
pub const fn pgrounddown(a: usize) -> usize {
    a & !(PGSIZE - 1)
}

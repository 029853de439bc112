//! Physical memory management: the buddy allocator (component B) and its public surface.
//!
//! The managed range is `[PGROUNDUP(kernel_end), PHYSTOP)`, a single contiguous region
//! handed to [`buddy::pmm_init`] once from `main::kinit`.

pub mod buddy;

pub use buddy::{alloc_page, alloc_pages, bd_print, free_page, free_pages, kfree, kmalloc, pmm_init};

//! Binary buddy allocator over a contiguous physical range.
//!
//! One [`BuddyAllocator`] owns `[base, limit)` (the `base`/`limit` the caller passes to
//! [`pmm_init`], aligned internally). Free blocks are threaded through
//! [`crate::util::list`] nodes written directly into the blocks themselves; per-order
//! bookkeeping (the free-list head, the XOR-compressed pair-allocation bitmap, and for
//! orders above 0 a split bitmap) lives in a reserved prefix of the managed range itself,
//! so the allocator needs no heap of its own. `freelist_bitmap` caches which orders have
//! a nonempty free list so `allocate` can find the smallest serviceable order in O(1).
//!
//! Orders run `0..=maxsize`; `BLK_SIZE(k) = LEAF << k`, `NBLK(k) = 1 << (maxsize - k)`.

use core::mem::size_of;

use crate::base::sync::IrqSpinLock;
use crate::constant::LEAF;
use crate::util::align::{align_up, get_order};
use crate::util::bit::{bytes_for_bits, change_bit_array, clear_bit_array, set_bit_array, test_bit_array};
use crate::util::list::{self, List};

const LEAF_ORDER: usize = {
    // `get_order` is not `const` over a non-const input in the general case, but LEAF is
    // a compile-time constant and is required to be a power of two.
    let mut n = LEAF;
    let mut order = 0usize;
    while n > 1 {
        n >>= 1;
        order += 1;
    }
    order
};

/// Maximum number of buddy orders a single allocator instance can track. Sized generously
/// above what the kernel's 128 MiB managed range needs (`log2(128MiB/128B) = 20`); the
/// actual count in use is `self.maxsize + 1`, stored in `self.maxsize`.
const MAX_ORDERS: usize = 48;

struct ClassRecord {
    free_head: List,
    /// XOR-compressed pair-allocation bits: one bit per buddy pair `(2i, 2i+1)`.
    alloc_bitmap: *mut u8,
    /// One bit per block at this order, 1 iff it has been split into two order-1 children.
    /// Unused (null) at order 0.
    split_bitmap: *mut u8,
}

impl ClassRecord {
    const fn empty() -> Self {
        Self { free_head: List::new(), alloc_bitmap: core::ptr::null_mut(), split_bitmap: core::ptr::null_mut() }
    }
}

pub struct BuddyAllocator {
    /// Start of the full `2^maxsize * LEAF` managed block (LEAF-aligned).
    region_base: usize,
    /// End of the caller-usable range, as originally requested (`<= region_base +
    /// BLK_SIZE(maxsize)`). Bytes in `[limit, region_base + BLK_SIZE(maxsize))` are the
    /// unavailable tail.
    limit: usize,
    maxsize: usize,
    classes: [ClassRecord; MAX_ORDERS],
    freelist_bitmap: u64,
    /// Bytes handed out by `initfree` that are not metadata or unavailable tail; used to
    /// cross-check the init arithmetic and as a running total for tests.
    free_bytes: usize,
}

// Single-hart kernel: the raw pointers in `classes` only ever point into the memory
// region this allocator itself owns, and all access is serialized by the `IrqSpinLock`
// wrapping the global `BUDDY` instance.
unsafe impl Send for BuddyAllocator {}

#[derive(Debug, PartialEq, Eq)]
pub enum AllocError {
    OutOfMemory,
}

impl BuddyAllocator {
    #[inline(always)]
    const fn blk_size(&self, k: usize) -> usize {
        LEAF << k
    }

    #[inline(always)]
    fn blk_idx(&self, k: usize, addr: usize) -> usize {
        (addr - self.region_base) >> (LEAF_ORDER + k)
    }

    #[inline(always)]
    fn addr_of(&self, k: usize, idx: usize) -> usize {
        self.region_base + (idx << (LEAF_ORDER + k))
    }

    #[inline(always)]
    fn class_head(&mut self, k: usize) -> *mut List {
        &mut self.classes[k].free_head as *mut List
    }

    /// Build a new allocator over `[base, limit)`. `base` need not be LEAF-aligned; it is
    /// rounded up. Panics (`InitIntegrity`) if the init accounting does not check
    /// out, or if the range is too small to hold even its own metadata.
    pub fn new(base: usize, limit: usize) -> Self {
        let region_base = align_up(base, LEAF_ORDER);
        assert!(limit > region_base, "buddy range too small");
        let usable = limit - region_base;

        let mut maxsize = 0usize;
        while self_blk_size(maxsize) < usable {
            maxsize += 1;
        }
        assert!(maxsize < MAX_ORDERS, "buddy range too large for MAX_ORDERS");

        let mut this = BuddyAllocator {
            region_base,
            limit,
            maxsize,
            classes: core::array::from_fn(|_| ClassRecord::empty()),
            freelist_bitmap: 0,
            free_bytes: 0,
        };

        for k in 0..=maxsize {
            unsafe { list::init(this.class_head(k)); }
        }

        // Lay out per-class bitmaps as a bump allocation starting at region_base.
        let mut p = region_base;
        for k in 0..=maxsize {
            let nblk = 1usize << (maxsize - k);
            let pair_bits = core::cmp::max(1, nblk / 2);
            let alloc_bytes = bytes_for_bits(pair_bits);
            this.classes[k].alloc_bitmap = p as *mut u8;
            p += alloc_bytes;
            if k >= 1 {
                let split_bytes = bytes_for_bits(nblk);
                this.classes[k].split_bitmap = p as *mut u8;
                p += split_bytes;
            }
        }
        let meta_lo = region_base;
        let meta_hi = align_up(p, LEAF_ORDER);

        unsafe {
            core::ptr::write_bytes(meta_lo as *mut u8, 0, meta_hi - meta_lo);
        }

        let tail_lo = align_up(limit, LEAF_ORDER);
        let tail_hi = region_base + this.blk_size(maxsize);

        this.carve(maxsize, region_base, meta_lo, meta_hi, tail_lo, tail_hi);

        let metadata_size = meta_hi - meta_lo;
        let unavailable_size = tail_hi - tail_lo;
        let expected_free = this.blk_size(maxsize) - metadata_size - unavailable_size;
        assert_eq!(this.free_bytes, expected_free, "buddy init accounting mismatch (InitIntegrity)");

        this
    }

    /// Recursively partition the block `(order, blk_lo)` against the two permanently
    /// reserved ranges (metadata prefix, unavailable tail), marking whole reserved blocks
    /// allocated, splitting partially-overlapping blocks, and pushing genuinely free
    /// blocks onto their order's free list. See module docs for why a single top-down
    /// pass over both reserved ranges at once is required (two independent passes would
    /// double-count the free blocks they produce at their shared boundary).
    fn carve(&mut self, order: usize, blk_lo: usize, meta_lo: usize, meta_hi: usize, tail_lo: usize, tail_hi: usize) {
        let blk_hi = blk_lo + self.blk_size(order);
        let in_meta = blk_lo >= meta_lo && blk_hi <= meta_hi;
        let in_tail = blk_lo >= tail_lo && blk_hi <= tail_hi;
        if in_meta || in_tail {
            self.mark_allocated_whole(order, blk_lo);
            return;
        }
        let touches_meta = blk_lo < meta_hi && meta_lo < blk_hi;
        let touches_tail = blk_lo < tail_hi && tail_lo < blk_hi;
        if !touches_meta && !touches_tail {
            self.push_free(order, blk_lo);
            return;
        }
        assert!(order > 0, "reserved range is not LEAF-aligned");
        self.set_split(order, blk_lo);
        let half = self.blk_size(order - 1);
        self.carve(order - 1, blk_lo, meta_lo, meta_hi, tail_lo, tail_hi);
        self.carve(order - 1, blk_lo + half, meta_lo, meta_hi, tail_lo, tail_hi);
    }

    fn mark_allocated_whole(&mut self, order: usize, addr: usize) {
        let idx = self.blk_idx(order, addr);
        unsafe { change_bit_array(self.classes[order].alloc_bitmap, idx / 2); }
    }

    fn set_split(&mut self, order: usize, addr: usize) {
        let idx = self.blk_idx(order, addr);
        unsafe { set_bit_array(self.classes[order].split_bitmap, idx); }
    }

    fn clear_split(&mut self, order: usize, addr: usize) {
        let idx = self.blk_idx(order, addr);
        unsafe { clear_bit_array(self.classes[order].split_bitmap, idx); }
    }

    fn push_free(&mut self, order: usize, addr: usize) {
        let head = self.class_head(order);
        unsafe { list::push_back(head, addr as *mut List); }
        self.freelist_bitmap |= 1 << order;
        self.free_bytes += self.blk_size(order);
    }

    fn pop_free(&mut self, order: usize) -> Option<usize> {
        let head = self.class_head(order);
        let node = unsafe { list::pop_front(head) };
        if node.is_null() {
            return None;
        }
        if unsafe { list::is_empty(head) } {
            self.freelist_bitmap &= !(1 << order);
        }
        self.free_bytes -= self.blk_size(order);
        Some(node as usize)
    }

    /// Determine the order a block containing `p` is currently allocated at: the smallest
    /// `m >= 1` whose order-`m` ancestor has its split
    /// bit set tells us `p`'s own order is `m - 1`; if no ancestor is split, `p` is the
    /// single order-`maxsize` block.
    fn size_of_block(&self, p: usize) -> usize {
        for m in 1..=self.maxsize {
            let idx = self.blk_idx(m, p);
            if unsafe { test_bit_array(self.classes[m].split_bitmap, idx) } {
                return m - 1;
            }
        }
        self.maxsize
    }

    /// Allocate a block of at least `n` bytes (saturated up to `LEAF`). Returns the
    /// address of the allocated block's lowest byte.
    pub fn allocate(&mut self, n: usize) -> Result<usize, AllocError> {
        let n = core::cmp::max(n, LEAF);
        let fk = get_order(n.next_power_of_two().max(LEAF)).saturating_sub(LEAF_ORDER);
        let fk = core::cmp::min(fk, self.maxsize);

        let mut k = fk;
        loop {
            if k > self.maxsize {
                return Err(AllocError::OutOfMemory);
            }
            if self.freelist_bitmap & (1 << k) != 0 {
                break;
            }
            k += 1;
        }

        let p = self.pop_free(k).expect("freelist_bitmap said order k was nonempty");
        self.mark_allocated_whole(k, p);

        let mut order = k;
        while order > fk {
            let q = p + self.blk_size(order - 1);
            self.set_split(order, p);
            self.mark_allocated_whole(order - 1, p);
            self.push_free(order - 1, q);
            order -= 1;
        }

        Ok(p)
    }

    /// Return a previously allocated block to the allocator, merging with its buddy
    /// repeatedly while the buddy is also free.
    pub fn free(&mut self, p: usize) {
        let mut k = self.size_of_block(p);
        let mut addr = p;
        while k < self.maxsize {
            let idx = self.blk_idx(k, addr);
            let pair_idx = idx / 2;
            let buddy_still_allocated = unsafe { change_bit_array(self.classes[k].alloc_bitmap, pair_idx) };
            if buddy_still_allocated {
                break;
            }
            let buddy_idx = idx ^ 1;
            let buddy_addr = self.addr_of(k, buddy_idx);
            let head = self.class_head(k);
            unsafe {
                list::remove(buddy_addr as *mut List);
                if list::is_empty(head) {
                    self.freelist_bitmap &= !(1 << k);
                }
            }
            self.free_bytes -= self.blk_size(k);
            self.clear_split(k + 1, core::cmp::min(addr, buddy_addr));
            addr = core::cmp::min(addr, buddy_addr);
            k += 1;
        }
        self.push_free(k, addr);
    }

    pub fn alloc_page(&mut self) -> Result<usize, AllocError> {
        self.allocate(crate::constant::PGSIZE)
    }

    pub fn free_page(&mut self, p: usize) {
        self.free(p);
    }

    /// Allocate `count` contiguous pages, rounded up to the next power-of-two block.
    pub fn alloc_pages(&mut self, count: usize) -> Result<usize, AllocError> {
        let count = core::cmp::max(count, 1).next_power_of_two();
        self.allocate(count * crate::constant::PGSIZE)
    }

    /// `order` is the caller's page-count order (0 = one page, 1 = two pages, ...), as
    /// returned implicitly by [`Self::alloc_pages`]. The buddy bitmaps already record a
    /// block's true order via the split bitmaps, so `free` does not actually need it;
    /// kept as a parameter only to match the allocator's external symmetry: callers always pair an order with a free.
    pub fn free_pages(&mut self, p: usize, _order: usize) {
        self.free(p);
    }

    pub fn kmalloc(&mut self, n: usize) -> Result<usize, AllocError> {
        self.allocate(n)
    }

    pub fn kfree(&mut self, p: usize) {
        self.free(p);
    }

    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    pub fn managed_base(&self) -> usize {
        self.region_base
    }

    pub fn managed_limit(&self) -> usize {
        self.limit
    }

    /// Debug dump of each order's free-list length and total free bytes.
    pub fn bd_print(&self) {
        for k in 0..=self.maxsize {
            let count = unsafe { list::count(self.class_head_const(k)) };
            log::debug!("order {:>2}: blk_size={:>10} free_blocks={}", k, self.blk_size(k), count);
        }
        log::debug!("total free bytes: {}", self.free_bytes);
    }

    fn class_head_const(&self, k: usize) -> *const List {
        &self.classes[k].free_head as *const List
    }
}

// Work around `self.blk_size` not being reachable before `self` exists during `new`.
const fn self_blk_size(k: usize) -> usize {
    LEAF << k
}

sa::const_assert_eq!(size_of::<List>() % (size_of::<usize>() * 2), 0);
sa::const_assert!(LEAF >= size_of::<List>());

/// Global physical memory allocator instance, guarded by a real IRQ-disabling lock (the
/// stub `SpinLockPure` alone is not enough once the page-fault path can allocate
/// from inside a trap handler).
static BUDDY: IrqSpinLock<Option<BuddyAllocator>> = IrqSpinLock::new(None);

/// Initialize the physical memory allocator over `[base, limit)`. Safe to call more than
/// once; subsequent calls are no-ops so a redundant boot-path call never reinitializes a live allocator.
pub fn pmm_init(base: usize, limit: usize) {
    let mut guard = BUDDY.lock();
    if guard.is_none() {
        *guard = Some(BuddyAllocator::new(base, limit));
    }
}

fn with_buddy<R>(f: impl FnOnce(&mut BuddyAllocator) -> R) -> R {
    let mut guard = BUDDY.lock();
    let buddy = guard.as_mut().expect("pmm_init must run before any allocation");
    f(buddy)
}

pub fn alloc_page() -> *mut u8 {
    with_buddy(|b| b.alloc_page()).map(|a| a as *mut u8).unwrap_or(core::ptr::null_mut())
}

pub fn free_page(p: *mut u8) {
    with_buddy(|b| b.free_page(p as usize));
}

pub fn alloc_pages(count: usize) -> *mut u8 {
    with_buddy(|b| b.alloc_pages(count)).map(|a| a as *mut u8).unwrap_or(core::ptr::null_mut())
}

pub fn free_pages(p: *mut u8, order: usize) {
    with_buddy(|b| b.free_pages(p as usize, order));
}

pub fn kmalloc(n: usize) -> *mut u8 {
    with_buddy(|b| b.kmalloc(n)).map(|a| a as *mut u8).unwrap_or(core::ptr::null_mut())
}

pub fn kfree(p: *mut u8) {
    with_buddy(|b| b.kfree(p as usize));
}

pub fn bd_print() {
    with_buddy(|b| b.bd_print());
}

/// Lets other modules' `#[cfg(test)]` suites (the `vm` walker, in particular) get a
/// working global allocator without racing each other over the global `BUDDY` lock's
/// one-shot initialization. The backing buffer is leaked so it outlives every test.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn ensure_pmm() {
        INIT.call_once(|| {
            let buf: &'static mut [u8] = std::boxed::Box::leak(std::vec![0u8; 64 * 1024 * 1024].into_boxed_slice());
            let base = buf.as_mut_ptr() as usize;
            let limit = base + buf.len();
            super::pmm_init(base, limit);
        });
    }

    pub fn free_bytes() -> usize {
        super::with_buddy(|b| b.free_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    struct Arena {
        buf: Vec<u8>,
        buddy: BuddyAllocator,
    }

    impl Arena {
        fn new(size: usize) -> Self {
            let mut buf = std::vec![0u8; size + crate::constant::PGSIZE * 2];
            let base = buf.as_mut_ptr() as usize;
            let base = align_up(base, get_order(crate::constant::PGSIZE));
            let limit = base + size;
            // Keep `buf` alive for as long as `buddy`; `base`/`limit` point inside it.
            let buddy = BuddyAllocator::new(base, limit);
            Self { buf, buddy }
        }
    }

    #[test]
    fn p1_allocations_are_page_aligned_and_nonoverlapping() {
        let mut arena = Arena::new(1024 * 1024);
        let pgsize = crate::constant::PGSIZE;
        let mut seen = std::vec::Vec::new();
        for _ in 0..8 {
            let p = arena.buddy.alloc_page().expect("alloc_page");
            assert_eq!(p % pgsize, 0);
            for &(lo, hi) in seen.iter() {
                assert!(p >= hi || p + pgsize <= lo, "overlap");
            }
            seen.push((p, p + pgsize));
        }
        let _ = arena.buf.len();
    }

    #[test]
    fn p2_merge_correctness() {
        let mut arena = Arena::new(1024 * 1024);
        let pgsize = crate::constant::PGSIZE;
        let a = arena.buddy.alloc_page().unwrap();
        let b = arena.buddy.alloc_page().unwrap();
        arena.buddy.free_page(a);
        arena.buddy.free_page(b);
        let merged = arena.buddy.allocate(2 * pgsize).unwrap();
        assert_eq!(merged, core::cmp::min(a, b));
    }

    #[test]
    fn p3_lifo_at_equal_sizes() {
        let mut arena = Arena::new(1024 * 1024);
        let p = arena.buddy.alloc_page().unwrap();
        let q = arena.buddy.alloc_page().unwrap();
        arena.buddy.free_page(p);
        arena.buddy.free_page(q);
        let r = arena.buddy.alloc_page().unwrap();
        let s = arena.buddy.alloc_page().unwrap();
        assert_eq!(r, q);
        assert_eq!(s, p);
    }

    #[test]
    fn scenario_1_alloc_free_alloc_reverses() {
        let mut arena = Arena::new(1024 * 1024);
        let p = arena.buddy.alloc_page().unwrap();
        let q = arena.buddy.alloc_page().unwrap();
        assert_ne!(p, q);
        assert_eq!(p % crate::constant::PGSIZE, 0);
        arena.buddy.free_page(p);
        arena.buddy.free_page(q);
        let r = arena.buddy.alloc_page().unwrap();
        let s = arena.buddy.alloc_page().unwrap();
        assert_eq!(r, q);
        assert_eq!(s, p);
    }

    #[test]
    fn scenario_2_free_bytes_restored_after_bulk_alloc_free() {
        let mut arena = Arena::new(8 * 1024 * 1024);
        let before = arena.buddy.free_bytes();
        let mut blocks = std::vec::Vec::new();
        for _ in 0..50 {
            blocks.push(arena.buddy.alloc_pages(10).unwrap());
        }
        for b in blocks {
            arena.buddy.free_pages(b, 0);
        }
        assert_eq!(arena.buddy.free_bytes(), before);
    }

    #[test]
    fn pmm_init_is_idempotent() {
        let mut buf = std::vec![0u8; 1024 * 1024];
        let base = buf.as_mut_ptr() as usize;
        pmm_init(base, base + buf.len());
        let first = alloc_page();
        pmm_init(base, base + buf.len());
        let second = alloc_page();
        assert_ne!(first, second);
        free_page(first);
        free_page(second);
    }
}

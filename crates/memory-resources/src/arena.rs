// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The arena resource: a free-list allocator over a chain of
//! OS-acquired virtual-memory regions.
//!
//! # Memory Layout
//!
//! ```text
//!   first region                              later regions
//!   ┌────────┬─────────────┬───────────────┐  ┌────────┬──────────────┐
//!   │ header │  free-list  │    payload    │  │ header │   payload    │
//!   │ {next──┼─reservation─┼───────────────┼──┼─►{next}│              │
//!   └────────┴─────────────┴───────────────┘  └────────┴──────────────┘
//!              ▲
//!              └── descriptor slots, backed by an embedded LinearBuffer
//! ```
//!
//! The arena eagerly maps enough regions to cover its configured
//! capacity, seeds one free-block descriptor per region, and then serves
//! arbitrary-size, arbitrary-alignment requests by best fit: the
//! smallest free block that fits (ties broken by first encountered) is
//! shrunk in place, or erased on an exact fit. Deallocation zero-fills
//! the freed interval and coalesces it with address-adjacent neighbours,
//! so fragmentation stays bounded under burst-allocate/coarse-release
//! workloads. When every free block is too small, the arena grows by
//! exactly one region and retries.
//!
//! The descriptor array itself lives inside the first region, carved out
//! by an embedded [`LinearBuffer`] — the arena allocates its own
//! bookkeeping before it allocates anything for clients, which is why a
//! fresh arena reports one live allocation.

use crate::align::forward_adjust;
use crate::config::ARENA_FREE_LIST_SIZE;
use crate::free_list::{FreeBlock, FreeList};
use crate::{AllocError, ArenaStats, Capacity, LinearBuffer, MemoryResource};
use std::any::Any;
use std::mem;
use std::ptr::{self, NonNull};
use virtual_memory::{
    acquire_region, release_chain, RegionHeader, REGION_MAX_ALLOCATION, REGION_SIZE,
};

const HEADER_SIZE: usize = mem::size_of::<RegionHeader>();

/// Bytes reserved at the head of the first region for the free-list
/// descriptors.
const RESERVATION: usize = ARENA_FREE_LIST_SIZE * mem::size_of::<FreeBlock>();

/// A free-list allocator over OS-backed virtual-memory regions.
///
/// Single-threaded: an `Arena` is neither `Send` nor `Sync`, and all
/// operations take `&mut self`. Raw bytes only — the arena never runs
/// finalizers on what was allocated inside it, and teardown releases
/// every region regardless of outstanding allocations.
///
/// # Example
/// ```
/// use memory_resources::Arena;
///
/// let mut arena = Arena::new().unwrap();
/// let p = arena.allocate(64, 8).unwrap();
/// assert_eq!(p.as_ptr() as usize % 8, 0);
///
/// arena.deallocate(p, 64, 8);
/// assert_eq!(arena.allocations(), 1); // only the free-list reservation remains
/// ```
pub struct Arena {
    /// Head of the region chain.
    first: NonNull<RegionHeader>,
    /// Address-ordered index of unallocated intervals.
    free_list: FreeList,
    /// Bump buffer over the first region's head; stable storage for the
    /// free-list reservation.
    meta: LinearBuffer,
    /// Bytes currently considered allocated, bookkeeping included.
    total_used: usize,
    /// Sum of all region sizes.
    total_size: usize,
    /// Number of regions in the chain.
    total_regions: usize,
    /// Live allocations; the free-list reservation counts as the first.
    allocations: usize,
    /// Cumulative diagnostics.
    stats: ArenaStats,
}

impl Arena {
    /// Creates an arena with the default capacity.
    pub fn new() -> Result<Self, AllocError> {
        Self::with_capacity(Capacity::default())
    }

    /// Creates an arena that eagerly maps enough regions to cover
    /// `capacity`.
    ///
    /// Regions are mapped whole, so the effective capacity is `capacity`
    /// rounded up to a multiple of the region size. Fails with
    /// `OutOfMemory` when the OS refuses the mappings; nothing is leaked
    /// on a partial failure.
    pub fn with_capacity(capacity: Capacity) -> Result<Self, AllocError> {
        let blocks = capacity.as_bytes().div_ceil(REGION_SIZE).max(1);

        let first = acquire_region(REGION_SIZE)?;
        let mut tail = first;
        let mut regions = 1;
        while regions < blocks {
            match acquire_region(REGION_SIZE) {
                Ok(region) => {
                    // SAFETY: both pointers come from live acquisitions
                    // owned by this constructor.
                    unsafe { (*tail.as_ptr()).next = region.as_ptr() };
                    tail = region;
                    regions += 1;
                }
                Err(err) => {
                    // SAFETY: every region mapped so far is on the chain.
                    unsafe { release_chain(first) };
                    return Err(err.into());
                }
            }
        }

        // Carve the free-list reservation from the head of the first
        // region's payload.
        let payload = RegionHeader::payload_addr(first.as_ptr());
        // SAFETY: the first RESERVATION payload bytes belong to this
        // arena exclusively.
        let mut meta = unsafe { LinearBuffer::new(payload as *mut u8, RESERVATION) };
        let slots = meta
            .allocate(RESERVATION, mem::align_of::<FreeBlock>())
            .expect("free-list reservation fits its own buffer");

        // SAFETY: `slots` spans ARENA_FREE_LIST_SIZE descriptor slots.
        let mut free_list = unsafe { FreeList::new(slots.cast::<FreeBlock>(), ARENA_FREE_LIST_SIZE) };
        free_list.insert(FreeBlock {
            size: REGION_MAX_ALLOCATION - RESERVATION,
            addr: payload + RESERVATION,
        });
        let mut walk = unsafe { (*first.as_ptr()).next };
        while let Some(region) = NonNull::new(walk) {
            free_list.insert(FreeBlock {
                size: REGION_MAX_ALLOCATION,
                addr: RegionHeader::payload_addr(region.as_ptr()),
            });
            walk = unsafe { (*region.as_ptr()).next };
        }

        tracing::debug!(
            "arena created: {regions} regions, {} bytes, {RESERVATION}-byte free-list reservation",
            regions * REGION_SIZE,
        );

        Ok(Self {
            first,
            free_list,
            meta,
            total_used: regions * HEADER_SIZE + RESERVATION,
            total_size: regions * REGION_SIZE,
            total_regions: regions,
            allocations: 1,
            stats: ArenaStats::default(),
        })
    }

    /// Allocates `bytes` bytes aligned to `alignment` out of the free
    /// list, growing the region chain by one when nothing fits.
    pub fn allocate(&mut self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        if bytes == 0 || alignment == 0 {
            self.stats.record_oom();
            return Err(AllocError::OutOfMemory {
                requested: bytes,
                alignment,
            });
        }

        if let Some((index, need, adjust)) = self.find_best_fit(bytes, alignment) {
            return Ok(self.carve(index, need, adjust));
        }

        // A fresh region must cover the request plus worst-case
        // alignment slack at its payload start, or growth cannot help.
        let worst = bytes.checked_add(alignment - 1);
        if worst.map_or(true, |w| w > REGION_MAX_ALLOCATION) {
            self.stats.record_oom();
            return Err(AllocError::OutOfMemory {
                requested: bytes,
                alignment,
            });
        }

        if let Err(err) = self.grow() {
            self.stats.record_oom();
            return Err(err);
        }

        match self.find_best_fit(bytes, alignment) {
            Some((index, need, adjust)) => Ok(self.carve(index, need, adjust)),
            None => {
                self.stats.record_oom();
                Err(AllocError::OutOfMemory {
                    requested: bytes,
                    alignment,
                })
            }
        }
    }

    /// Returns an allocation to the free list, zero-filling it and
    /// merging with address-adjacent free blocks.
    ///
    /// `(bytes, alignment)` must match the allocation call. Never fails.
    pub fn deallocate(&mut self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        let pointer = ptr.as_ptr() as usize;
        let adjust = if alignment == 0 {
            0
        } else {
            forward_adjust(pointer, alignment)
        };
        let real_bytes = bytes + adjust;
        if real_bytes == 0 {
            return;
        }
        let start = pointer - adjust;
        let end = start + real_bytes;

        debug_assert!(self.allocations > 1, "deallocate without a live allocation");
        debug_assert!(self.total_used >= real_bytes);

        // Stale contents must not leak into whoever reuses the interval.
        // SAFETY: [start, end) is an interval this arena handed out.
        unsafe { ptr::write_bytes(start as *mut u8, 0, real_bytes) };

        let index = self.free_list.position_after(end);
        let merged_at = if index == 0 {
            self.free_list.insert_at(0, FreeBlock { size: real_bytes, addr: start });
            0
        } else {
            let prev = &mut self.free_list.blocks_mut()[index - 1];
            if prev.addr + prev.size == start {
                prev.size += real_bytes;
                index - 1
            } else {
                self.free_list.insert_at(index, FreeBlock { size: real_bytes, addr: start });
                index
            }
        };

        // Absorb the block that begins exactly where this one ends.
        if merged_at + 1 < self.free_list.len() {
            let blocks = self.free_list.blocks();
            let current = blocks[merged_at];
            let next = blocks[merged_at + 1];
            if current.addr + current.size == next.addr {
                self.free_list.blocks_mut()[merged_at].size += next.size;
                self.free_list.remove(merged_at + 1);
            }
        }

        self.allocations -= 1;
        self.total_used -= real_bytes;
        self.stats.record_deallocation();
    }

    /// Bytes currently considered allocated, including the free-list
    /// reservation and one header per region.
    pub fn total_used(&self) -> usize {
        self.total_used
    }

    /// Total bytes of virtual memory acquired from the OS.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Number of regions in the chain.
    pub fn total_regions(&self) -> usize {
        self.total_regions
    }

    /// Number of live allocations. A fresh arena reports 1: the
    /// free-list reservation counts.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Bytes reserved for free-list descriptors inside the first region.
    pub fn free_list_reservation(&self) -> usize {
        self.meta.length()
    }

    /// Cumulative usage statistics.
    pub fn stats(&self) -> &ArenaStats {
        &self.stats
    }

    /// Head of the region chain, for validation.
    pub fn first_region(&self) -> *const RegionHeader {
        self.first.as_ptr()
    }

    /// The current free blocks, in ascending address order, for
    /// validation.
    pub fn free_list(&self) -> &[FreeBlock] {
        self.free_list.blocks()
    }

    /// Finds the smallest free block that can hold `bytes` after its
    /// alignment adjustment; ties go to the first encountered.
    ///
    /// Returns `(index, need, adjust)` where `need` is the bytes the
    /// block will actually lose.
    fn find_best_fit(&self, bytes: usize, alignment: usize) -> Option<(usize, usize, usize)> {
        let mut best: Option<(usize, usize, usize)> = None;
        let mut best_size = usize::MAX;
        for (index, block) in self.free_list.blocks().iter().enumerate() {
            let adjust = forward_adjust(block.addr, alignment);
            let need = match bytes.checked_add(adjust) {
                Some(need) => need,
                None => continue,
            };
            if need <= block.size && block.size < best_size {
                best = Some((index, need, adjust));
                best_size = block.size;
            }
        }
        best
    }

    /// Takes `need` bytes off the front of the block at `index` and
    /// returns the adjusted pointer.
    fn carve(&mut self, index: usize, need: usize, adjust: usize) -> NonNull<u8> {
        let (addr, exact) = {
            let block = &mut self.free_list.blocks_mut()[index];
            let addr = block.addr;
            if block.size == need {
                (addr, true)
            } else {
                block.size -= need;
                block.addr += need;
                (addr, false)
            }
        };
        if exact {
            self.free_list.remove(index);
        }

        self.total_used += need;
        self.allocations += 1;
        self.stats.record_allocation(need, self.total_used);

        // SAFETY: [addr, addr + need) lies inside a mapped region
        // payload, and addr + adjust < addr + need.
        unsafe { NonNull::new_unchecked((addr + adjust) as *mut u8) }
    }

    /// Acquires one more region, links it onto the chain tail, and seeds
    /// a descriptor for its whole payload.
    fn grow(&mut self) -> Result<(), AllocError> {
        let region = acquire_region(REGION_SIZE)?;

        // SAFETY: the chain is owned by this arena; the new region comes
        // from a live acquisition.
        unsafe {
            let mut tail = self.first;
            while let Some(next) = NonNull::new((*tail.as_ptr()).next) {
                tail = next;
            }
            (*tail.as_ptr()).next = region.as_ptr();
        }

        self.total_size += REGION_SIZE;
        self.total_used += HEADER_SIZE;
        self.total_regions += 1;
        self.stats.record_growth();
        self.free_list.insert(FreeBlock {
            size: REGION_MAX_ALLOCATION,
            addr: RegionHeader::payload_addr(region.as_ptr()),
        });

        tracing::debug!(
            "arena grew to {} regions ({} bytes)",
            self.total_regions,
            self.total_size,
        );
        Ok(())
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        tracing::debug!("arena releasing {} regions", self.total_regions);
        // SAFETY: `first` heads the chain this arena acquired and still
        // owns; nothing dereferences into it after this point.
        unsafe { release_chain(self.first) };
        self.total_used = 0;
        self.total_size = 0;
    }
}

impl MemoryResource for Arena {
    fn allocate(&mut self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        Arena::allocate(self, bytes, alignment)
    }

    fn deallocate(&mut self, ptr: NonNull<u8>, bytes: usize, alignment: usize) {
        Arena::deallocate(self, ptr, bytes, alignment);
    }

    /// Two arenas are equal only when they share the same first region.
    /// Separate creations always yield distinct first regions, so only
    /// an arena and itself compare equal.
    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.first == other.first)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("total_used", &self.total_used)
            .field("total_size", &self.total_size)
            .field("total_regions", &self.total_regions)
            .field("allocations", &self.allocations)
            .field("free_blocks", &self.free_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_with_default_capacity() {
        let arena = Arena::new().unwrap();
        assert_eq!(arena.total_size(), 0x0040_0000);
        // One region header plus the 32-slot free-list reservation.
        assert_eq!(arena.total_used(), 520);
        assert_eq!(arena.total_regions(), 1);
        assert_eq!(arena.allocations(), 1);
        assert_eq!(arena.free_list_reservation(), 512);
        assert_eq!(arena.free_list().len(), 1);
    }

    #[test]
    fn test_initialize_with_eight_mib() {
        let arena = Arena::with_capacity(Capacity::from_mib(8)).unwrap();
        assert_eq!(arena.total_size(), 0x0080_0000);
        // Two region headers, one free-list reservation.
        assert_eq!(arena.total_used(), 528);
        assert_eq!(arena.total_regions(), 2);
        assert_eq!(arena.allocations(), 1);
        assert_eq!(arena.free_list().len(), 2);
    }

    #[test]
    fn test_allocate_single_int() {
        let mut arena = Arena::new().unwrap();
        let p = arena.allocate(4, 4).unwrap();
        let ptr = p.as_ptr() as usize;
        let base = arena.first_region() as usize;

        assert_eq!(ptr % 4, 0);
        assert_eq!(ptr - base, 520); // header + reservation
        assert_eq!(arena.allocations(), 2);
        assert_eq!(arena.total_used(), 524);

        let free = arena.free_list();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].size, 0x0040_0000 - 524);
        assert_eq!(free[0].addr, base + 524);
    }

    #[test]
    fn test_deallocate_single_int() {
        let mut arena = Arena::new().unwrap();
        let p = arena.allocate(4, 4).unwrap();
        arena.deallocate(p, 4, 4);

        let base = arena.first_region() as usize;
        assert_eq!(arena.allocations(), 1);
        assert_eq!(arena.total_used(), 520);

        let free = arena.free_list();
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].size, 0x0040_0000 - 520);
        assert_eq!(free[0].addr, base + 520);
    }

    #[test]
    fn test_zero_requests_fail() {
        let mut arena = Arena::new().unwrap();
        assert!(matches!(
            arena.allocate(0, 4),
            Err(AllocError::OutOfMemory { .. })
        ));
        assert!(matches!(
            arena.allocate(4, 0),
            Err(AllocError::OutOfMemory { .. })
        ));
        assert_eq!(arena.stats().oom_count, 2);
    }

    #[test]
    fn test_oversized_request_fails_without_growth() {
        let mut arena = Arena::new().unwrap();
        let result = arena.allocate(REGION_MAX_ALLOCATION + 1, 1);
        assert!(matches!(result, Err(AllocError::OutOfMemory { .. })));
        assert_eq!(arena.total_regions(), 1);
    }

    #[test]
    fn test_exhaustion_grows_by_one_region() {
        let mut arena = Arena::new().unwrap();
        // Exact fit: consume the entire seeded block.
        let whole = REGION_MAX_ALLOCATION - RESERVATION;
        let p = arena.allocate(whole, 1).unwrap();
        assert_eq!(arena.free_list().len(), 0);

        // Nothing left: the next request must grow the chain.
        let q = arena.allocate(64, 8).unwrap();
        assert_eq!(arena.total_regions(), 2);
        assert_eq!(arena.total_size(), 2 * REGION_SIZE);
        assert_eq!(arena.stats().regions_grown, 1);
        assert_eq!(q.as_ptr() as usize % 8, 0);

        arena.deallocate(p, whole, 1);
        arena.deallocate(q, 64, 8);
        assert_eq!(arena.allocations(), 1);
    }

    #[test]
    fn test_best_fit_prefers_smallest_hole() {
        let mut arena = Arena::new().unwrap();
        let a = arena.allocate(128, 1).unwrap();
        let b = arena.allocate(64, 1).unwrap();
        let c = arena.allocate(128, 1).unwrap();
        let d = arena.allocate(192, 1).unwrap();
        let _e = arena.allocate(128, 1).unwrap();

        // Two holes: 64 bytes at b, 192 bytes at d, plus the big tail.
        arena.deallocate(b, 64, 1);
        arena.deallocate(d, 192, 1);
        assert_eq!(arena.free_list().len(), 3);

        // 48 bytes fits all three; the 64-byte hole is the best fit.
        let p = arena.allocate(48, 1).unwrap();
        assert_eq!(p.as_ptr(), b.as_ptr());

        arena.deallocate(p, 48, 1);
        arena.deallocate(a, 128, 1);
        arena.deallocate(c, 128, 1);
    }

    #[test]
    fn test_coalescing_merges_both_neighbours() {
        let mut arena = Arena::new().unwrap();
        let x = arena.allocate(32, 1).unwrap();
        let y = arena.allocate(32, 1).unwrap();
        let z = arena.allocate(32, 1).unwrap();

        arena.deallocate(x, 32, 1);
        // z's interval touches the tail block, so freeing it merges right.
        arena.deallocate(z, 32, 1);
        assert_eq!(arena.free_list().len(), 2);

        // y bridges the gap: merges left into x's block and right into
        // the tail, collapsing the list to a single block.
        arena.deallocate(y, 32, 1);
        assert_eq!(arena.free_list().len(), 1);
        assert_eq!(arena.allocations(), 1);
        assert_eq!(arena.total_used(), 520);
    }

    #[test]
    fn test_deallocate_zero_fills_the_interval() {
        let mut arena = Arena::new().unwrap();
        let p = arena.allocate(16, 1).unwrap();
        unsafe { p.as_ptr().write_bytes(0xFF, 16) };
        arena.deallocate(p, 16, 1);

        // Best fit hands the same interval back.
        let q = arena.allocate(16, 1).unwrap();
        assert_eq!(q.as_ptr(), p.as_ptr());
        let contents = unsafe { std::slice::from_raw_parts(q.as_ptr(), 16) };
        assert!(contents.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_is_equal_only_for_same_first_region() {
        let arena = Arena::new().unwrap();
        let other = Arena::new().unwrap();
        assert!(arena.is_equal(&arena));
        assert!(!arena.is_equal(&other));
        assert!(!other.is_equal(&arena));
    }

    #[test]
    fn test_used_plus_free_covers_every_region() {
        let mut arena = Arena::with_capacity(Capacity::from_mib(8)).unwrap();
        let check = |arena: &Arena| {
            let free: usize = arena.free_list().iter().map(|b| b.size).sum();
            assert_eq!(arena.total_used() + free, arena.total_size());
        };

        check(&arena);
        let p = arena.allocate(1000, 8).unwrap();
        check(&arena);
        let q = arena.allocate(64, 8).unwrap();
        check(&arena);
        arena.deallocate(p, 1000, 8);
        check(&arena);
        arena.deallocate(q, 64, 8);
        check(&arena);
    }
}

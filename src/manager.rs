//! The block manager: first-fit search with splitting on allocation, and
//! three-way coalescing on release. This is the core of the allocator; the
//! arena itself (region acquisition, page rounding) is comparatively trivial
//! glue around it.

use std::ptr::NonNull;

use log::trace;

use crate::arena::Arena;
use crate::block::{BlockHeader, HEADER_SIZE, MIN_BLOCK_SIZE};
use crate::error::AllocError;

fn round_up_to_8(size: usize) -> usize {
    (size + 7) & !7
}

/// The result of a successful [`Arena::allocate`].
#[derive(Debug)]
pub struct Allocation {
    /// Pointer to the first byte of the payload.
    pub ptr: NonNull<u8>,
    /// Byte offset of the payload from the arena's base.
    pub payload_offset: usize,
    /// Number of free-list entries examined before the block that was
    /// chosen, starting at 0.
    pub hops: usize,
}

impl Arena {
    /// Allocates `requested_payload` bytes from this arena.
    ///
    /// `requested_payload` is signed to match the historical contract (see
    /// the crate's `ffi` module); a negative value fails with
    /// [`AllocError::BadArgument`] and performs no mutation.
    pub fn allocate(&mut self, requested_payload: isize) -> Result<Allocation, AllocError> {
        if requested_payload < 0 {
            return Err(AllocError::BadArgument);
        }

        let payload = round_up_to_8(requested_payload as usize);
        let needed = payload + HEADER_SIZE;

        let mut hops = 0usize;
        let mut cursor = self.free_head();
        let mut chosen = None;

        while let Some(block) = cursor {
            let free_size = block.size() as usize;
            if free_size >= needed {
                let leftover = free_size - needed;
                if leftover >= MIN_BLOCK_SIZE {
                    chosen = Some((block, leftover));
                    break;
                } else if leftover % 8 == 0 {
                    // Provably redundant once the arena's free blocks are all
                    // 8-byte sized (true after init and every subsequent
                    // operation here), but kept as the spec's defensive check.
                    debug_assert_eq!(leftover % 8, 0);
                    chosen = Some((block, leftover));
                    break;
                }
                // 0 <= leftover < 24 and leftover % 8 != 0: unusable
                // fragment, this block is rejected and the search continues.
            }
            cursor = block.next();
            hops += 1;
        }

        let Some((block, leftover)) = chosen else {
            trace!("allocate({requested_payload}): no fit after {hops} hops");
            return Err(AllocError::OutOfSpace);
        };

        let prev = block.prev();
        let next = block.next();

        if leftover >= MIN_BLOCK_SIZE {
            let split = unsafe { BlockHeader::at(block.addr() + needed) };
            split.set_size(leftover as u32);
            split.set_allocated(false);
            split.set_next(next);
            split.set_prev(prev);

            match prev {
                None => self.set_free_head(Some(split)),
                Some(p) => p.set_next(Some(split)),
            }
            if let Some(n) = next {
                n.set_prev(Some(split));
            }

            block.set_size((payload + HEADER_SIZE) as u32);
            trace!(
                "allocate({requested_payload}): split block at {:#x}, hops={hops}, leftover={leftover}",
                block.addr()
            );
        } else {
            match prev {
                None => self.set_free_head(next),
                Some(p) => p.set_next(next),
            }
            if let Some(n) = next {
                n.set_prev(prev);
            }

            block.set_size((payload + leftover + HEADER_SIZE) as u32);
            trace!(
                "allocate({requested_payload}): absorbed block at {:#x}, hops={hops}, leftover={leftover}",
                block.addr()
            );
        }

        block.set_allocated(true);

        let payload_addr = block.payload_addr();
        Ok(Allocation {
            ptr: unsafe { NonNull::new_unchecked(payload_addr as *mut u8) },
            payload_offset: payload_addr - self.base(),
            hops,
        })
    }

    /// Releases the block whose payload begins at `address`.
    ///
    /// A no-op for `address = None` or an address outside
    /// `[base, base + length]`. Addresses that are in-range but not the
    /// start of a currently-allocated payload are not defended against, per
    /// spec; behavior in that case is undefined.
    ///
    /// # Safety
    ///
    /// `address` must be either `None` or a payload pointer previously
    /// returned by [`Arena::allocate`] on this same arena and not already
    /// released. Any other in-bounds address (e.g. a mid-payload or
    /// mid-header pointer) makes this function read and write arbitrary
    /// bytes as if they were a block header -- the bounds check only guards
    /// against addresses outside the arena, not against addresses that
    /// don't point at a live block.
    pub unsafe fn release(&mut self, address: Option<NonNull<u8>>) {
        let Some(address) = address else { return };
        let address = address.as_ptr() as usize;
        if !self.in_bounds(address) {
            return;
        }

        let released = unsafe { BlockHeader::from_payload(address) };
        let size = released.size();

        // Insertion-point search: walk the free list until we find the
        // first free block strictly right of `released`, tracking the
        // immediate left neighbor as we go.
        let mut left: Option<BlockHeader> = None;
        let mut right: Option<BlockHeader> = self.free_head();
        while let Some(r) = right {
            if r.addr() > released.addr() {
                break;
            }
            left = Some(r);
            right = r.next();
        }

        let left_coalesce = left.is_some_and(|l| l.addr() + l.size() as usize == released.addr());
        let right_coalesce =
            right.is_some_and(|r| released.addr() + size as usize == r.addr());

        match (left_coalesce, right_coalesce) {
            (true, true) => {
                let l = left.unwrap();
                let r = right.unwrap();
                l.set_size(l.size() + size + r.size());
                l.set_next(r.next());
                if let Some(n) = r.next() {
                    n.set_prev(Some(l));
                }
                trace!("release({address:#x}): coalesced both neighbors");
            }
            (false, true) => {
                let r = right.unwrap();
                released.set_size(size + r.size());
                released.set_next(r.next());
                released.set_prev(left);
                released.set_allocated(false);
                if let Some(n) = r.next() {
                    n.set_prev(Some(released));
                }
                if let Some(l) = left {
                    l.set_next(Some(released));
                }
                trace!("release({address:#x}): coalesced right neighbor");
            }
            (true, false) => {
                let l = left.unwrap();
                l.set_size(l.size() + size);
                l.set_next(right);
                if let Some(r) = right {
                    r.set_prev(Some(l));
                }
                trace!("release({address:#x}): coalesced left neighbor");
            }
            (false, false) => {
                released.set_allocated(false);
                released.set_next(right);
                released.set_prev(left);
                if let Some(l) = left {
                    l.set_next(Some(released));
                }
                if let Some(r) = right {
                    r.set_prev(Some(released));
                }
                trace!("release({address:#x}): no coalesce");
            }
        }

        // left_coalesce implies left.is_some(), so whenever left is none the
        // surviving block at this address is always `released` itself.
        if left.is_none() {
            self.set_free_head(Some(released));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::PAGE_SIZE;
    use std::collections::HashSet;

    fn fresh(size: usize) -> Arena {
        Arena::init(size).unwrap()
    }

    /// Walks every block in the arena, from `base` to `base + length`, in
    /// address order. Used by [`assert_invariants`] to check properties
    /// that span the whole arena, not just the free list.
    fn walk_blocks(arena: &Arena) -> Vec<(usize, usize, bool)> {
        let mut blocks = Vec::new();
        let mut addr = arena.base();
        let end = arena.base() + arena.length();
        while addr < end {
            let header = unsafe { BlockHeader::at(addr) };
            let size = header.size() as usize;
            assert!(size > 0, "block at {addr:#x} has zero size, would loop forever");
            blocks.push((addr, size, header.is_allocated()));
            addr += size;
        }
        blocks
    }

    fn walk_free_list(arena: &Arena) -> Vec<(usize, usize)> {
        let mut entries = Vec::new();
        let mut cursor = arena.free_head();
        while let Some(block) = cursor {
            entries.push((block.addr(), block.size() as usize));
            cursor = block.next();
        }
        entries
    }

    /// Checks the quantified invariants I1-I5 (spec's Testable Properties)
    /// against the arena's current state.
    fn assert_invariants(arena: &Arena) {
        let blocks = walk_blocks(arena);
        let free_list = walk_free_list(arena);

        // I4: the blocks exactly cover the arena, no gaps or overlap.
        let total: usize = blocks.iter().map(|&(_, size, _)| size).sum();
        assert_eq!(total, arena.length(), "I4: block sizes must sum to arena length");

        // I1: every free block is >= 24 bytes and a multiple of 8.
        for &(addr, size) in &free_list {
            assert!(size >= MIN_BLOCK_SIZE, "I1: free block at {addr:#x} smaller than a header");
            assert_eq!(size % 8, 0, "I1: free block at {addr:#x} is not 8-byte aligned");
        }

        // I3: no two adjacent free blocks -- consecutive free-list entries
        // must have at least one allocated byte between them.
        for pair in free_list.windows(2) {
            let (a_addr, a_size) = pair[0];
            let (b_addr, _) = pair[1];
            assert!(
                a_addr + a_size < b_addr,
                "I3: adjacent free blocks at {a_addr:#x} and {b_addr:#x}"
            );
        }

        // I2/I5: free_head is the lowest-addressed free block, or none iff
        // the free list is empty.
        match (arena.free_head(), free_list.first()) {
            (None, None) => {}
            (Some(head), Some(&(addr, _))) => {
                assert_eq!(head.addr(), addr, "I5: free_head must be the lowest-addressed free block");
            }
            _ => panic!("I5: free_head presence must match free-list emptiness"),
        }

        // Free-list membership matches the allocated flag on every block.
        let free_addrs: HashSet<usize> = free_list.iter().map(|&(addr, _)| addr).collect();
        for &(addr, _, allocated) in &blocks {
            assert_eq!(
                !allocated,
                free_addrs.contains(&addr),
                "I2: free-list membership must match the allocated flag at {addr:#x}"
            );
        }
    }

    #[test]
    fn s1_first_allocation_in_fresh_4k_arena() {
        let mut arena = fresh(4096);
        let alloc = arena.allocate(100).unwrap();
        assert_eq!(alloc.payload_offset, 24);
        assert_eq!(alloc.hops, 0);

        let head = arena.free_head().unwrap();
        assert_eq!(head.addr(), arena.base() + 128);
        assert_eq!(head.size(), 3968);
        assert_invariants(&arena);
    }

    #[test]
    fn s2_exact_fit_empties_the_free_list() {
        let mut arena = fresh(4096);
        let first = arena.allocate(100).unwrap();
        assert_eq!(first.payload_offset, 24);

        let second = arena.allocate(3944).unwrap();
        assert_eq!(second.payload_offset, 152);
        assert_eq!(second.hops, 0);
        assert!(arena.free_head().is_none());
        assert_invariants(&arena);
    }

    #[test]
    fn s3_out_of_space_after_arena_exhausted() {
        let mut arena = fresh(4096);
        arena.allocate(100).unwrap();
        arena.allocate(3944).unwrap();

        let err = arena.allocate(8).unwrap_err();
        assert_eq!(err, AllocError::OutOfSpace);
        assert_invariants(&arena);
    }

    #[test]
    fn s4_release_with_no_coalesce_restores_block() {
        let mut arena = fresh(4096);
        let first = arena.allocate(100).unwrap();
        arena.allocate(3944).unwrap();

        unsafe { arena.release(Some(first.ptr)) };

        let head = arena.free_head().unwrap();
        assert_eq!(head.addr(), arena.base());
        assert_eq!(head.size(), 128);
        assert_invariants(&arena);
    }

    #[test]
    fn s5_three_allocations_released_out_of_order_fully_coalesce() {
        let mut arena = fresh(4096);
        let a = arena.allocate(40).unwrap();
        let b = arena.allocate(40).unwrap();
        let c = arena.allocate(40).unwrap();

        unsafe {
            arena.release(Some(a.ptr));
            assert_invariants(&arena);
            arena.release(Some(c.ptr));
            assert_invariants(&arena);
            arena.release(Some(b.ptr));
        }

        let head = arena.free_head().unwrap();
        assert_eq!(head.addr(), arena.base());
        assert_eq!(head.size() as usize, arena.length());
        assert!(head.next().is_none());
        assert_invariants(&arena);
    }

    #[test]
    fn s6_negative_request_is_bad_argument_and_does_not_mutate() {
        let mut arena = fresh(4096);
        let err = arena.allocate(-1).unwrap_err();
        assert_eq!(err, AllocError::BadArgument);

        let head = arena.free_head().unwrap();
        assert_eq!(head.addr(), arena.base());
        assert_eq!(head.size() as usize, arena.length());
        assert_invariants(&arena);
    }

    #[test]
    fn b1_request_larger_than_arena_fails_out_of_space() {
        let mut arena = fresh(4096);
        let err = arena.allocate(PAGE_SIZE as isize * 2).unwrap_err();
        assert_eq!(err, AllocError::OutOfSpace);
        assert_invariants(&arena);
    }

    #[test]
    fn b2_exact_remaining_size_empties_single_block_arena() {
        let mut arena = fresh(4096);
        let alloc = arena.allocate(4096 - 24).unwrap();
        assert_eq!(alloc.hops, 0);
        assert!(arena.free_head().is_none());
        assert_invariants(&arena);
    }

    #[test]
    fn b3_non_split_absorption_when_leftover_below_header_size() {
        // Leftover of 8 bytes (< 24, multiple of 8): non-split, absorbed.
        let mut arena = fresh(4096);
        let payload = 4096 - 24 - 8;
        let alloc = arena.allocate(payload as isize).unwrap();
        assert_eq!(alloc.payload_offset, 24);
        assert!(arena.free_head().is_none());
        assert_invariants(&arena);
    }

    #[test]
    fn b4_too_small_free_block_is_skipped_and_counted_as_a_hop() {
        // Carve the arena into [40-byte allocated][40-byte allocated][rest
        // free], release only the first, then request something too big for
        // that 40-byte hole. The search must skip it and land on the big
        // remainder, with hops == 1.
        let mut arena = fresh(4096);
        let a = arena.allocate(16).unwrap();
        let _b = arena.allocate(16).unwrap();
        unsafe { arena.release(Some(a.ptr)) };
        assert_invariants(&arena);

        let c = arena.allocate(100).unwrap();
        assert_eq!(c.hops, 1);
        assert_invariants(&arena);

        // Note: a free block's leftover is always a multiple of 8 once the
        // arena is in a reachable state (every free size and every request
        // rounds to a multiple of 8), so the "leftover % 8 != 0" rejection
        // path named in spec is defensive and not exercised here.
    }

    #[test]
    fn release_none_and_out_of_bounds_are_no_ops() {
        let mut arena = fresh(4096);
        let before = (arena.free_head().unwrap().addr(), arena.free_head().unwrap().size());

        unsafe { arena.release(None) };
        let after = (arena.free_head().unwrap().addr(), arena.free_head().unwrap().size());
        assert_eq!(before, after);

        let out_of_bounds = unsafe {
            NonNull::new_unchecked((arena.base() + arena.length() + 4096) as *mut u8)
        };
        unsafe { arena.release(Some(out_of_bounds)) };
        let after2 = (arena.free_head().unwrap().addr(), arena.free_head().unwrap().size());
        assert_eq!(before, after2);
        assert_invariants(&arena);
    }

    #[test]
    fn hops_count_free_blocks_examined_before_the_match() {
        let mut arena = fresh(4096);
        let a = arena.allocate(16).unwrap();
        let _b = arena.allocate(16).unwrap();
        unsafe { arena.release(Some(a.ptr)) };
        // Now free list: [freed 40-byte block at offset 0, big remainder]
        let reused = arena.allocate(16).unwrap();
        assert_eq!(reused.hops, 0);
        assert_invariants(&arena);
    }
}

//! The arena: a single fixed-size, `mmap`-backed region and its free-list
//! head. See the crate root for the block manager built on top of it.

use std::ffi::c_void;
use std::ptr;

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use log::{debug, error};

use crate::block::BlockHeader;
use crate::error::AllocError;

/// Page size backing this allocator's region rounding. Fixed, per spec, at
/// 4096 bytes.
pub const PAGE_SIZE: usize = 4096;

fn round_up_to_page(size: usize) -> usize {
    let remainder = size % PAGE_SIZE;
    if remainder == 0 { size } else { size + (PAGE_SIZE - remainder) }
}

/// A single contiguous region of memory sub-allocated by the block manager.
///
/// `Arena` owns the backing mapping exclusively: no header inside it ever
/// outlives the `Arena`, and the mapping is released with `munmap` on drop.
/// It is not `Send`/`Sync` -- the allocator is single-threaded by design
/// (spec Non-goal), and a caller needing concurrent access must serialize
/// externally.
pub struct Arena {
    base: usize,
    length: usize,
    free_head: Option<BlockHeader>,
}

impl Arena {
    /// Acquires a backing region of at least `requested_size` bytes from the
    /// OS (rounded up to a multiple of [`PAGE_SIZE`]) and initializes it as
    /// one free block spanning the whole region.
    ///
    /// Returns [`AllocError::Init`] if the OS region acquisition fails.
    /// Calling `init` more than once per arena value is fine (each call
    /// produces an independent mapping); reusing a backing region across two
    /// live `Arena`s is not something this type allows.
    pub fn init(requested_size: usize) -> Result<Self, AllocError> {
        let length = round_up_to_page(requested_size);

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                length,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if base == MAP_FAILED {
            error!("mmap failed while acquiring a {length}-byte region");
            return Err(AllocError::Init);
        }

        let base = base as usize;
        let head = unsafe { BlockHeader::at(base) };
        head.set_size(length as u32);
        head.set_allocated(false);
        head.set_next(None);
        head.set_prev(None);

        debug!("arena initialized: base={base:#x} length={length}");

        Ok(Self { base, length, free_head: Some(head) })
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// `true` if `address` lies within `[base, base + length]`, the bounds
    /// check `release` uses (inclusive of the one-past-the-end address, per
    /// spec).
    pub(crate) fn in_bounds(&self, address: usize) -> bool {
        address >= self.base && address <= self.base + self.length
    }

    pub(crate) fn free_head(&self) -> Option<BlockHeader> {
        self.free_head
    }

    pub(crate) fn set_free_head(&mut self, head: Option<BlockHeader>) {
        self.free_head = head;
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut c_void, self.length);
        }
    }
}

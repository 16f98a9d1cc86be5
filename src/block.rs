//! Typed, unsafe-confined view over a block header living inside the arena.
//!
//! Every block begins with a 24-byte header:
//!
//! ```text
//!   offset  width  field
//!   0       4      size       (total block size, header included)
//!   4       4      allocated  (1 = allocated, 0 = free)
//!   8       8      next       (free list only; 0 means none)
//!   16      8      prev       (free list only; 0 means none)
//! ```
//!
//! `BlockHeader` is a thin, `Copy` handle to an address. It does not own the
//! memory it points at -- the [`crate::Arena`] does. All raw reads/writes
//! are confined to the accessors below; the block manager never pokes at
//! header bytes directly.

use std::ptr::{self, NonNull};

/// Size, in bytes, of a block header. Fixed by the field layout above.
pub(crate) const HEADER_SIZE: usize = 24;

/// Smallest possible block: a header with no payload.
pub(crate) const MIN_BLOCK_SIZE: usize = HEADER_SIZE;

/// Sentinel stored in `next`/`prev` for "no block". Real mappings never sit
/// at address zero, so zero is unambiguous (the same convention the source
/// C implementation uses with `NULL`).
const NONE_ADDR: u64 = 0;

/// A handle to a block header at a fixed address inside the arena.
///
/// Two `BlockHeader`s are equal iff they point at the same address; this is
/// how the block manager recognizes e.g. that the insertion-point walk has
/// reached `free_head` again.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct BlockHeader(NonNull<u8>);

impl BlockHeader {
    /// Creates a handle to the header at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must be a valid, non-zero address of a block header within an
    /// arena's backing region, and must remain valid for the lifetime of
    /// any reads/writes performed through the returned handle.
    pub(crate) unsafe fn at(addr: usize) -> Self {
        debug_assert_ne!(addr, 0, "block header address must not be null");
        Self(unsafe { NonNull::new_unchecked(addr as *mut u8) })
    }

    pub(crate) fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    fn field_ptr(self, offset: usize) -> *mut u8 {
        unsafe { self.0.as_ptr().add(offset) }
    }

    pub(crate) fn size(self) -> u32 {
        unsafe { ptr::read_unaligned(self.field_ptr(0) as *const u32) }
    }

    pub(crate) fn set_size(self, size: u32) {
        unsafe { ptr::write_unaligned(self.field_ptr(0) as *mut u32, size) }
    }

    pub(crate) fn is_allocated(self) -> bool {
        unsafe { ptr::read_unaligned(self.field_ptr(4) as *const u32) != 0 }
    }

    pub(crate) fn set_allocated(self, allocated: bool) {
        unsafe {
            ptr::write_unaligned(self.field_ptr(4) as *mut u32, allocated as u32);
        }
    }

    pub(crate) fn next(self) -> Option<BlockHeader> {
        let raw = unsafe { ptr::read_unaligned(self.field_ptr(8) as *const u64) };
        (raw != NONE_ADDR).then(|| unsafe { BlockHeader::at(raw as usize) })
    }

    pub(crate) fn set_next(self, next: Option<BlockHeader>) {
        let raw = next.map_or(NONE_ADDR, |b| b.addr() as u64);
        unsafe { ptr::write_unaligned(self.field_ptr(8) as *mut u64, raw) }
    }

    pub(crate) fn prev(self) -> Option<BlockHeader> {
        let raw = unsafe { ptr::read_unaligned(self.field_ptr(16) as *const u64) };
        (raw != NONE_ADDR).then(|| unsafe { BlockHeader::at(raw as usize) })
    }

    pub(crate) fn set_prev(self, prev: Option<BlockHeader>) {
        let raw = prev.map_or(NONE_ADDR, |b| b.addr() as u64);
        unsafe { ptr::write_unaligned(self.field_ptr(16) as *mut u64, raw) }
    }

    /// Address of the first payload byte, i.e. one past the header.
    pub(crate) fn payload_addr(self) -> usize {
        self.addr() + HEADER_SIZE
    }

    /// Builds a handle from a payload address previously handed to a caller.
    ///
    /// # Safety
    ///
    /// `payload_addr` must be `header.payload_addr()` for some valid header
    /// inside the arena.
    pub(crate) unsafe fn from_payload(payload_addr: usize) -> Self {
        unsafe { Self::at(payload_addr - HEADER_SIZE) }
    }
}

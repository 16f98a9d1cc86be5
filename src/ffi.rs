//! A thin `extern "C"` shim mirroring the historical `my_init` / `smalloc` /
//! `sfree` contract this allocator was distilled from. It holds no logic of
//! its own beyond translating to and from the safe [`crate::Arena`] API and
//! the flat, process-global arena the C contract assumes.
//!
//! This module is a convenience for callers that want the exact original
//! signatures; new Rust code should use [`crate::Arena`] directly.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;

use crate::arena::Arena;

/// C-compatible mirror of spec's `Status` record.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Status {
    pub success: c_int,
    pub payload_offset: isize,
    pub hops: isize,
}

impl Status {
    fn failure() -> Self {
        Self { success: 0, payload_offset: -1, hops: -1 }
    }
}

// The historical contract is one process-wide arena, configured once by
// `my_init`. This mirrors spec's §9 "global state" design note: a single
// global is what the original source does, kept here only at the FFI
// boundary rather than as the crate's primary design.
static mut ARENA: Option<Arena> = None;

/// Initializes the process-wide arena. Returns 0 on success, -1 on failure.
///
/// # Safety
///
/// Must not be called concurrently with itself, `smalloc`, or `sfree`, and
/// should be called at most once (re-initializing drops and replaces the
/// prior mapping, invalidating every live pointer into it).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn my_init(size_of_region: c_int) -> c_int {
    if size_of_region < 0 {
        return -1;
    }
    match Arena::init(size_of_region as usize) {
        Ok(arena) => {
            unsafe {
                ARENA = Some(arena);
            }
            0
        }
        Err(_) => -1,
    }
}

/// Allocates `size_of_payload` bytes from the process-wide arena.
///
/// # Safety
///
/// `status` must be a valid, writable pointer to a `Status`. `my_init` must
/// have been called first; calling before init is undefined (there is no
/// arena to allocate from).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn smalloc(size_of_payload: c_int, status: *mut Status) -> *mut c_void {
    let arena = match unsafe { ARENA.as_mut() } {
        Some(a) => a,
        None => {
            if !status.is_null() {
                unsafe { *status = Status::failure() };
            }
            return ptr::null_mut();
        }
    };

    match arena.allocate(size_of_payload as isize) {
        Ok(alloc) => {
            if !status.is_null() {
                unsafe {
                    *status = Status {
                        success: 1,
                        payload_offset: alloc.payload_offset as isize,
                        hops: alloc.hops as isize,
                    };
                }
            }
            alloc.ptr.as_ptr() as *mut c_void
        }
        Err(_) => {
            if !status.is_null() {
                unsafe { *status = Status::failure() };
            }
            ptr::null_mut()
        }
    }
}

/// Releases the block whose payload begins at `ptr`. No-op for null and for
/// addresses outside the arena's bounds.
///
/// # Safety
///
/// `ptr` must be either null or a payload pointer previously returned by
/// `smalloc` on the process-wide arena, not already released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sfree(ptr: *mut c_void) {
    let arena = match unsafe { ARENA.as_mut() } {
        Some(a) => a,
        None => return,
    };

    let address = std::ptr::NonNull::new(ptr as *mut u8);
    unsafe { arena.release(address) };
}

//! # smalloc - a fixed-region, address-ordered free-list allocator
//!
//! This crate implements a heap allocator that sub-allocates variable-sized
//! payloads out of a single, fixed-size region of memory acquired once from
//! the OS via `mmap`. It is meant as an embeddable replacement for the
//! process allocator in contexts that want deterministic, inspectable
//! allocation behavior over a bounded arena, rather than a growable heap.
//!
//! ## Overview
//!
//! ```text
//!   Arena (one mmap'd region, fixed size)
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │ [header|payload] [header|payload]      [header|.. free ..]       │
//!   │   allocated         allocated                 free               │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every byte in the arena belongs to exactly one block: a 24-byte header
//! followed by a payload region. Free blocks are threaded into a doubly
//! linked list in strictly increasing address order. Allocation is
//! first-fit over that list, splitting the chosen block when the remainder
//! is large enough to stand on its own. Release walks the list to find the
//! insertion point and eagerly coalesces with up to two address-adjacent
//! free neighbors, so no two free blocks are ever adjacent.
//!
//! ## Crate structure
//!
//! ```text
//!   smalloc
//!   ├── arena    - region acquisition (mmap), page rounding, Arena state
//!   ├── block    - typed, unsafe-confined view over a block header
//!   ├── manager  - allocate/release: first-fit search, split, coalesce
//!   ├── error    - AllocError taxonomy
//!   └── ffi      - extern "C" shim mirroring the historical contract
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use smalloc::Arena;
//!
//! let mut arena = Arena::init(1 << 20).expect("failed to map arena");
//! let alloc = arena.allocate(128).expect("out of space");
//! unsafe {
//!     alloc.ptr.as_ptr().write_bytes(0, 128);
//!     arena.release(Some(alloc.ptr));
//! }
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives; concurrent
//!   `allocate`/`release` on the same arena is a data race.
//! - **Fixed size**: the region is sized once at `init` and never grows.
//! - **No defense against invalid release pointers** beyond a coarse bounds
//!   check; releasing an address that isn't a live payload start is
//!   undefined behavior, matching the allocator's trust toward its caller.
//!
//! ## Safety
//!
//! This crate manages raw memory directly. `Arena::allocate` never takes a
//! caller-supplied address and is safe to call (the unsafe pointer
//! arithmetic is confined to the `block` module's accessors). `Arena::release`
//! trusts its `address` argument to be a live payload pointer and is
//! `unsafe fn`: passing an address that wasn't returned by `allocate` on the
//! same arena, or one already released, is undefined behavior, same as any
//! manual allocator's `free`.

mod arena;
mod block;
pub mod ffi;
mod manager;

mod error;

pub use arena::{Arena, PAGE_SIZE};
pub use error::AllocError;
pub use manager::Allocation;

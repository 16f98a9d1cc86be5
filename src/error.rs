//! Error taxonomy for the allocator.
//!
//! Every failure the block manager can hit is surfaced through one of these
//! variants rather than a sentinel return value; see [`crate::Arena::init`],
//! [`crate::Arena::allocate`].

use std::fmt;

/// Something the allocator could not do.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AllocError {
    /// The OS refused to map a backing region for the arena.
    Init,
    /// A negative payload size was requested.
    BadArgument,
    /// No free block in the arena is large enough to satisfy the request.
    OutOfSpace,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::Init => write!(f, "failed to acquire a backing region from the OS"),
            AllocError::BadArgument => write!(f, "requested payload size is negative"),
            AllocError::OutOfSpace => write!(f, "no free block large enough for the request"),
        }
    }
}

impl std::error::Error for AllocError {}

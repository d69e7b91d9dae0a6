#![no_std]

//! A first-fit memory allocator grown by pushing the process break.
//!
//! Every region ever obtained from the heap is described by a header
//! living at its front, and the headers are chained into a directory in
//! heap order. Allocation scans the directory front to back for the first
//! block with enough room, carving the unused tail off an over-provisioned
//! block when that is what it finds, and pushes the break only when no
//! chained block fits. Release walks the directory to prove the pointer is
//! one of ours, then folds the freed block together with any free
//! neighbor.
//!
//! Memory is never handed back to the operating system; freed regions are
//! recycled for later requests. Out-of-bounds requests, growth failures
//! and foreign pointers are reported at warning severity and answered with
//! a null pointer or a no-op, so callers are expected to check. Invariant
//! violations inside the allocator itself abort the process (see
//! [`diag`]).
//!
//! The engine is single-threaded; [`LockedAllocator`] and
//! [`SbrkAllocator`] put one spin lock around it for shared use.

pub mod allocators;
pub mod diag;
pub mod directory;

pub use crate::allocators::{
    Allocator, HeapGrower, LockedAllocator, SbrkAllocator, SbrkHeapGrower, ToyHeap,
    MAX_ALLOCATION,
};
pub use crate::diag::Severity;
pub use crate::directory::{
    BlockRef, Directory, Stats, Validity, DEFAULT_ALIGNMENT, HEADER_SIZE, MIN_ALLOCATION,
};

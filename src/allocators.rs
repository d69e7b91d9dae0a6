//! Allocator types, generic over how the heap grows.
//!
//! ## Basic Types
//!
//! ### [`Allocator`](struct.Allocator.html)
//!
//! An `Allocator` is the single-threaded engine: it owns the block
//! [`Directory`](../directory/struct.Directory.html) and a
//! [`HeapGrower`](trait.HeapGrower.html), and exposes `allocate` and
//! `release`. Because it is not thread-safe it takes `&mut self`
//! everywhere.
//!
//! ### [`LockedAllocator`](struct.LockedAllocator.html)
//!
//! A `LockedAllocator` wraps the engine in a spin lock held for the whole
//! duration of each call, which is all the concurrency protection this
//! design calls for.
//!
//! ### [`SbrkAllocator`](struct.SbrkAllocator.html)
//!
//! A `SbrkAllocator` is the locked engine combined with
//! [`SbrkHeapGrower`](struct.SbrkHeapGrower.html), growing the real
//! process break. It is `const`-constructible so it can live in a static.
//!
//! ### [`ToyHeap`](struct.ToyHeap.html)
//!
//! A `ToyHeap` is a fixed arena inside the struct itself that can pretend
//! to be a heap. It is mainly useful for testing.

use core::fmt;
use core::ptr::{null_mut, NonNull};

use spin::{Mutex, MutexGuard};

use crate::diag;
use crate::directory::{
    BlockRef, Directory, Stats, Validity, DEFAULT_ALIGNMENT, HEADER_SIZE, MIN_ALLOCATION,
};

/// Largest payload a caller may request, in bytes. The break can only be
/// pushed by an `isize` at a time, so nothing bigger is representable in a
/// single growth.
pub const MAX_ALLOCATION: usize = isize::MAX as usize;

// Round up value to the nearest multiple of increment. Values at or below
// the increment round to exactly one increment.
fn round_up(value: usize, increment: usize) -> usize {
    if value == 0 {
        return 0;
    }
    increment * ((value - 1) / increment + 1)
}

/// The boundary call that obtains fresh address space for the directory.
pub trait HeapGrower {
    type Err: fmt::Display;

    /// Grow the heap by exactly `size` bytes, returning a pointer to the
    /// start of the new region.
    ///
    /// # Safety
    ///
    /// `size` must be at most [`MAX_ALLOCATION`]. On success the returned
    /// region must be writable, at least `size` bytes, and untracked by
    /// any other code, this allocator included.
    unsafe fn grow_heap(&mut self, size: usize) -> Result<NonNull<u8>, Self::Err>;
}

/// Grows the heap by pushing the process break with `sbrk`.
#[derive(Default)]
pub struct SbrkHeapGrower {
    /// Number of successful growths, for bookkeeping only.
    pub growths: usize,
    /// Total bytes obtained over the process lifetime.
    pub grown_bytes: usize,
}

impl SbrkHeapGrower {
    pub const fn new() -> Self {
        SbrkHeapGrower {
            growths: 0,
            grown_bytes: 0,
        }
    }
}

impl HeapGrower for SbrkHeapGrower {
    type Err = errno::Errno;

    unsafe fn grow_heap(&mut self, size: usize) -> Result<NonNull<u8>, Self::Err> {
        let ptr = libc::sbrk(size as libc::intptr_t);
        if ptr as isize == -1 {
            return Err(errno::errno());
        }

        self.growths += 1;
        self.grown_bytes += size;
        // The break stays aligned as long as every extension is a multiple
        // of the alignment, which ours are. Other break users could still
        // leave it askew.
        debug_assert_eq!(ptr as usize % DEFAULT_ALIGNMENT, 0);
        Ok(NonNull::new_unchecked(ptr as *mut u8))
    }
}

/// Bytes of backing store inside a [`ToyHeap`].
pub const TOY_HEAP_SIZE: usize = 256 * 1024;

/// A pretend heap living inside the struct itself, for tests.
#[repr(C, align(8))]
pub struct ToyHeap {
    /// Bytes handed out so far.
    pub size: usize,
    pub heap: [u8; TOY_HEAP_SIZE],
}

impl Default for ToyHeap {
    fn default() -> Self {
        ToyHeap {
            size: 0,
            heap: [0; TOY_HEAP_SIZE],
        }
    }
}

/// The toy heap ran out of backing store.
#[derive(Debug)]
pub struct ToyHeapExhausted;

impl fmt::Display for ToyHeapExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the toy heap backing store is exhausted")
    }
}

impl HeapGrower for ToyHeap {
    type Err = ToyHeapExhausted;

    unsafe fn grow_heap(&mut self, size: usize) -> Result<NonNull<u8>, Self::Err> {
        if self.size + size > self.heap.len() {
            return Err(ToyHeapExhausted);
        }
        let ptr = self.heap.as_mut_ptr().add(self.size);
        self.size += size;
        Ok(NonNull::new_unchecked(ptr))
    }
}

/// The allocator engine: a block directory over a growable heap, handing
/// out payload pointers and recycling released ones.
///
/// Memory obtained from the grower is never returned; released blocks go
/// back into the directory's pool for reuse.
pub struct Allocator<G> {
    pub grower: G,
    pub directory: Directory,
}

impl<G: HeapGrower + Default> Default for Allocator<G> {
    fn default() -> Self {
        Allocator::new(G::default())
    }
}

impl<G: HeapGrower> Allocator<G> {
    pub const fn new(grower: G) -> Self {
        Allocator {
            grower,
            directory: Directory::new(),
        }
    }

    /// Check directory invariants and gather usage figures.
    pub fn audit(&self) -> (Validity, Stats) {
        self.directory.audit()
    }

    /// Allocate `size` bytes and return a pointer to them, or null when the
    /// request is out of bounds or the heap cannot grow.
    ///
    /// The pointer is aligned to [`DEFAULT_ALIGNMENT`] and stays valid
    /// until passed to [`release`](Allocator::release).
    ///
    /// # Safety
    ///
    /// The returned memory is uninitialized, and the allocator must not be
    /// moved while the allocation is live.
    pub unsafe fn allocate(&mut self, size: usize) -> *mut u8 {
        if size < MIN_ALLOCATION {
            diag::warn("allocation size is under the minimum allocation size");
            return null_mut();
        }
        if size > MAX_ALLOCATION {
            diag::warn("allocation size is over the maximum allocation size");
            return null_mut();
        }

        let aligned = round_up(size, DEFAULT_ALIGNMENT);
        let needed = match aligned.checked_add(HEADER_SIZE) {
            Some(needed) => needed,
            None => diag::fatal("allocation size overflowed while accounting for its header"),
        };

        if let Some(block) = self.directory.claim(aligned) {
            log::debug!("allocate({}) reused {:?}", size, block);
            return block.payload().as_ptr();
        }

        let region = match self.grow_region(needed) {
            Some(region) => region,
            None => return null_mut(),
        };
        let mut block = self.directory.append_region(region, needed);
        block.occupy(aligned);
        log::debug!("allocate({}) grew the heap by {} bytes", size, needed);
        block.payload().as_ptr()
    }

    /// Hand an allocation back for reuse.
    ///
    /// A null pointer, or a pointer this allocator never produced, is
    /// reported as a warning and ignored. Releasing the same live pointer
    /// twice is out of contract: the block is still a directory member, so
    /// the second call succeeds spuriously.
    ///
    /// # Safety
    ///
    /// The caller must not touch the pointed-at memory afterwards.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        let payload = match NonNull::new(ptr) {
            Some(payload) => payload,
            None => {
                diag::warn("null pointer passed to release");
                return;
            }
        };

        match BlockRef::from_payload(payload) {
            Some(block) if self.directory.reclaim(block) => {
                log::debug!("released {:?}", block);
            }
            _ => diag::warn("pointer passed to release was not produced by this allocator"),
        }
    }

    /// Ask the grower for `size` fresh bytes, reporting failure as a
    /// warning and returning `None`.
    unsafe fn grow_region(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size > MAX_ALLOCATION {
            diag::warn("block size is over the maximum the heap can grow by");
            return None;
        }
        match self.grower.grow_heap(size) {
            Ok(region) => Some(region),
            Err(err) => {
                diag::warn(format_args!(
                    "the heap could not grow by {} bytes: {}",
                    size, err
                ));
                None
            }
        }
    }
}

/// A thread-safe allocator: the engine behind one spin lock, held for the
/// whole duration of each call.
pub struct LockedAllocator<G> {
    inner: Mutex<Allocator<G>>,
}

impl<G: HeapGrower> LockedAllocator<G> {
    pub const fn new(grower: G) -> Self {
        LockedAllocator {
            inner: Mutex::new(Allocator::new(grower)),
        }
    }

    /// Lock the engine for a sequence of calls.
    pub fn lock(&self) -> MutexGuard<'_, Allocator<G>> {
        self.inner.lock()
    }

    /// See [`Allocator::allocate`].
    ///
    /// # Safety
    ///
    /// As for [`Allocator::allocate`].
    pub unsafe fn allocate(&self, size: usize) -> *mut u8 {
        self.inner.lock().allocate(size)
    }

    /// See [`Allocator::release`].
    ///
    /// # Safety
    ///
    /// As for [`Allocator::release`].
    pub unsafe fn release(&self, ptr: *mut u8) {
        self.inner.lock().release(ptr)
    }

    pub fn audit(&self) -> (Validity, Stats) {
        self.inner.lock().audit()
    }
}

impl<G: HeapGrower + Default> Default for LockedAllocator<G> {
    fn default() -> Self {
        LockedAllocator::new(G::default())
    }
}

/// The process-break allocator, ready to live in a static.
#[derive(Default)]
pub struct SbrkAllocator {
    alloc: LockedAllocator<SbrkHeapGrower>,
}

impl SbrkAllocator {
    pub const fn new() -> Self {
        SbrkAllocator {
            alloc: LockedAllocator::new(SbrkHeapGrower::new()),
        }
    }

    /// See [`Allocator::allocate`].
    ///
    /// # Safety
    ///
    /// As for [`Allocator::allocate`].
    pub unsafe fn allocate(&self, size: usize) -> *mut u8 {
        self.alloc.allocate(size)
    }

    /// See [`Allocator::release`].
    ///
    /// # Safety
    ///
    /// As for [`Allocator::release`].
    pub unsafe fn release(&self, ptr: *mut u8) {
        self.alloc.release(ptr)
    }

    pub fn audit(&self) -> (Validity, Stats) {
        self.alloc.audit()
    }
}

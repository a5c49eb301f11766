//! Boundary-tag heap allocator over a caller-supplied arena.
//!
//! [`Heap`] manages one contiguous buffer with the classic four operations
//! (allocate, zero-allocate, resize, release) and nothing else: no OS heap,
//! no growth, no locks. All bookkeeping lives in-band as signed header and
//! footer words around every chunk, with free chunks threaded into
//! segregated size-class lists through their own payload. That makes it a
//! fit for bare-metal and embedded setups where a fixed arena is carved out
//! at boot.
//!
//! ```
//! use std::ptr::NonNull;
//!
//! use tagalloc::{Heap, DEFAULT_POWER};
//!
//! let mut arena = vec![0u32; 1024];
//! let base = NonNull::new(arena.as_mut_ptr().cast::<u8>()).unwrap();
//!
//! unsafe {
//!     let mut heap = Heap::new(base, arena.len() * 4, DEFAULT_POWER).unwrap();
//!
//!     let p = heap.allocate(128).unwrap();
//!     p.as_ptr().write_bytes(0x42, 128);
//!
//!     let p = heap.reallocate(Some(p), 256).unwrap();
//!     assert_eq!(*p.as_ptr(), 0x42);
//!
//!     heap.deallocate(Some(p));
//! }
//! ```
//!
//! For a process-global embedding there is [`Tagalloc`], which owns its
//! arena and can stand as `#[global_allocator]`.

use std::ptr::NonNull;

mod allocator;
mod arena;
mod chunk;
mod coalesce;
mod freelist;
mod heap;
mod realloc;

/// Non-null pointer to `T`. We use this in most cases instead of `*mut T`
/// because the compiler will yell at us if we don't write code for the
/// `None` case.
pub(crate) type Pointer<T> = Option<NonNull<T>>;

pub use allocator::Tagalloc;
pub use heap::{Heap, InitError, DEFAULT_POWER};

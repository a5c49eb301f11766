use std::{
    alloc::{GlobalAlloc, Layout},
    cell::UnsafeCell,
    ptr::{self, NonNull},
    sync::{Mutex, MutexGuard},
};

use crate::{
    chunk::WORD_SIZE,
    heap::{Heap, DEFAULT_POWER},
};

/// The arena storage. Chunk headers are 32-bit words, so the buffer itself
/// must start on a word boundary no matter where the static lands.
#[repr(align(4))]
struct ArenaBytes<const N: usize>([u8; N]);

/// A [`Heap`] bundled with its own `N`-byte arena and a lock, suitable as a
/// `#[global_allocator]`:
///
/// ```no_run
/// use tagalloc::Tagalloc;
///
/// #[global_allocator]
/// static ALLOCATOR: Tagalloc<65536> = Tagalloc::new();
///
/// fn main() {
///     let v = vec![1u32, 2, 3];
///     assert_eq!(v.iter().sum::<u32>(), 6);
/// }
/// ```
///
/// The core heap is single-context by design, so this wrapper serializes
/// every call through a [`Mutex`]. The heap is set up lazily on the first
/// allocation; construction is `const` so the whole thing can live in a
/// `static`.
///
/// The engine only guarantees word alignment. Requests with
/// `layout.align() > 4` are refused with a null return, which makes this
/// wrapper a fit for 32-bit-word workloads and a deliberate misfit for
/// anything wanting SIMD-aligned storage. `N` must be a multiple of 4 and
/// at least 16, otherwise every allocation fails.
pub struct Tagalloc<const N: usize> {
    arena: UnsafeCell<ArenaBytes<N>>,
    heap: Mutex<Option<Heap>>,
    power: u32,
}

// The arena is only ever reached through the heap, and the heap sits behind
// the Mutex.
unsafe impl<const N: usize> Sync for Tagalloc<N> {}

impl<const N: usize> Tagalloc<N> {
    /// Wrapper with the default size-class ladder.
    pub const fn new() -> Self {
        Self::with_power(DEFAULT_POWER)
    }

    /// Wrapper with a custom size-class exponent, see
    /// [`crate::DEFAULT_POWER`].
    pub const fn with_power(power: u32) -> Self {
        Self {
            arena: UnsafeCell::new(ArenaBytes([0; N])),
            heap: Mutex::new(None),
            power,
        }
    }

    /// Locks the heap, building it on first use. `None` when the lock is
    /// poisoned; the guard holds `None` when the const parameters were
    /// invalid. Either way, allocation failure is the worst outcome of a
    /// bad setup.
    fn lock_heap(&self) -> Option<MutexGuard<'_, Option<Heap>>> {
        let mut guard = self.heap.lock().ok()?;

        if guard.is_none() {
            let base = unsafe { NonNull::new_unchecked(self.arena.get().cast::<u8>()) };
            *guard = unsafe { Heap::new(base, N, self.power) }.ok();
        }

        Some(guard)
    }
}

impl<const N: usize> Default for Tagalloc<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorter syntax for the null-on-failure convention of [`GlobalAlloc`].
fn raw_or_null(address: Option<NonNull<u8>>) -> *mut u8 {
    match address {
        Some(address) => address.as_ptr(),
        None => ptr::null_mut(),
    }
}

unsafe impl<const N: usize> GlobalAlloc for Tagalloc<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > WORD_SIZE {
            return ptr::null_mut();
        }

        match self.lock_heap().as_deref_mut() {
            Some(Some(heap)) => raw_or_null(heap.allocate(layout.size())),
            _ => ptr::null_mut(),
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > WORD_SIZE {
            return ptr::null_mut();
        }

        match self.lock_heap().as_deref_mut() {
            Some(Some(heap)) => raw_or_null(heap.allocate_zeroed(1, layout.size())),
            _ => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(Some(heap)) = self.lock_heap().as_deref_mut() {
            heap.deallocate(NonNull::new(ptr));
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > WORD_SIZE {
            return ptr::null_mut();
        }

        match self.lock_heap().as_deref_mut() {
            Some(Some(heap)) => raw_or_null(heap.reallocate(NonNull::new(ptr), new_size)),
            _ => ptr::null_mut(),
        }
    }
}

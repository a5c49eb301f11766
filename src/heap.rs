use std::{fmt, ptr::NonNull};

use crate::{
    arena::Arena,
    chunk::{self, Chunk, MAX_REQUEST_BYTES, MIN_CHUNK_SIZE, TAG_WORDS, WORD_SIZE},
    coalesce::Directions,
    freelist::FreeLists,
    Pointer,
};

/// Default size-class base exponent. Class upper bounds grow by this many
/// bits per class, so 2 gives the 4 / 16 / 64 / ... word ladder.
pub const DEFAULT_POWER: u32 = 2;

/// Smallest arena that can hold one chunk: header, two link words, footer.
const MIN_ARENA_BYTES: usize = 16;

const MIN_POWER: u32 = 1;
const MAX_POWER: u32 = 8;

/// The ways [`Heap::new`] can reject its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The buffer cannot hold even one minimum-size chunk (16 bytes).
    BufferTooSmall,
    /// The buffer holds more words than the signed 32-bit chunk header can
    /// count, i.e. more than `2^31 - 1` of them.
    BufferTooLarge,
    /// The buffer address or length is not a multiple of the 4-byte word.
    UnalignedBuffer,
    /// The size-class exponent is outside `1..=8`.
    InvalidPower,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::BufferTooSmall => write!(f, "arena must be at least 16 bytes"),
            InitError::BufferTooLarge => write!(f, "arena cannot exceed 2^31 - 1 words"),
            InitError::UnalignedBuffer => write!(f, "arena address and length must be word aligned"),
            InitError::InvalidPower => write!(f, "size-class power must be between 1 and 8"),
        }
    }
}

impl std::error::Error for InitError {}

/// A heap over one caller-supplied arena.
///
/// This is the state-parameterised allocator: it owns no memory of its own
/// and talks to no operating system. Everything it knows lives in-band in
/// the arena as boundary-tagged chunks (see [`Chunk`]) threaded through
/// segregated free lists (see [`crate::freelist::FreeLists`]), which is why
/// independent heaps over disjoint arenas cannot interfere with each other.
///
/// The heap itself is not synchronized. A single execution context may use
/// it directly; sharing an arena across contexts needs an external critical
/// section around every call (see [`crate::Tagalloc`] for a wrapped
/// version).
///
/// Because the chunk size is a signed 32-bit word count, no single
/// allocation can exceed `2^31 - 1` words (just under 8 GiB).
pub struct Heap {
    pub(crate) arena: Arena,
    pub(crate) lists: FreeLists,
}

// The heap holds raw pointers into the arena, nothing thread-local. Moving
// it to another context is sound as long as the arena's exclusivity
// contract (see `new`) travels with it.
unsafe impl Send for Heap {}

impl Heap {
    /// Builds a heap over `bytes` bytes starting at `buffer` and writes the
    /// initial spanning free chunk into it, so `buffer[0]` and the last word
    /// both read `bytes / 4 - 2` afterwards.
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for reads and writes of `bytes` bytes for the
    /// whole life of the heap, and nothing else may touch that memory except
    /// through payload pointers this heap hands out.
    pub unsafe fn new(buffer: NonNull<u8>, bytes: usize, power: u32) -> Result<Self, InitError> {
        if bytes < MIN_ARENA_BYTES {
            return Err(InitError::BufferTooSmall);
        }
        if bytes / WORD_SIZE > i32::MAX as usize {
            return Err(InitError::BufferTooLarge);
        }
        if bytes % WORD_SIZE != 0 || buffer.as_ptr() as usize % WORD_SIZE != 0 {
            return Err(InitError::UnalignedBuffer);
        }
        if !(MIN_POWER..=MAX_POWER).contains(&power) {
            return Err(InitError::InvalidPower);
        }

        let mut heap = Self {
            arena: Arena::new(buffer, bytes),
            lists: FreeLists::new(power),
        };

        // One free chunk spanning the whole arena.
        let first = heap.arena.chunk_at(0).unwrap();
        Chunk::set_size(first, heap.arena.words() as i32 - TAG_WORDS as i32);
        heap.lists.insert(&heap.arena, first);

        Ok(heap)
    }

    /// Allocates at least `bytes` bytes and returns the payload address,
    /// or `None` when the request is zero, oversized, or nothing in the
    /// arena can satisfy it. A failed allocation leaves the arena bitwise
    /// untouched.
    ///
    /// The returned pointer is word aligned; no stronger alignment is ever
    /// guaranteed.
    ///
    /// # Safety
    ///
    /// The arena handed to [`Heap::new`] must still be valid.
    pub unsafe fn allocate(&mut self, bytes: usize) -> Option<NonNull<u8>> {
        let chunk = self.reserve_chunk(bytes, false)?;
        Some(Chunk::payload_of(chunk))
    }

    /// Allocates room for `count` elements of `size` bytes each and zeroes
    /// every payload word the request covers. `None` on overflow of the
    /// product or any ordinary allocation failure.
    ///
    /// # Safety
    ///
    /// Same contract as [`Self::allocate`].
    pub unsafe fn allocate_zeroed(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let total = count.checked_mul(size)?;
        let chunk = self.reserve_chunk(total, true)?;
        Some(Chunk::payload_of(chunk))
    }

    /// Resizes an allocation to at least `bytes` bytes, preserving the
    /// first `min(old, new)` payload bytes. Growing prefers merging free
    /// neighbors over moving: in place when free space on the right
    /// suffices, sliding left when both sides together suffice, and only
    /// then relocating to a fresh chunk.
    ///
    /// A nil pointer turns this into [`Self::allocate`]; a zero size turns
    /// it into [`Self::deallocate`] and returns `None`. A pointer this heap
    /// does not recognize as a live allocation yields `None` with no state
    /// change, and a failed grow leaves the original allocation valid.
    ///
    /// # Safety
    ///
    /// `ptr` must be nil or a payload pointer obtained from this heap.
    pub unsafe fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        bytes: usize,
    ) -> Option<NonNull<u8>> {
        let Some(address) = ptr else {
            return self.allocate(bytes);
        };

        if bytes == 0 {
            self.deallocate(Some(address));
            return None;
        }

        if bytes as u64 > MAX_REQUEST_BYTES {
            return None;
        }

        let chunk = Chunk::from_payload(address);
        if !Chunk::metadata_matches(chunk) || Chunk::header_of(chunk) >= 0 {
            return None;
        }

        let chunk = self.reallocate_chunk(chunk, bytes)?;
        Some(Chunk::payload_of(chunk))
    }

    /// Returns an allocation to the heap, merging it with any free
    /// neighbors. Nil is ignored. So is a pointer whose chunk fails the
    /// header/footer check or is not taken — releasing twice is therefore
    /// a no-op, not corruption.
    ///
    /// # Safety
    ///
    /// `ptr` must be nil or a payload pointer obtained from this heap.
    pub unsafe fn deallocate(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(address) = ptr else { return };

        let chunk = Chunk::from_payload(address);
        if !Chunk::metadata_matches(chunk) || Chunk::header_of(chunk) >= 0 {
            return;
        }

        self.release_chunk(chunk);
    }

    /// Finds, unlinks and takes a chunk for a `bytes`-byte request.
    pub(crate) unsafe fn reserve_chunk(&mut self, bytes: usize, clear: bool) -> Pointer<Chunk> {
        if bytes == 0 || bytes as u64 > MAX_REQUEST_BYTES {
            return None;
        }

        let words = chunk::words_for(bytes).max(MIN_CHUNK_SIZE);
        let chunk = self.lists.best_fit(&self.arena, words)?;
        self.lists.remove(&self.arena, chunk);

        let clear_words = clear.then(|| chunk::words_for(bytes) as u32);
        Some(self.take_chunk(chunk, words, clear_words))
    }

    /// Turns a free, unlinked chunk into a taken one holding `words`
    /// payload words. When the tail left over after carving out `words`
    /// plus a new tag pair could stand as a chunk of its own, the chunk is
    /// split and the remainder goes back to the free lists; otherwise the
    /// caller gets the whole thing.
    ///
    /// `clear_words` payload words are zeroed before the status flip when
    /// the request asked for it.
    ///
    /// The stale link words are left as they are. They are payload from
    /// here on, and the in-place resize path depends on them keeping the
    /// caller's data.
    pub(crate) unsafe fn take_chunk(
        &mut self,
        chunk: NonNull<Chunk>,
        words: i32,
        clear_words: Option<u32>,
    ) -> NonNull<Chunk> {
        let remainder = Chunk::payload_words(chunk) - words - TAG_WORDS as i32;

        if remainder >= MIN_CHUNK_SIZE {
            Chunk::set_size(chunk, words);

            let rest = self.arena.next_adjacent(chunk).unwrap();
            Chunk::set_size(rest, remainder);
            self.lists.insert(&self.arena, rest);
        }

        if let Some(count) = clear_words {
            Chunk::payload_of(chunk)
                .cast::<u32>()
                .as_ptr()
                .write_bytes(0, count as usize);
        }

        Chunk::set_size(chunk, -Chunk::payload_words(chunk));
        chunk
    }

    /// Flips a taken chunk back to free, coalesces it with both neighbors
    /// and threads the result into its free list.
    pub(crate) unsafe fn release_chunk(&mut self, chunk: NonNull<Chunk>) {
        Chunk::set_size(chunk, Chunk::payload_words(chunk));
        let merged = self.coalesce(chunk, Directions::Both);
        self.lists.insert(&self.arena, merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn setup(buf: &mut Vec<u32>) -> (Heap, *mut u32) {
        let base = buf.as_mut_ptr();
        let heap = Heap::new(
            NonNull::new_unchecked(base.cast()),
            buf.len() * WORD_SIZE,
            DEFAULT_POWER,
        )
        .unwrap();
        (heap, base)
    }

    unsafe fn word(base: *mut u32, index: usize) -> i32 {
        *base.add(index).cast::<i32>()
    }

    unsafe fn snapshot(base: *mut u32, len: usize) -> Vec<u32> {
        let mut words = Vec::with_capacity(len);
        for i in 0..len {
            words.push(*base.add(i));
        }
        words
    }

    #[test]
    fn rejects_bad_arenas_and_powers() {
        let mut buf = vec![0u32; 16];
        let base = buf.as_mut_ptr();

        unsafe {
            let ptr = NonNull::new_unchecked(base.cast::<u8>());
            let misaligned = NonNull::new_unchecked(base.cast::<u8>().add(1));

            assert_eq!(Heap::new(ptr, 12, 2).err(), Some(InitError::BufferTooSmall));
            assert_eq!(Heap::new(ptr, 18, 2).err(), Some(InitError::UnalignedBuffer));
            assert_eq!(
                Heap::new(misaligned, 16, 2).err(),
                Some(InitError::UnalignedBuffer),
            );
            assert_eq!(Heap::new(ptr, 16, 0).err(), Some(InitError::InvalidPower));
            assert_eq!(Heap::new(ptr, 16, 9).err(), Some(InitError::InvalidPower));
        }
    }

    #[test]
    fn init_writes_one_spanning_free_chunk() {
        let mut buf = vec![0u32; 128];

        unsafe {
            let (heap, base) = setup(&mut buf);

            assert_eq!(word(base, 0), 126);
            assert_eq!(word(base, 127), 126);

            // The chunk hangs off the head of its class, at offset 0, and
            // every other class is empty.
            let class = heap.lists.class_of(126);
            for i in 0..crate::freelist::LIST_CLASSES {
                let expected = if i == class { 0 } else { crate::chunk::NIL };
                assert_eq!(heap.lists.head(i), expected);
            }
        }
    }

    #[test]
    fn one_byte_allocation_takes_a_minimum_chunk() {
        let mut buf = vec![0u32; 8];

        unsafe {
            let (mut heap, base) = setup(&mut buf);

            let p = heap.allocate(1).unwrap();
            // Payload sits one word past the header.
            assert_eq!(p.as_ptr(), base.add(1).cast());

            assert_eq!(word(base, 0), -2);
            assert_eq!(word(base, 3), -2);
            assert_eq!(word(base, 4), 2);
            assert_eq!(word(base, 7), 2);
        }
    }

    #[test]
    fn unaligned_request_rounds_up_and_splits() {
        let mut buf = vec![0u32; 32];

        unsafe {
            let (mut heap, base) = setup(&mut buf);

            heap.allocate(10).unwrap();

            assert_eq!(word(base, 0), -3);
            assert_eq!(word(base, 4), -3);
            assert_eq!(word(base, 5), 25);
            assert_eq!(word(base, 31), 25);
        }
    }

    #[test]
    fn zero_allocate_clears_exactly_the_request() {
        let mut buf = vec![0u32; 32];

        unsafe {
            let (mut heap, base) = setup(&mut buf);

            // Dirty the arena first so the zeroing is observable.
            let p = heap.allocate(24).unwrap();
            p.cast::<u32>().as_ptr().write_bytes(0xAB, 6);
            heap.deallocate(Some(p));

            let q = heap.allocate_zeroed(1, 10).unwrap();
            assert_eq!(word(base, 0), -3);
            for i in 1..=3 {
                assert_eq!(word(base, i), 0);
            }
            assert_eq!(word(base, 4), -3);

            // Zeroing stops at the request: the next word is the split
            // remainder's header, untouched.
            assert_eq!(word(base, 5), 25);

            heap.deallocate(Some(q));

            // Overflowing products are refused outright.
            assert_eq!(heap.allocate_zeroed(usize::MAX, 2), None);
        }
    }

    #[test]
    fn release_coalesces_with_the_tail_chunk() {
        let mut buf = vec![0u32; 16];

        unsafe {
            let (mut heap, base) = setup(&mut buf);

            let p = heap.allocate(8).unwrap();
            assert_eq!(word(base, 0), -2);
            assert_eq!(word(base, 3), -2);
            assert_eq!(word(base, 4), 10);
            assert_eq!(word(base, 15), 10);

            heap.deallocate(Some(p));
            assert_eq!(word(base, 0), 14);
            assert_eq!(word(base, 15), 14);
        }
    }

    #[test]
    fn out_of_order_releases_coalesce_back_to_one_chunk() {
        let mut buf = vec![0u32; 20];

        unsafe {
            let (mut heap, base) = setup(&mut buf);

            let mut pointers = Vec::new();
            for _ in 0..5 {
                pointers.push(heap.allocate(8).unwrap());
            }

            for &i in &[0, 4, 1, 3, 2] {
                heap.deallocate(Some(pointers[i]));
            }

            assert_eq!(word(base, 0), 18);
            assert_eq!(word(base, 19), 18);
        }
    }

    #[test]
    fn allocate_and_release_round_trip_restores_the_arena() {
        let mut buf = vec![0u32; 64];

        unsafe {
            let (mut heap, base) = setup(&mut buf);

            // Dead payload words may keep residue from old splits, so the
            // comparison is structural: the spanning chunk and its list
            // linkage, not every word.
            for bytes in [1, 8, 51, 200] {
                let p = heap.allocate(bytes).unwrap();
                heap.deallocate(Some(p));

                assert_eq!(word(base, 0), 62, "request of {bytes} bytes");
                assert_eq!(word(base, 63), 62, "request of {bytes} bytes");
                assert_eq!(word(base, 1), crate::chunk::NIL as i32);
                assert_eq!(word(base, 2), crate::chunk::NIL as i32);
                assert_eq!(heap.lists.head(heap.lists.class_of(62)), 0);
            }
        }
    }

    #[test]
    fn failed_allocations_change_nothing() {
        let mut buf = vec![0u32; 16];

        unsafe {
            let (mut heap, base) = setup(&mut buf);
            let before = snapshot(base, 16);

            assert_eq!(heap.allocate(0), None);
            assert_eq!(heap.allocate(15 * WORD_SIZE), None);
            assert_eq!(heap.allocate(usize::MAX), None);

            assert_eq!(snapshot(base, 16), before);
        }
    }

    #[test]
    fn double_release_is_a_no_op() {
        let mut buf = vec![0u32; 16];

        unsafe {
            let (mut heap, base) = setup(&mut buf);

            let p = heap.allocate(8).unwrap();
            heap.deallocate(Some(p));
            let after_first = snapshot(base, 16);

            heap.deallocate(Some(p));
            assert_eq!(snapshot(base, 16), after_first);

            heap.deallocate(None);
            assert_eq!(snapshot(base, 16), after_first);
        }
    }

    #[test]
    fn corrupted_tags_make_release_back_off() {
        let mut buf = vec![0u32; 16];

        unsafe {
            let (mut heap, base) = setup(&mut buf);

            let p = heap.allocate(8).unwrap();
            // Smash the footer the way an overrun would.
            *base.add(3).cast::<i32>() = 99;

            heap.deallocate(Some(p));

            // Still marked taken; nothing was merged or relinked.
            assert_eq!(word(base, 0), -2);
            assert_eq!(word(base, 3), 99);
        }
    }
}

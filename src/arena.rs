use std::ptr::NonNull;

use crate::{
    chunk::{Chunk, NIL, WORD_SIZE},
    Pointer,
};

/// Word-indexed view of the caller's buffer. The arena never grows, shrinks
/// or moves; every chunk the engine knows about lives between `base` and
/// `base + words`.
///
/// Free-list links are 32-bit word offsets into this buffer rather than
/// machine pointers. That halves the link overhead on 64-bit targets and
/// makes the arena position-independent, so this struct is where the
/// offset world and the pointer world meet: [`Self::chunk_at`] and
/// [`Self::offset_of`] are the only two conversions, and everything above
/// this layer uses whichever form is convenient.
pub(crate) struct Arena {
    base: NonNull<u32>,
    bytes: usize,
}

impl Arena {
    /// Wraps the caller's buffer.
    ///
    /// # Safety
    ///
    /// `base` must be word-aligned, valid for reads and writes of `bytes`
    /// bytes, and must outlive the arena. The engine assumes exclusive
    /// access to the buffer except for payloads it has handed out.
    pub unsafe fn new(base: NonNull<u8>, bytes: usize) -> Self {
        Self {
            base: base.cast(),
            bytes,
        }
    }

    /// Number of whole words in the buffer.
    #[inline]
    pub fn words(&self) -> u32 {
        (self.bytes / WORD_SIZE) as u32
    }

    /// Resolves a word offset to the chunk whose header lives there. A nil
    /// offset resolves to no chunk.
    #[inline]
    pub unsafe fn chunk_at(&self, offset: u32) -> Pointer<Chunk> {
        if offset == NIL {
            return None;
        }
        Some(NonNull::new_unchecked(self.base.as_ptr().add(offset as usize)).cast())
    }

    /// Inverse of [`Self::chunk_at`]: the word offset of a chunk's header,
    /// or nil for no chunk.
    #[inline]
    pub unsafe fn offset_of(&self, chunk: Pointer<Chunk>) -> u32 {
        match chunk {
            None => NIL,
            Some(chunk) => {
                ((chunk.as_ptr() as usize - self.base.as_ptr() as usize) / WORD_SIZE) as u32
            }
        }
    }

    /// The chunk starting right after this one's footer, or no chunk if that
    /// position is at or past the end of the arena.
    #[inline]
    pub unsafe fn next_adjacent(&self, chunk: NonNull<Chunk>) -> Pointer<Chunk> {
        let next = Chunk::footer_of(chunk).add(1);
        let end = self.base.as_ptr().add(self.words() as usize);

        if next.cast::<u32>() >= end {
            return None;
        }
        Some(NonNull::new_unchecked(next.cast::<Chunk>()))
    }

    /// The chunk ending right before this one's header. The word preceding
    /// the header is the neighbor's footer, which tells us how far back the
    /// neighbor starts. No chunk if that word would sit before the arena.
    #[inline]
    pub unsafe fn prev_adjacent(&self, chunk: NonNull<Chunk>) -> Pointer<Chunk> {
        let prev_footer = chunk.as_ptr().cast::<i32>().sub(1);

        if prev_footer.cast::<u32>() < self.base.as_ptr() {
            return None;
        }
        Some(Chunk::from_footer(prev_footer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_and_chunks_convert_both_ways() {
        let mut words = [0u32; 16];
        let base = words.as_mut_ptr();

        unsafe {
            let arena = Arena::new(NonNull::new_unchecked(base.cast()), 16 * WORD_SIZE);
            assert_eq!(arena.words(), 16);

            assert_eq!(arena.chunk_at(NIL), None);
            assert_eq!(arena.offset_of(None), NIL);

            let chunk = arena.chunk_at(4).unwrap();
            assert_eq!(chunk.as_ptr().cast::<u32>(), base.add(4));
            assert_eq!(arena.offset_of(Some(chunk)), 4);
        }
    }

    #[test]
    fn adjacency_walks_stop_at_the_edges() {
        // Two chunks tiling a 12-word buffer: sizes 2 and 6.
        let mut words = [0u32; 12];
        let base = words.as_mut_ptr();

        unsafe {
            let arena = Arena::new(NonNull::new_unchecked(base.cast()), 12 * WORD_SIZE);

            let first = arena.chunk_at(0).unwrap();
            Chunk::set_size(first, 2);
            let second = arena.chunk_at(4).unwrap();
            Chunk::set_size(second, 6);

            assert_eq!(arena.next_adjacent(first), Some(second));
            assert_eq!(arena.prev_adjacent(second), Some(first));

            // The first chunk has nothing on its left, the last nothing on
            // its right.
            assert_eq!(arena.prev_adjacent(first), None);
            assert_eq!(arena.next_adjacent(second), None);
        }
    }
}

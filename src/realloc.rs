use std::ptr::NonNull;

use crate::{
    chunk::{self, Chunk, MIN_CHUNK_SIZE, TAG_WORDS},
    coalesce::Directions,
    heap::Heap,
    Pointer,
};

/// Copies `words` words from `src` to `dst`, where the two runs may overlap.
/// When the destination sits above the source the copy runs backwards so no
/// source word is overwritten before it has been read; same idea the other
/// way around. Equal addresses are a no-op.
pub(crate) unsafe fn transfer(dst: *mut u32, src: *const u32, words: usize) {
    if (src as usize) < (dst as usize) {
        for i in (0..words).rev() {
            *dst.add(i) = *src.add(i);
        }
    } else if (src as usize) > (dst as usize) {
        for i in 0..words {
            *dst.add(i) = *src.add(i);
        }
    }
}

impl Heap {
    /// Resizes a taken chunk to hold at least `bytes`, trying the cheapest
    /// strategy first:
    ///
    /// 1. The chunk is already big enough: hand it back unchanged. Shrinks
    ///    never split off the unused tail.
    /// 2. Folding in free chunks on the right reaches the requested size:
    ///    coalesce rightwards and re-take the chunk. The payload never
    ///    moves, so nothing is copied.
    /// 3. Folding in both directions reaches it: coalesce both ways,
    ///    re-take, then slide the payload to its new position. Only headers
    ///    and footers change during the merge, so the payload words are
    ///    still intact when the copy runs.
    /// 4. Otherwise allocate a fresh chunk, copy the payload over and
    ///    release the old one. If even that fails, the old chunk is left
    ///    untouched and no chunk is returned.
    ///
    /// # Safety
    ///
    /// `chunk` must be a valid taken chunk of this heap, and `bytes` must be
    /// a non-zero request no larger than [`chunk::MAX_REQUEST_BYTES`].
    pub(crate) unsafe fn reallocate_chunk(
        &mut self,
        chunk: NonNull<Chunk>,
        bytes: usize,
    ) -> Pointer<Chunk> {
        let words = chunk::words_for(bytes);

        // Case 1: shrink or equal.
        if Chunk::payload_words(chunk) >= words {
            return Some(chunk);
        }

        // The merge below rewrites tags around the payload, so remember
        // where the data is and how much of it there is.
        let src = Chunk::payload_of(chunk).cast::<u32>().as_ptr();
        let saved_words = Chunk::payload_words(chunk) as usize;

        // Case 2: growing into free space on the right keeps the payload
        // where it is. The probe counts tag words of the absorbed chunks as
        // future payload, minus the pair the merged chunk still needs.
        let mut reach = self.probe(chunk, Directions::Right) - TAG_WORDS;
        if reach >= words as u32 {
            Chunk::set_size(chunk, Chunk::payload_words(chunk));
            let merged = self.coalesce(chunk, Directions::Right);
            return Some(self.take_chunk(merged, words.max(MIN_CHUNK_SIZE), None));
        }

        // Case 3: count the left side too, without double counting the
        // chunk itself.
        reach += self.probe(chunk, Directions::Left) - Chunk::span_of(chunk);
        if reach >= words as u32 {
            Chunk::set_size(chunk, Chunk::payload_words(chunk));
            let merged = self.coalesce(chunk, Directions::Both);
            let taken = self.take_chunk(merged, words.max(MIN_CHUNK_SIZE), None);
            transfer(Chunk::payload_of(taken).cast::<u32>().as_ptr(), src, saved_words);
            return Some(taken);
        }

        // Case 4: relocate. A failed allocation leaves the old chunk alone.
        let fresh = self.reserve_chunk(bytes, false)?;
        transfer(Chunk::payload_of(fresh).cast::<u32>().as_ptr(), src, saved_words);
        self.release_chunk(chunk);
        Some(fresh)
    }
}

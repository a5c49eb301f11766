use std::ptr::NonNull;

use crate::{
    arena::Arena,
    chunk::{Chunk, NIL},
    Pointer,
};

/// Number of segregated size classes.
pub(crate) const LIST_CLASSES: usize = 8;

/// The set of segregated free lists, one doubly linked list of free chunks
/// per size class. A chunk of payload size `S` belongs to the smallest class
/// `i` with `S < 2^((i + 1) * power)`, or to the last class if none fits.
/// With the default power of 2 that makes the class upper bounds 4, 16, 64,
/// 256, 1024, 4096, 16384 and unbounded, in words.
///
/// The lists themselves live inside the free chunks: the first two payload
/// words of a free chunk hold the forward and backward offsets (see
/// [`Chunk`]), so the only storage here is one head offset per class. Since
/// we are the allocator, there is nowhere else the nodes could live anyway.
///
/// Each list is kept ordered by non-decreasing size. That ordering is what
/// turns the first-fit walk in [`Self::best_fit`] into a best-fit within the
/// class: the first chunk big enough is also the smallest one big enough.
pub(crate) struct FreeLists {
    /// Size-class base exponent.
    power: u32,
    /// Head offset per class, [`NIL`] when the class is empty.
    heads: [u32; LIST_CLASSES],
}

impl FreeLists {
    pub const fn new(power: u32) -> Self {
        Self {
            power,
            heads: [NIL; LIST_CLASSES],
        }
    }

    /// Size class for a chunk of the given header value. Works on taken
    /// chunks too by taking the absolute value.
    pub fn class_of(&self, size: i32) -> usize {
        let size = u64::from(size.unsigned_abs());
        for class in 0..LIST_CLASSES - 1 {
            // power <= 8 and class <= 6 keep the shift below 64 bits.
            if size < 1u64 << ((class as u32 + 1) * self.power) {
                return class;
            }
        }
        LIST_CLASSES - 1
    }

    /// Threads `chunk` into its class list, keeping the list ordered by
    /// non-decreasing size. Equal sizes land behind their equals, before the
    /// first strictly larger entry.
    ///
    /// # Safety
    ///
    /// `chunk` must be a valid free chunk in `arena` that is not currently
    /// in any list.
    pub unsafe fn insert(&mut self, arena: &Arena, chunk: NonNull<Chunk>) {
        let class = self.class_of(Chunk::header_of(chunk));
        let offset = arena.offset_of(Some(chunk));

        if self.heads[class] == NIL {
            self.heads[class] = offset;
            Chunk::set_next(chunk, NIL);
            Chunk::set_prev(chunk, NIL);
            return;
        }

        let mut current = arena.chunk_at(self.heads[class]);
        let mut previous: Pointer<Chunk> = None;

        while let Some(entry) = current {
            if Chunk::header_of(chunk) < Chunk::header_of(entry) {
                Chunk::set_next(chunk, arena.offset_of(Some(entry)));
                Chunk::set_prev(chunk, arena.offset_of(previous));
                Chunk::set_prev(entry, offset);
                match previous {
                    // New head.
                    None => self.heads[class] = offset,
                    Some(previous) => Chunk::set_next(previous, offset),
                }
                return;
            }

            previous = current;
            current = arena.chunk_at(Chunk::next_of(entry));
        }

        // Nothing bigger found, so this goes at the tail. The list is not
        // empty here, we checked the head above.
        let tail = previous.unwrap();
        Chunk::set_next(tail, offset);
        Chunk::set_prev(chunk, arena.offset_of(Some(tail)));
        Chunk::set_next(chunk, NIL);
    }

    /// Unthreads `chunk` from its class list. The four cases (sole entry,
    /// head, tail, middle) each relink a different pair of neighbors.
    ///
    /// # Safety
    ///
    /// `chunk` must be a free chunk currently threaded into the list of its
    /// class, with its size unchanged since insertion.
    pub unsafe fn remove(&mut self, arena: &Arena, chunk: NonNull<Chunk>) {
        let class = self.class_of(Chunk::header_of(chunk));
        let previous = arena.chunk_at(Chunk::prev_of(chunk));
        let next = arena.chunk_at(Chunk::next_of(chunk));

        match (previous, next) {
            (None, None) => self.heads[class] = NIL,
            (None, Some(next)) => {
                self.heads[class] = Chunk::next_of(chunk);
                Chunk::set_prev(next, NIL);
            }
            (Some(previous), None) => Chunk::set_next(previous, NIL),
            (Some(previous), Some(next)) => {
                Chunk::set_next(previous, Chunk::next_of(chunk));
                Chunk::set_prev(next, Chunk::prev_of(chunk));
            }
        }
    }

    /// Best-fit search for a free chunk of at least `size` payload words.
    ///
    /// Starts at the class `size` maps to and walks each list from the head;
    /// because every list is size-ordered, the first entry that fits is the
    /// smallest fit in that class. Classes above are only consulted when the
    /// starting class has nothing big enough.
    pub unsafe fn best_fit(&self, arena: &Arena, size: i32) -> Pointer<Chunk> {
        for class in self.class_of(size)..LIST_CLASSES {
            let mut current = arena.chunk_at(self.heads[class]);

            while let Some(entry) = current {
                if Chunk::header_of(entry) >= size {
                    return Some(entry);
                }
                current = arena.chunk_at(Chunk::next_of(entry));
            }
        }

        None
    }

    /// Head offset of one class. Only used for testing.
    #[cfg(test)]
    pub fn head(&self, class: usize) -> u32 {
        self.heads[class]
    }
}

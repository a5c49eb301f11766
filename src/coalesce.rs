use std::ptr::NonNull;

use crate::{
    chunk::{Chunk, TAG_WORDS},
    heap::Heap,
    Pointer,
};

/// Which neighbors a coalesce or probe is allowed to look at.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Directions {
    Left,
    Right,
    Both,
}

impl Directions {
    #[inline]
    fn left(self) -> bool {
        matches!(self, Self::Left | Self::Both)
    }

    #[inline]
    fn right(self) -> bool {
        matches!(self, Self::Right | Self::Both)
    }
}

/// Absorbs `right` into `left`. The two chunks must be adjacent, free, and
/// already out of their free lists. One header/footer pair sits between
/// them and is reclaimed as payload, hence the extra two words.
///
/// ```text
/// +--------+---------+--------+---------+      +--------+------------------+
/// | size a | payload | size b | payload |  ->  | size a + b + 2 | payload  |
/// +--------+---------+--------+---------+      +--------+------------------+
/// ```
///
/// The merged chunk keeps the left operand's position.
unsafe fn join(left: NonNull<Chunk>, right: NonNull<Chunk>) -> NonNull<Chunk> {
    let size = Chunk::header_of(left) + Chunk::header_of(right) + TAG_WORDS as i32;
    Chunk::set_size(left, size);
    left
}

impl Heap {
    /// Merges `chunk` with every adjacent free neighbor in the given
    /// directions, unlinking each neighbor as it is absorbed. Right
    /// neighbors are folded in first, then left ones, walking outward until
    /// a taken chunk or the arena edge stops the run.
    ///
    /// On return the merged chunk is free, carries matching tags, is in no
    /// free list, and has no free neighbor in the requested directions.
    ///
    /// # Safety
    ///
    /// `chunk` must be a valid free chunk that is not in any free list.
    pub(crate) unsafe fn coalesce(
        &mut self,
        mut chunk: NonNull<Chunk>,
        directions: Directions,
    ) -> NonNull<Chunk> {
        if directions.right() {
            while let Some(right) = self.neighbor_if_free(self.arena.next_adjacent(chunk)) {
                self.lists.remove(&self.arena, right);
                chunk = join(chunk, right);
            }
        }

        if directions.left() {
            while let Some(left) = self.neighbor_if_free(self.arena.prev_adjacent(chunk)) {
                self.lists.remove(&self.arena, left);
                chunk = join(left, chunk);
            }
        }

        chunk
    }

    /// Measures what [`Self::coalesce`] would produce without touching
    /// anything: the total span in words of `chunk` plus every adjacent free
    /// neighbor in the given directions. The walk visits exactly the chunks
    /// the destructive merge would absorb.
    pub(crate) unsafe fn probe(&self, chunk: NonNull<Chunk>, directions: Directions) -> u32 {
        let mut span = Chunk::span_of(chunk);

        if directions.right() {
            let mut right = self.neighbor_if_free(self.arena.next_adjacent(chunk));
            while let Some(neighbor) = right {
                span += Chunk::span_of(neighbor);
                right = self.neighbor_if_free(self.arena.next_adjacent(neighbor));
            }
        }

        if directions.left() {
            let mut left = self.neighbor_if_free(self.arena.prev_adjacent(chunk));
            while let Some(neighbor) = left {
                span += Chunk::span_of(neighbor);
                left = self.neighbor_if_free(self.arena.prev_adjacent(neighbor));
            }
        }

        span
    }

    #[inline]
    unsafe fn neighbor_if_free(&self, neighbor: Pointer<Chunk>) -> Pointer<Chunk> {
        match neighbor {
            Some(chunk) if Chunk::is_free(chunk) => Some(chunk),
            _ => None,
        }
    }
}

use std::{mem, ptr::NonNull};

/// Word index into the arena that means "no chunk". Free-list links and list
/// heads use this instead of a null pointer.
pub(crate) const NIL: u32 = 0xFFFF_FFFF;

/// Accounting unit of the whole engine: one 32-bit word.
pub(crate) const WORD_SIZE: usize = mem::size_of::<u32>();

/// Words spent on the header/footer pair of every chunk.
pub(crate) const TAG_WORDS: u32 = 2;

/// Minimum payload size in words. A free chunk stores its forward and
/// backward links in the first two payload words, so nothing smaller can
/// ever be threaded into a free list.
pub(crate) const MIN_CHUNK_SIZE: i32 = 2;

/// Largest request the engine accepts, in bytes. The chunk size is a signed
/// 32-bit word whose sign encodes taken/free, which caps a single chunk at
/// `2^31 - 1` words.
pub(crate) const MAX_REQUEST_BYTES: u64 = i32::MAX as u64 * WORD_SIZE as u64;

/// A chunk as it sits in the arena. All of the engine's metadata is in-band:
///
/// ```text
///  -4   +=====================================+
///       | Header: chunk size, sign is status  |
///  +0   +-------------------------------------+  <- payload starts here
///       | Forward link (only while free)      |
///  +4   +-------------------------------------+
///       | Backward link (only while free)     |
///  +8   +-------------------------------------+
///       | ...                                 |
///  +N   +-------------------------------------+  <- payload ends here
///       | Footer: must match header           |
///  +N+4 +=====================================+
/// ```
///
/// The size stored in the header counts payload words only; the total span
/// of a chunk is `size + 2` words. A positive header means the chunk is
/// free, a negative one means it is taken, and the footer always mirrors
/// the header so that corruption can be detected and the left neighbor can
/// be found by reading one word backwards.
///
/// The struct covers the header and the two link words. Everything past
/// `prev` is payload that this type never names, which is the point: a
/// taken chunk's payload belongs to the caller, and the engine only ever
/// touches the words it can reach through this header.
#[repr(C)]
pub(crate) struct Chunk {
    /// Header word. Absolute value is the payload size in words.
    pub size: i32,
    /// Offset of the next free chunk in the same class list, or [`NIL`].
    pub next: u32,
    /// Offset of the previous free chunk in the same class list, or [`NIL`].
    pub prev: u32,
}

/// Rounds a byte request up to whole words.
///
/// Callers must have rejected requests above [`MAX_REQUEST_BYTES`] first so
/// the result fits the signed header word.
#[inline]
pub(crate) fn words_for(bytes: usize) -> i32 {
    debug_assert!(bytes as u64 <= MAX_REQUEST_BYTES);
    ((bytes as u64 + 3) >> 2) as i32
}

/// All chunk accessors are associated functions taking [`NonNull<Chunk>`]
/// instead of methods on `&self`. Creating references into arena memory that
/// the caller also holds pointers to is exactly the kind of aliasing we want
/// to avoid, so every read and write goes through the raw pointer.
impl Chunk {
    /// Reads the header word.
    #[inline]
    pub unsafe fn header_of(chunk: NonNull<Chunk>) -> i32 {
        (*chunk.as_ptr()).size
    }

    /// Payload size in words regardless of taken/free status.
    #[inline]
    pub unsafe fn payload_words(chunk: NonNull<Chunk>) -> i32 {
        Self::header_of(chunk).unsigned_abs() as i32
    }

    /// Total words occupied by the chunk, tags included.
    #[inline]
    pub unsafe fn span_of(chunk: NonNull<Chunk>) -> u32 {
        Self::header_of(chunk).unsigned_abs() + TAG_WORDS
    }

    /// Whether the chunk is on loan to a free list rather than the caller.
    #[inline]
    pub unsafe fn is_free(chunk: NonNull<Chunk>) -> bool {
        Self::header_of(chunk) > 0
    }

    /// Address of the footer word. Derived from the current header, so the
    /// header must be valid when this is called.
    #[inline]
    pub unsafe fn footer_of(chunk: NonNull<Chunk>) -> *mut i32 {
        let size = Self::header_of(chunk).unsigned_abs() as usize;
        chunk.as_ptr().cast::<i32>().add(1 + size)
    }

    /// Writes the header and the matching footer in one go. This is the only
    /// way sizes are ever written; a lone header write would break the
    /// header-equals-footer invariant that `from_footer` and the corruption
    /// checks rely on.
    #[inline]
    pub unsafe fn set_size(chunk: NonNull<Chunk>, size: i32) {
        (*chunk.as_ptr()).size = size;
        *Self::footer_of(chunk) = size;
    }

    /// Recovers a chunk from the address of its footer word.
    #[inline]
    pub unsafe fn from_footer(footer: *mut i32) -> NonNull<Chunk> {
        let size = (*footer).unsigned_abs() as usize;
        NonNull::new_unchecked(footer.sub(1 + size).cast::<Chunk>())
    }

    /// Address handed to the caller for a taken chunk: payload word 0, one
    /// word past the header.
    #[inline]
    pub unsafe fn payload_of(chunk: NonNull<Chunk>) -> NonNull<u8> {
        NonNull::new_unchecked(chunk.as_ptr().cast::<u32>().add(1)).cast()
    }

    /// Inverse of [`Self::payload_of`]. The caller must pass an address that
    /// was previously produced by `payload_of` on the same arena, otherwise
    /// the header read through the result is garbage.
    #[inline]
    pub unsafe fn from_payload(address: NonNull<u8>) -> NonNull<Chunk> {
        NonNull::new_unchecked(address.as_ptr().cast::<u32>().sub(1).cast::<Chunk>())
    }

    /// Forward link of a free chunk.
    #[inline]
    pub unsafe fn next_of(chunk: NonNull<Chunk>) -> u32 {
        (*chunk.as_ptr()).next
    }

    /// Backward link of a free chunk.
    #[inline]
    pub unsafe fn prev_of(chunk: NonNull<Chunk>) -> u32 {
        (*chunk.as_ptr()).prev
    }

    #[inline]
    pub unsafe fn set_next(chunk: NonNull<Chunk>, offset: u32) {
        (*chunk.as_ptr()).next = offset;
    }

    #[inline]
    pub unsafe fn set_prev(chunk: NonNull<Chunk>, offset: u32) {
        (*chunk.as_ptr()).prev = offset;
    }

    /// Sanity check on a chunk recovered from a caller pointer: the footer
    /// must still mirror the header. A mismatch means the caller wrote past
    /// its payload or handed us a pointer we never produced.
    #[inline]
    pub unsafe fn metadata_matches(chunk: NonNull<Chunk>) -> bool {
        Self::header_of(chunk) == *Self::footer_of(chunk)
    }
}

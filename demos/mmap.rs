use std::ptr::NonNull;

use tagalloc::{Heap, DEFAULT_POWER};

const ARENA_BYTES: usize = 1024 * 1024;

/// Arena acquisition is the caller's business. Here the caller asks the
/// kernel for an anonymous mapping and hands it over.
unsafe fn acquire_arena() -> NonNull<u8> {
    let address = libc::mmap(
        std::ptr::null_mut(),
        ARENA_BYTES,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );

    assert_ne!(address, libc::MAP_FAILED, "mmap failed");
    NonNull::new(address.cast::<u8>()).unwrap()
}

fn main() {
    unsafe {
        let base = acquire_arena();
        let mut heap = Heap::new(base, ARENA_BYTES, DEFAULT_POWER).unwrap();

        let sizes = [24, 512, 4096, 100_000];
        let mut pointers = Vec::new();
        for &size in &sizes {
            let address = heap.allocate(size).unwrap();
            println!("{size} bytes at {:?}", address.as_ptr());
            pointers.push(address);
        }

        for address in pointers {
            heap.deallocate(Some(address));
        }

        // The heap never unmaps anything; the arena goes back to the kernel
        // only because its owner says so.
        libc::munmap(base.as_ptr().cast(), ARENA_BYTES);
    }
}

use std::ptr::NonNull;

use tagalloc::{Heap, DEFAULT_POWER};

fn print_alloc(size: usize, addr: NonNull<u8>) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {:?}", addr.as_ptr());
}

fn main() {
    // The caller owns the arena; the heap only organizes it.
    let mut arena = vec![0u32; 4096];
    let base = NonNull::new(arena.as_mut_ptr().cast::<u8>()).unwrap();

    unsafe {
        let mut heap = Heap::new(base, arena.len() * 4, DEFAULT_POWER).unwrap();

        let addr1 = heap.allocate(1).unwrap();
        print_alloc(1, addr1);

        let addr2 = heap.allocate(1024).unwrap();
        print_alloc(1024, addr2);

        let addr3 = heap.allocate_zeroed(256, 4).unwrap();
        print_alloc(1024, addr3);

        println!("Growing the second allocation...");
        let addr2 = heap.reallocate(Some(addr2), 2048).unwrap();
        print_alloc(2048, addr2);

        println!("Releasing everything...");
        heap.deallocate(Some(addr1));
        heap.deallocate(Some(addr2));
        heap.deallocate(Some(addr3));

        // With every pointer released the arena is one spanning free chunk
        // again, visible right there in the caller's own buffer.
        println!(
            "First word of the arena: {} (word count minus tags is {})",
            arena.as_ptr().cast::<i32>().read(),
            arena.len() - 2,
        );
    }
}

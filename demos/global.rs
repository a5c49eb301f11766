use tagalloc::Tagalloc;

// A quarter MiB arena baked into the binary serves every allocation the
// program makes, std's included. The heap inside is built lazily on the
// first allocation, so nothing has to run before main.
#[global_allocator]
static ALLOCATOR: Tagalloc<{ 256 * 1024 }> = Tagalloc::new();

fn main() {
    let num = Box::new(10);
    println!("Boxed num {num} at {:?}", &*num as *const i32);

    let mut vec = Vec::with_capacity(*num as usize);
    for i in 0..*num {
        vec.push(i);
    }
    println!("Vec: {vec:?} at {:?}", vec.as_ptr());

    let handle = std::thread::spawn(|| {
        let mut vec: Vec<u8> = Vec::with_capacity(256);
        vec.push(5);
        vec.push(6);
        println!("Second thread Vec: {vec:?} at {:?}", vec.as_ptr());
    });

    handle.join().unwrap();

    let message = String::from("every byte of this string lives in the arena");
    println!("{message}");
}

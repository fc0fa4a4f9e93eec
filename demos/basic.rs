use memarena::MemArena;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let allocator = MemArena::new();

    unsafe {
        let addr1 = allocator.alloc(8);
        log_alloc(addr1, 8);

        let addr2 = allocator.alloc(1024);
        log_alloc(addr2, 1024);

        let addr3 = allocator.alloc(4096);
        log_alloc(addr3, 4096);

        // Fill the middle region and read a couple of bytes back.
        for i in 0..1024 {
            addr2.add(i).write((i % 256) as u8);
        }
        println!("First byte: {}, last byte: {}", addr2.read(), addr2.add(1023).read());

        println!("Deallocating everything...");
        allocator.free(addr1);
        allocator.free(addr2);
        allocator.free(addr3);
    }
}

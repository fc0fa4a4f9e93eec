//! Runs the allocator as the process-wide global allocator: every `Box`,
//! `Vec` and `String` in this binary, the test harness included, goes
//! through it.

use std::thread;

use memarena::MemArena;

#[global_allocator]
static ALLOCATOR: MemArena = MemArena::new();

#[test]
fn boxes_vectors_and_strings() {
    let val = Box::new(22);
    assert_eq!(*val, 22);

    let mut v = Vec::new();
    for i in 0..5 {
        v.push(i * 10);
    }
    assert_eq!(v, [0, 10, 20, 30, 40]);

    let msg = String::from("Heap Testing");
    assert_eq!(msg, "Heap Testing");
}

#[test]
fn growing_collections_reallocate() {
    let mut v: Vec<u64> = Vec::new();
    for i in 0..10_000 {
        v.push(i);
    }

    assert_eq!(v.len(), 10_000);
    for (i, val) in v.iter().enumerate() {
        assert_eq!(*val, i as u64);
    }
}

#[test]
fn threads_share_the_allocator() {
    let handles: Vec<_> = (0..8)
        .map(|n| {
            thread::spawn(move || {
                let data: Vec<usize> = (0..1000).map(|i| i * n).collect();
                data.iter().sum::<usize>()
            })
        })
        .collect();

    for (n, handle) in handles.into_iter().enumerate() {
        let expected: usize = (0..1000).map(|i| i * n).sum();
        assert_eq!(handle.join().unwrap(), expected);
    }
}

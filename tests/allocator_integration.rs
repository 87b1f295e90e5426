use std::sync::Arc;

use slabkit::{AllocConfig, Allocator, GlobalAllocator};

fn small_config() -> AllocConfig {
    AllocConfig {
        chunk_size_log2: 16,
        blocks_per_chunk_log2: 3,
        cache_slots: 2,
        arena_count: 4,
        initialize_on_alloc: false,
        enable_big_blocks: true,
    }
}

#[test]
fn allocator_instances_are_independent() {
    let a = Allocator::new(small_config());
    let b = Allocator::new(small_config());

    let pa = a.alloc(32, 8).unwrap();
    let pb = b.alloc(32, 8).unwrap();
    assert_eq!(a.leak_count(), 1);
    assert_eq!(b.leak_count(), 1);

    unsafe {
        a.free(pa);
        b.free(pb);
    }
    assert_eq!(a.leak_count(), 0);
    assert_eq!(b.leak_count(), 0);
}

#[test]
fn chunk_cache_reuses_retired_chunks() {
    let a = Allocator::new(small_config());
    let block = a.alloc(1024, 8).unwrap();
    unsafe { a.free(block) };

    // A second round of the same allocation pattern should succeed without
    // the allocator needing to go back to the system for every chunk.
    let again = a.alloc(1024, 8).unwrap();
    unsafe { a.free(again) };
    assert_eq!(a.leak_count(), 0);
}

#[test]
fn contended_arenas_serve_many_threads_without_leaking() {
    let a = Arc::new(Allocator::new(small_config()));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let a = Arc::clone(&a);
        handles.push(std::thread::spawn(move || {
            let mut ptrs = Vec::new();
            for i in 0..300 {
                let size = 16 + (i % 7) * 8;
                ptrs.push(a.alloc(size, 8).unwrap());
            }
            for ptr in ptrs {
                unsafe { a.free(ptr) };
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(a.leak_count(), 0);
}

#[test]
fn realloc_growing_past_the_block_falls_back_to_copy() {
    let a = Allocator::new(small_config());
    let ptr = a.alloc(16, 8).unwrap();
    unsafe {
        std::ptr::write_bytes(ptr.as_ptr(), 0xAB, 16);
        let grown = a.realloc2(ptr, 16, 1 << 20, 8).unwrap();
        for byte in std::slice::from_raw_parts(grown.as_ptr(), 16) {
            assert_eq!(*byte, 0xAB);
        }
        a.free(grown);
    }
    assert_eq!(a.leak_count(), 0);
}

// Not installed via `#[global_allocator]` here (only one can be active per
// binary, and the test harness already has its own); this exercises the
// `GlobalAlloc` impl directly instead.
#[test]
fn global_allocator_handles_ordinary_vec_growth() {
    use core::alloc::{GlobalAlloc, Layout};

    let ga = GlobalAllocator;
    unsafe {
        let layout = Layout::array::<u64>(256).unwrap();
        let ptr = ga.alloc_zeroed(layout);
        assert!(!ptr.is_null());
        for i in 0..256 {
            assert_eq!(*(ptr as *const u64).add(i), 0);
        }
        ga.dealloc(ptr, layout);
    }
}

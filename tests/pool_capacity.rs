//! Creating far more threads than the pool has heaps never drives the number
//! of outstanding heap assignments past the pool's capacity.

#![cfg(not(target_vendor = "apple"))]

mod common;

use std::alloc::Layout;
use std::ffi::c_void;
use std::ptr;

use rsttlab::main_heap;

const THREADS: usize = 50;
const ROUNDS: usize = 1000;

/// Small sizes spread over many classes: powers of two from 8 to 4096 plus
/// odd sizes in between.
fn size_for(seed: usize, round: usize) -> usize {
    if round % 2 == 0 {
        8 << ((seed + round) % 10)
    } else {
        1 + (seed * 31 + round * 37) % 2000
    }
}

unsafe extern "C-unwind" fn churn(arg: *mut c_void) -> *mut c_void {
    let seed = arg.addr();
    let mut completed = 0usize;
    for round in 0..ROUNDS {
        let size = size_for(seed, round);
        let layout = Layout::from_size_align(size, 8).unwrap();
        let done = rsttlab::with_tlab(|tlab| {
            let block = tlab.allocate(layout)?;
            unsafe {
                block.as_ptr().write_bytes(seed as u8, size);
                tlab.free(block, layout);
            }
            Ok::<(), rsttlab::Error>(())
        });
        if matches!(done, Ok(Ok(()))) {
            completed += 1;
        }
    }
    ptr::without_provenance_mut(completed)
}

#[test]
fn test_outstanding_bounded_by_capacity() {
    let threads: Vec<_> = (0..THREADS)
        .map(|seed| common::spawn(churn, ptr::without_provenance_mut(seed)))
        .collect();
    for thread in threads {
        assert_eq!(common::join(thread).addr(), ROUNDS);
    }

    let stats = main_heap::default_pool().stats();
    assert!(stats.peak_outstanding <= stats.capacity);
    assert_eq!(stats.outstanding, 0);
    assert_eq!(stats.acquires, THREADS as u64);
    assert_eq!(stats.releases, THREADS as u64);
}

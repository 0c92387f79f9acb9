//! Many threads allocating through their own TLABs, created both by std and
//! through the create shim.

use std::sync::mpsc;
#[cfg(not(target_vendor = "apple"))]
use std::{ffi::c_void, mem::MaybeUninit, ptr};

use rsttlab::Rsttlab;

#[global_allocator]
static GLOBAL: Rsttlab = Rsttlab;

#[test]
fn test_std_threads_allocate() {
    let iterations = 1000;

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            std::thread::spawn(move || {
                let mut vecs: Vec<Vec<u64>> = Vec::new();
                for i in 0..iterations {
                    vecs.push((0..50).map(|x| x + t * iterations + i).collect());
                    if vecs.len() > 10 {
                        vecs.remove(0);
                    }
                }
                // Threads std creates skip the trampoline, so retire explicitly.
                drop(vecs);
                rsttlab::exit_routine();
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn test_cross_thread_free() {
    let num_threads = 4;
    let items_per_thread = 500;

    let (tx, rx) = mpsc::channel::<Vec<Box<[u8; 64]>>>();
    let producers: Vec<_> = (0..num_threads)
        .map(|_| {
            let tx = tx.clone();
            std::thread::spawn(move || {
                let items = (0..items_per_thread)
                    .map(|i| {
                        let mut arr = [0u8; 64];
                        arr[0] = (i & 0xFF) as u8;
                        Box::new(arr)
                    })
                    .collect();
                tx.send(items).unwrap();
            })
        })
        .collect();
    drop(tx);

    // Blocks allocated on the producers land in this thread's TLAB.
    let total: usize = rx.into_iter().map(|items| items.len()).sum();
    for p in producers {
        p.join().unwrap();
    }

    assert_eq!(total, num_threads * items_per_thread);
}

#[cfg(not(target_vendor = "apple"))]
unsafe extern "C-unwind" fn churn(arg: *mut c_void) -> *mut c_void {
    let seed = arg.addr();
    let mut boxes: Vec<Box<dyn std::any::Any>> = Vec::new();
    for i in 0..200 {
        match (seed + i) % 4 {
            0 => boxes.push(Box::new([0u8; 8])),
            1 => boxes.push(Box::new([0u8; 512])),
            2 => boxes.push(Box::new([0u8; 4096])),
            _ => boxes.push(Box::new(vec![0u8; 16384])),
        }
        if boxes.len() > 50 {
            boxes.drain(..25);
        }
    }
    ptr::without_provenance_mut(boxes.len())
}

#[test]
#[cfg(not(target_vendor = "apple"))]
fn test_shim_threads_allocate() {
    let threads: Vec<libc::pthread_t> = (0..6)
        .map(|seed| {
            let mut thread = MaybeUninit::uninit();
            let rc = unsafe {
                rsttlab::shim::pthread_create(
                    thread.as_mut_ptr(),
                    ptr::null(),
                    churn,
                    ptr::without_provenance_mut(seed),
                )
            };
            assert_eq!(rc, 0);
            unsafe { thread.assume_init() }
        })
        .collect();

    for thread in threads {
        let mut result = ptr::null_mut();
        assert_eq!(unsafe { libc::pthread_join(thread, &mut result) }, 0);
        assert!(result.addr() > 0);
    }
}

use dma_pool::{DmaContext, FreeListError, PoolConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn no_buffer_is_held_twice() {
    const THREADS: usize = 8;
    const CYCLES: usize = 5_000;
    const BUFFERS: usize = 12;

    let ctx = DmaContext::heap();
    let pool = Arc::new(ctx.create_pool(&PoolConfig::new("shared", 256, BUFFERS)).unwrap());
    let in_use: Arc<Vec<AtomicBool>> = Arc::new((0..BUFFERS).map(|_| AtomicBool::new(false)).collect());
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for cycle in 0..CYCLES {
                    let buf = pool.allocate().unwrap();
                    let idx = pool.buffer_index(buf.virt());
                    assert!(
                        !in_use[idx].swap(true, Ordering::SeqCst),
                        "buffer {idx} handed out twice"
                    );

                    // SAFETY: the marker above proves exclusive use.
                    let bytes = unsafe { buf.as_mut_slice() };
                    #[allow(clippy::cast_possible_truncation)]
                    let stamp = (t * 31 + cycle) as u8;
                    bytes.fill(stamp);
                    assert!(bytes.iter().all(|&b| b == stamp));

                    in_use[idx].store(false, Ordering::SeqCst);
                    pool.free(buf.virt()).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(pool.available(), BUFFERS);
    assert!(in_use.iter().all(|m| !m.load(Ordering::SeqCst)));
}

#[test]
fn exhaustion_under_contention_is_recoverable() {
    const THREADS: usize = 6;
    const BUFFERS: usize = 4;

    let ctx = DmaContext::heap();
    let pool = Arc::new(ctx.create_pool(&PoolConfig::new("tight", 64, BUFFERS)).unwrap());
    let exhausted = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let exhausted = Arc::clone(&exhausted);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..2_000 {
                    match pool.allocate() {
                        Ok(buf) => {
                            thread::yield_now();
                            pool.free(buf.virt()).unwrap();
                        }
                        Err(FreeListError::Exhausted) => {
                            exhausted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => panic!("unexpected {err}"),
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    // every buffer came back, whatever the interleaving
    assert_eq!(pool.available(), BUFFERS);
    let all: Vec<_> = (0..BUFFERS).map(|_| pool.allocate().unwrap()).collect();
    assert_eq!(all.len(), BUFFERS);
}

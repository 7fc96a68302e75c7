use dma_sync::SpinGate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn guard_reopens_on_drop() {
    let gate = SpinGate::new(0_u32);

    {
        let mut g = gate.lock();
        *g = 41;
    }

    // previous guard must have reopened the gate
    let mut g = gate.lock();
    *g += 1;
    assert_eq!(*g, 42);
}

#[test]
fn try_lock_fails_while_held() {
    let gate = SpinGate::new(7u8);

    let g1 = gate.try_lock();
    assert_eq!(g1.as_deref().copied(), Some(7));
    assert!(gate.try_lock().is_none());

    drop(g1);
    assert!(gate.try_lock().is_some());
}

#[test]
fn with_lock_returns_closure_result() {
    let gate = SpinGate::new(Vec::<u64>::new());
    let len = gate.with_lock(|v| {
        v.extend([0x1000, 0x2000]);
        v.len()
    });
    assert_eq!(len, 2);
    assert!(!gate.is_closed());
    assert_eq!(gate.with_lock(|v| v.pop()), Some(0x2000));
}

#[test]
fn get_mut_bypasses_the_gate() {
    let mut gate = SpinGate::new(vec![1, 2, 3]);
    gate.get_mut().push(4);
    assert_eq!(gate.lock().as_slice(), &[1, 2, 3, 4]);
}

/// Emulates a free list: every thread takes a slot out and puts it back,
/// with a counter that trips if two threads are ever inside at once.
#[test]
fn contended_stack_stays_consistent() {
    const THREADS: usize = 8;
    const ITERS: usize = 5_000;
    const SLOTS: usize = 4;

    let gate = Arc::new(SpinGate::new((0..SLOTS).collect::<Vec<_>>()));
    let inside = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let inside = Arc::clone(&inside);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..ITERS {
                    let slot = gate.with_lock(|stack| {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "gate breached");
                        let slot = stack.pop();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        slot
                    });
                    if let Some(slot) = slot {
                        gate.with_lock(|stack| stack.push(slot));
                    }
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let mut slots = gate.with_lock(|stack| stack.clone());
    slots.sort_unstable();
    assert_eq!(slots, (0..SLOTS).collect::<Vec<_>>());
    assert_eq!(inside.load(Ordering::SeqCst), 0);
}

#[test]
fn gate_reopens_after_panic() {
    let gate = SpinGate::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        gate.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");
    assert_eq!(gate.with_lock(|v| *v), 123);
}

#[test]
fn gate_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    takes_sync(&SpinGate::new(0u8));
}

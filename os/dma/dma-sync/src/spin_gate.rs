use core::{
    cell::UnsafeCell,
    fmt,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// Busy-wait mutual exclusion around a value of type `T`.
///
/// Acquisition is test-and-test-and-set: a failed compare-exchange spins on a
/// relaxed load until the gate looks open, then retries. Acquire on entry and
/// Release on exit order everything done inside the gate before the next
/// holder's view of it.
///
/// Meant for critical sections of a few instructions. Nothing here is fair;
/// a waiter can starve under sustained contention.
pub struct SpinGate<T> {
    /// * `false`: open
    /// * `true`: held
    closed: AtomicBool,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SpinGate<T> {}

impl<T> SpinGate<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            closed: AtomicBool::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    #[inline]
    fn try_close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Single attempt; `None` if someone else holds the gate.
    #[inline]
    pub fn try_lock(&self) -> Option<GateGuard<'_, T>> {
        self.try_close().then_some(GateGuard { gate: self })
    }

    /// Spin until the gate is ours.
    #[inline]
    pub fn lock(&self) -> GateGuard<'_, T> {
        while !self.try_close() {
            while self.closed.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        GateGuard { gate: self }
    }

    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Snapshot of the gate state. Stale by the time it is read; for
    /// diagnostics only.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

impl<T: Default> Default for SpinGate<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SpinGate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinGate")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Proof of holding a [`SpinGate`]; reopens it on drop.
#[must_use = "the gate reopens as soon as the guard is dropped"]
pub struct GateGuard<'a, T> {
    gate: &'a SpinGate<T>,
}

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.gate.inner.get() }
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.gate.inner.get() }
    }
}

impl<T> Drop for GateGuard<'_, T> {
    fn drop(&mut self) {
        self.gate.closed.store(false, Ordering::Release);
    }
}

//! Shared counters used to detect the end of a fan-out and to bound open files.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set once a fatal error occurs; tasks stop starting new work after that.
#[derive(Debug, Clone, Default)]
pub struct HaltFlag(Arc<AtomicBool>);

impl HaltFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn halt(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counts in-flight units of work and wakes waiters when the count reaches zero.
///
/// The count must be raised *before* a unit is handed to another thread, so it
/// can only reach zero once no unit exists that could start more work.
#[derive(Debug)]
pub struct WorkCounter {
    count: Mutex<usize>,
    idle: Condvar,
}

impl WorkCounter {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            idle: Condvar::new(),
        }
    }

    pub fn increment(&self) {
        *lock(&self.count) += 1;
    }

    /// Marks one unit finished. Returns `true` for the call that reached zero.
    pub fn decrement(&self) -> bool {
        let mut count = lock(&self.count);
        debug_assert!(*count > 0, "work counter decremented below zero");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
            true
        } else {
            false
        }
    }

    pub fn outstanding(&self) -> usize {
        *lock(&self.count)
    }

    /// Blocks until the count is zero
    pub fn wait_idle(&self) {
        let mut count = lock(&self.count);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Raises the count and returns a guard that lowers it again when dropped.
    pub fn track(self: &Arc<Self>) -> WorkGuard {
        self.increment();
        WorkGuard {
            counter: Arc::clone(self),
        }
    }
}

/// Decrements its [`WorkCounter`] on drop
#[derive(Debug)]
pub struct WorkGuard {
    counter: Arc<WorkCounter>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}

/// Fixed-capacity pool of permits bounding simultaneously open files.
#[derive(Debug)]
pub struct PermitPool {
    capacity: usize,
    available: Mutex<usize>,
    released: Condvar,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
}

impl PermitPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: Mutex::new(capacity),
            released: Condvar::new(),
            in_use: AtomicUsize::new(0),
            peak_in_use: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks until a permit is free. The permit returns to the pool when dropped.
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut available = lock(&self.available);
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        drop(available);

        self.record_acquire();
        Permit {
            pool: Arc::clone(self),
        }
    }

    /// Permits currently held
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Highest number of permits ever held at the same time
    pub fn peak_in_use(&self) -> usize {
        self.peak_in_use.load(Ordering::Relaxed)
    }

    fn record_acquire(&self) {
        let current = self.in_use.fetch_add(1, Ordering::Relaxed) + 1;
        let mut peak = self.peak_in_use.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_use.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => peak = actual,
            }
        }
    }

    fn release(&self) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        *lock(&self.available) += 1;
        self.released.notify_one();
    }
}

/// A held slot of a [`PermitPool`]
#[derive(Debug)]
pub struct Permit {
    pool: Arc<PermitPool>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.pool.release();
    }
}

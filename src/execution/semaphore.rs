use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A small, blocking counting semaphore.
///
/// Bounds how many pipeline runs the engine executes at once.
pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    cv: Condvar,
}

/// One acquired permit; released on drop.
pub(crate) struct Permit<'a> {
    semaphore: &'a Semaphore,
    waited: Duration,
}

impl Permit<'_> {
    /// Time spent blocked before the permit was granted.
    pub(crate) fn waited(&self) -> Duration {
        self.waited
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

impl Semaphore {
    /// `permits` is clamped to at least one.
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits.max(1)),
            cv: Condvar::new(),
        }
    }

    /// Acquire one permit, blocking until available.
    pub(crate) fn acquire(&self) -> Permit<'_> {
        let start = Instant::now();
        let mut waited = false;
        let mut g = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *g == 0 {
            waited = true;
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        *g -= 1;
        Permit {
            semaphore: self,
            waited: if waited { start.elapsed() } else { Duration::ZERO },
        }
    }

    fn release(&self) {
        let mut g = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *g += 1;
        self.cv.notify_one();
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        *self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::Semaphore;

    #[test]
    fn permits_are_returned_on_drop() {
        let sem = Semaphore::new(2);
        let first = sem.acquire();
        let second = sem.acquire();
        assert_eq!(sem.available(), 0);
        assert!(first.waited().is_zero());
        drop(first);
        assert_eq!(sem.available(), 1);
        drop(second);
        assert_eq!(sem.available(), 2);
    }

    #[test]
    fn zero_permits_is_clamped() {
        let sem = Semaphore::new(0);
        let _permit = sem.acquire();
        assert_eq!(sem.available(), 0);
    }
}

use parking_lot::Mutex;

/// Single-value mailbox holding only the most recent item.
///
/// Publishing overwrites the previous value; reading clones it. The lock
/// is held only for the swap or the clone, never across the producer's
/// I/O.
#[derive(Debug)]
pub struct LatestSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }
}

impl<T: Clone> LatestSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored value. The old value is dropped outside the lock.
    pub fn publish(&self, value: T) {
        let previous = self.value.lock().replace(value);
        drop(previous);
    }

    /// Independent copy of the stored value
    pub fn snapshot(&self) -> Option<T> {
        self.value.lock().clone()
    }

    /// Read a projection of the stored value without copying all of it
    pub fn inspect<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.value.lock().as_ref().map(f)
    }

    pub fn is_empty(&self) -> bool {
        self.value.lock().is_none()
    }

    pub fn clear(&self) {
        let previous = self.value.lock().take();
        drop(previous);
    }
}

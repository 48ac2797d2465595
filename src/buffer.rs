//! The bounded ring buffer between Sub intake and dispatch, with the
//! equivalence-predicate compaction that makes coalescing possible.
//!
//! `std::sync::Mutex` guards the ring itself, since critical sections are
//! short, while a `tokio::sync::Notify` wakes waiters so they yield to the
//! runtime instead of parking an OS thread.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity, single-writer/single-reader coalescing ring.
///
/// `equivalent` is supplied at construction: it is the sole definition of
/// "the same logical item" used by `read_latest_coalescing`.
pub struct CoalescingBuffer<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
    equivalent: Box<dyn Fn(&T, &T) -> bool + Send + Sync>,
}

impl<T: Send + 'static> CoalescingBuffer<T> {
    pub fn new(capacity: usize, equivalent: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        assert!(capacity > 0, "coalescing buffer capacity must be > 0");
        CoalescingBuffer {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            equivalent: Box::new(equivalent),
        }
    }

    /// Append, overwriting the oldest element when full. Never blocks.
    pub fn write(&self, value: T) {
        let mut inner = self.inner.lock().unwrap();
        if inner.items.len() == self.capacity {
            inner.items.pop_front();
        }
        inner.items.push_back(value);
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Pop the oldest element; block (yielding to the runtime) while empty.
    /// Returns `None` only after [`Self::shutdown`] and the buffer has
    /// drained.
    pub async fn read_blocking(&self) -> Option<T> {
        loop {
            // Register for notification before checking state and dropping
            // the lock: `notify_waiters` wakes only futures that already
            // exist, so building `notified()` after the check could miss a
            // wakeup from a write that lands in between.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(value) = inner.items.pop_front() {
                    return Some(value);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Pop the oldest element without waiting.
    pub fn read_nonblocking(&self) -> Option<T> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Block until non-empty, then return the newest element, discarding
    /// every buffered element equivalent to it (including older duplicates
    /// of itself). Returns `None` only after shutdown with an empty buffer.
    pub async fn read_latest_coalescing(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(latest) = inner.items.pop_back() {
                    inner.items.retain(|e| !(self.equivalent)(&latest, e));
                    return Some(latest);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Wake every blocked reader; subsequent reads drain what remains, then
    /// return `None`.
    pub fn shutdown(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_equivalent_buffer(capacity: usize) -> CoalescingBuffer<(String, u32)> {
        CoalescingBuffer::new(capacity, |a, b| a.0 == b.0)
    }

    #[test]
    fn write_overwrites_oldest_when_full() {
        let buf = key_equivalent_buffer(2);
        buf.write(("a".into(), 1));
        buf.write(("b".into(), 2));
        buf.write(("c".into(), 3));
        assert_eq!(buf.read_nonblocking(), Some(("b".into(), 2)));
        assert_eq!(buf.read_nonblocking(), Some(("c".into(), 3)));
        assert_eq!(buf.read_nonblocking(), None);
    }

    #[tokio::test]
    async fn coalescing_returns_latest_and_drops_older_same_key() {
        let buf = key_equivalent_buffer(100);
        for i in 0..100u32 {
            buf.write(("k".into(), i));
        }
        let latest = buf.read_latest_coalescing().await.unwrap();
        assert_eq!(latest, ("k".into(), 99));
        assert_eq!(buf.read_nonblocking(), None);
    }

    #[tokio::test]
    async fn coalescing_preserves_cross_key_interleaving() {
        let buf = key_equivalent_buffer(100);
        buf.write(("a".into(), 1));
        buf.write(("b".into(), 1));
        buf.write(("a".into(), 2));

        // Newest overall is ("a", 2); coalescing drops the older "a" entry
        // but must not touch "b".
        let latest = buf.read_latest_coalescing().await.unwrap();
        assert_eq!(latest, ("a".into(), 2));
        assert_eq!(buf.read_nonblocking(), Some(("b".into(), 1)));
        assert_eq!(buf.read_nonblocking(), None);
    }

    #[tokio::test]
    async fn shutdown_wakes_blocked_reader_with_none() {
        let buf = std::sync::Arc::new(key_equivalent_buffer(4));
        let reader = {
            let buf = buf.clone();
            tokio::spawn(async move { buf.read_blocking().await })
        };
        tokio::task::yield_now().await;
        buf.shutdown();
        let result = reader.await.unwrap();
        assert_eq!(result, None);
    }
}

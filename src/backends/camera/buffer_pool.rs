// SPDX-License-Identifier: GPL-3.0-only
//! Fixed-depth buffer pool backing captured frames
//!
//! Capture hardware owns a small number of buffers. A frame borrows one
//! for as long as any consumer holds it; the buffer goes back to the pool
//! when the last reference drops. When every buffer is out, new frames are
//! dropped at the source instead of growing the pool.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Handle to a pooled buffer, returned to its pool on drop
pub struct BufferLease {
    pool: Arc<PoolInner>,
    buf: Option<Vec<u8>>,
}

impl BufferLease {
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }

    pub fn len(&self) -> usize {
        self.buf.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set the visible length, growing the backing allocation if needed
    pub fn resize(&mut self, len: usize) {
        if let Some(buf) = self.buf.as_mut() {
            buf.resize(len, 0);
        }
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.recycle(buf);
        }
    }
}

/// Bounded pool of reusable frame buffers
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
    chunk_size: usize,
    leased: AtomicUsize,
    exhausted: AtomicU64,
}

impl PoolInner {
    fn recycle(&self, buf: Vec<u8>) {
        self.leased.fetch_sub(1, Ordering::AcqRel);
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.capacity {
            free.push(buf);
        }
    }
}

impl BufferPool {
    /// Create a pool with `capacity` preallocated buffers of `chunk_size` bytes
    pub fn with_capacity(capacity: usize, chunk_size: usize) -> Self {
        let capacity = capacity.max(1);
        let free = (0..capacity).map(|_| vec![0; chunk_size]).collect();
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                capacity,
                chunk_size,
                leased: AtomicUsize::new(0),
                exhausted: AtomicU64::new(0),
            }),
        }
    }

    /// Take a free buffer, or `None` when every buffer is held downstream
    pub fn try_lease(&self) -> Option<BufferLease> {
        let buf = self
            .inner
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        match buf {
            Some(buf) => {
                self.inner.leased.fetch_add(1, Ordering::AcqRel);
                Some(BufferLease {
                    pool: Arc::clone(&self.inner),
                    buf: Some(buf),
                })
            }
            None => {
                self.inner.exhausted.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn chunk_size(&self) -> usize {
        self.inner.chunk_size
    }

    /// Buffers currently held by frames
    pub fn leased(&self) -> usize {
        self.inner.leased.load(Ordering::Acquire)
    }

    /// How many lease attempts found the pool empty
    pub fn exhausted_count(&self) -> u64 {
        self.inner.exhausted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_returns_on_drop() {
        let pool = BufferPool::with_capacity(2, 16);
        let a = pool.try_lease().unwrap();
        let b = pool.try_lease().unwrap();
        assert_eq!(pool.leased(), 2);
        assert!(pool.try_lease().is_none());
        assert_eq!(pool.exhausted_count(), 1);

        drop(a);
        assert_eq!(pool.leased(), 1);
        assert!(pool.try_lease().is_some());
        drop(b);
        assert_eq!(pool.leased(), 0);
    }

    #[test]
    fn test_resize() {
        let pool = BufferPool::with_capacity(1, 4);
        let mut lease = pool.try_lease().unwrap();
        lease.resize(8);
        lease.as_mut_slice()[7] = 9;
        assert_eq!(lease.len(), 8);
        assert_eq!(lease.as_slice()[7], 9);
    }
}

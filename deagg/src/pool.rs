//! Descriptor pool.
//!
//! Descriptors are recycled through a locked free list rather than allocated
//! per packet. The critical section is a single push or pop; fragment vectors
//! keep their capacity across recycling, so a warmed-up pool stops touching
//! the allocator entirely.
//!
//! An optional cap bounds total descriptors in existence. Past the cap,
//! [`DescriptorPool::acquire`] fails and the caller drops the frame, which
//! bounds memory under a flood of inbound data.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::descriptor::FragDescriptor;
use crate::metrics;

/// A free list of packet descriptors.
pub struct DescriptorPool {
    free: Mutex<Vec<FragDescriptor>>,
    size: AtomicUsize,
    cap: usize,
}

impl DescriptorPool {
    /// Create a pool with `prefill` descriptors ready on the free list and
    /// at most `cap` descriptors in existence (0 = unbounded).
    pub fn new(prefill: usize, cap: usize) -> Self {
        let mut free = Vec::with_capacity(prefill);
        free.resize_with(prefill, FragDescriptor::default);
        metrics::POOL_SIZE.add(prefill as i64);
        Self {
            free: Mutex::new(free),
            size: AtomicUsize::new(prefill),
            cap,
        }
    }

    /// Take a descriptor off the free list, growing the pool if it is empty
    /// and the cap allows. Returns `None` at the cap.
    pub fn acquire(&self) -> Option<FragDescriptor> {
        if let Some(desc) = self.free.lock().unwrap().pop() {
            return Some(desc);
        }

        if self.cap != 0 && self.size.load(Ordering::Relaxed) >= self.cap {
            metrics::POOL_EXHAUSTED.increment();
            return None;
        }

        self.size.fetch_add(1, Ordering::Relaxed);
        metrics::POOL_ALLOCATED.increment();
        metrics::POOL_SIZE.increment();
        Some(FragDescriptor::default())
    }

    /// Return a descriptor to the free list, dropping its fragments (and
    /// their page references) and clearing its metadata.
    pub fn recycle(&self, mut desc: FragDescriptor) {
        desc.reset();
        metrics::POOL_RECYCLED.increment();
        self.free.lock().unwrap().push(desc);
    }

    /// Descriptors currently in existence, free or in flight.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Descriptors currently on the free list.
    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}

//! Versioned snapshots shared between one writer and many readers.
//!
//! The writer builds the next value privately and then swaps a pointer under a
//! short write lock. Readers clone the current `Arc` and never observe a
//! partially applied update.

use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

#[derive(Debug)]
pub struct Publisher<T> {
    slot: Arc<RwLock<Arc<Versioned<T>>>>,
    version: u64,
}

impl<T> Publisher<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Arc::new(Versioned {
                version: 0,
                value: initial,
            }))),
            version: 0,
        }
    }

    /// Makes `value` visible to every subscriber and returns its version.
    pub fn publish(&mut self, value: T) -> u64 {
        self.version += 1;
        let next = Arc::new(Versioned {
            version: self.version,
            value,
        });
        let mut guard = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *guard = next;
        self.version
    }

    pub fn subscribe(&self) -> Subscriber<T> {
        Subscriber {
            slot: Arc::clone(&self.slot),
        }
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn latest(&self) -> Arc<Versioned<T>> {
        self.subscribe().latest()
    }
}

#[derive(Debug)]
pub struct Subscriber<T> {
    slot: Arc<RwLock<Arc<Versioned<T>>>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Subscriber<T> {
    pub fn latest(&self) -> Arc<Versioned<T>> {
        let guard = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }
}

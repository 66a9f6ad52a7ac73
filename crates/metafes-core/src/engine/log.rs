//! Append-only log with cheap clones.
//!
//! Items live in sealed, shared chunks plus a small mutable tail, so cloning the
//! log for publication copies at most one chunk.

use std::sync::Arc;

const CHUNK_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct ChunkedLog<T> {
    sealed: Vec<Arc<Vec<T>>>,
    tail: Arc<Vec<T>>,
    len: usize,
}

impl<T> Clone for ChunkedLog<T> {
    fn clone(&self) -> Self {
        Self {
            sealed: self.sealed.clone(),
            tail: Arc::clone(&self.tail),
            len: self.len,
        }
    }
}

impl<T> Default for ChunkedLog<T> {
    fn default() -> Self {
        Self {
            sealed: Vec::new(),
            tail: Arc::new(Vec::new()),
            len: 0,
        }
    }
}

impl<T: Clone> ChunkedLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        Arc::make_mut(&mut self.tail).push(item);
        self.len += 1;
        if self.tail.len() == CHUNK_CAPACITY {
            let full = std::mem::replace(
                &mut self.tail,
                Arc::new(Vec::with_capacity(CHUNK_CAPACITY)),
            );
            self.sealed.push(full);
        }
    }
}

impl<T> ChunkedLog<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let (chunk, offset) = (index / CHUNK_CAPACITY, index % CHUNK_CAPACITY);
        match self.sealed.get(chunk) {
            Some(sealed) => sealed.get(offset),
            None => self.tail.get(offset),
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.sealed
            .iter()
            .flat_map(|chunk| chunk.iter())
            .chain(self.tail.iter())
    }

    /// Items from `start` to the end.
    pub fn iter_from(&self, start: usize) -> impl Iterator<Item = &T> + '_ {
        self.iter().skip(start)
    }
}

impl<T: Clone> FromIterator<T> for ChunkedLog<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut log = Self::new();
        for item in iter {
            log.push(item);
        }
        log
    }
}

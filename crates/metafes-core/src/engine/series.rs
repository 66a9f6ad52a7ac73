//! Live, append-only series shared with concurrent readers.

use super::log::ChunkedLog;
use super::snapshot::{Publisher, Subscriber};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SourceError {
    #[error("Index {requested} is not committed yet ({committed} items available)")]
    Stale { requested: usize, committed: usize },
}

/// Random access to a series that may still be growing.
pub trait SampleSource<T> {
    /// Number of items visible to readers right now.
    fn committed_len(&self) -> usize;

    fn get(&self, index: usize) -> Result<T, SourceError>;

    /// Whether the series will never grow again.
    fn is_closed(&self) -> bool;
}

#[derive(Debug)]
struct SeriesState<T> {
    items: ChunkedLog<T>,
    closed: bool,
}

/// Writer side of a series. Each push is published before it returns.
#[derive(Debug)]
pub struct SeriesWriter<T> {
    items: ChunkedLog<T>,
    closed: bool,
    publisher: Publisher<SeriesState<T>>,
}

impl<T: Clone> SeriesWriter<T> {
    pub fn new() -> Self {
        Self {
            items: ChunkedLog::new(),
            closed: false,
            publisher: Publisher::new(SeriesState {
                items: ChunkedLog::new(),
                closed: false,
            }),
        }
    }

    /// A closed series holding `items`.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let mut writer = Self::new();
        writer.items = items.into_iter().collect();
        writer.closed = true;
        writer.publish();
        writer
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.publish();
    }

    /// Marks the series complete; later pushes are still accepted but
    /// readers may stop waiting for them.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.publish();
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &ChunkedLog<T> {
        &self.items
    }

    pub fn reader(&self) -> SeriesReader<T> {
        SeriesReader {
            subscriber: self.publisher.subscribe(),
        }
    }

    fn publish(&mut self) {
        self.publisher.publish(SeriesState {
            items: self.items.clone(),
            closed: self.closed,
        });
    }
}

impl<T: Clone> Default for SeriesWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct SeriesReader<T> {
    subscriber: Subscriber<SeriesState<T>>,
}

impl<T> Clone for SeriesReader<T> {
    fn clone(&self) -> Self {
        Self {
            subscriber: self.subscriber.clone(),
        }
    }
}

impl<T: Clone> SeriesReader<T> {
    pub fn last(&self) -> Option<T> {
        self.subscriber.latest().value.items.last().cloned()
    }

    /// Copies every committed item.
    pub fn to_vec(&self) -> Vec<T> {
        self.subscriber.latest().value.items.iter().cloned().collect()
    }
}

impl<T: Clone> SampleSource<T> for SeriesReader<T> {
    fn committed_len(&self) -> usize {
        self.subscriber.latest().value.items.len()
    }

    fn get(&self, index: usize) -> Result<T, SourceError> {
        let snapshot = self.subscriber.latest();
        snapshot
            .value
            .items
            .get(index)
            .cloned()
            .ok_or(SourceError::Stale {
                requested: index,
                committed: snapshot.value.items.len(),
            })
    }

    fn is_closed(&self) -> bool {
        self.subscriber.latest().value.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_sees_pushes_and_reports_stale_indices() {
        let mut writer = SeriesWriter::new();
        let reader = writer.reader();
        assert_eq!(reader.committed_len(), 0);
        writer.push(1.5);
        writer.push(2.5);
        assert_eq!(reader.committed_len(), 2);
        assert_eq!(reader.get(1), Ok(2.5));
        assert_eq!(
            reader.get(2),
            Err(SourceError::Stale {
                requested: 2,
                committed: 2
            })
        );
        assert_eq!(reader.last(), Some(2.5));
        assert!(!reader.is_closed());
    }

    #[test]
    fn from_items_builds_a_closed_series() {
        let writer = SeriesWriter::from_items(vec!['a', 'b', 'c']);
        let reader = writer.reader();
        assert!(reader.is_closed());
        assert_eq!(reader.to_vec(), vec!['a', 'b', 'c']);
    }

    #[test]
    fn close_is_visible_to_existing_readers() {
        let mut writer: SeriesWriter<u32> = SeriesWriter::new();
        let reader = writer.reader().clone();
        writer.close();
        assert!(reader.is_closed());
        assert!(writer.is_empty());
    }
}

use std::fmt;
use std::rc::Rc;

use super::Stream;

/// A stream annotated with the key it is ordered by.
///
/// The annotation is a promise made by whoever built the sorted stream: elements sharing a key
/// are delivered contiguously. [`crate::processing::EnsureSortedNode`] checks the promise;
/// [`Stream::assume_sorted`] does not.
pub struct SortedStream<T, K> {
    stream: Stream<T>,
    key_of: Rc<dyn Fn(&T) -> K>,
}

impl<T, K> Clone for SortedStream<T, K> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
            key_of: Rc::clone(&self.key_of),
        }
    }
}

impl<T, K> fmt::Debug for SortedStream<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedStream")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl<T: 'static, K: 'static> SortedStream<T, K> {
    pub(crate) fn new(stream: Stream<T>, key_of: Rc<dyn Fn(&T) -> K>) -> Self {
        Self { stream, key_of }
    }

    /// The underlying unsorted view of this stream.
    pub fn stream(&self) -> &Stream<T> {
        &self.stream
    }

    /// Sort key of a value.
    pub fn key_of(&self, value: &T) -> K {
        (self.key_of)(value)
    }

    pub(crate) fn key_fn(&self) -> Rc<dyn Fn(&T) -> K> {
        Rc::clone(&self.key_of)
    }
}

impl<T: 'static> Stream<T> {
    /// Annotate this stream as ordered by `key_of` without checking it.
    ///
    /// Use [`Stream::ensure_sorted`] when the ordering is not guaranteed by construction.
    pub fn assume_sorted<K, F>(&self, key_of: F) -> SortedStream<T, K>
    where
        K: 'static,
        F: Fn(&T) -> K + 'static,
    {
        SortedStream::new(self.clone(), Rc::new(key_of))
    }
}

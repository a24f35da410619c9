//! Synchronous lazy pipelines.
//!
//! [`Sequence<T>`] is a cheap-to-clone handle on a chain of lazy operator
//! stages rooted at a source. Operator calls build a new handle immediately
//! and run nothing; terminal calls (`to_vec`, `sum`, `first`, ...) open a
//! fresh cursor chain and drain it. Re-running a terminal on the same handle
//! re-runs the whole chain from the source.

mod compose;
mod select;
mod source;
mod terminal;
mod transform;
mod window;

use std::sync::{Arc, Mutex};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

pub(crate) use source::{drain_count, Cursor, Exhausted, IterSource, Node, Pull, VecSource};

/// A lazy, chainable pipeline over an ordered sequence of elements.
///
/// A `Sequence` wraps its data without copying it and defers all work to the
/// terminal operations. Handles are cheap to clone and safe to share; a
/// stage holds its upstream behind a shared reference and never materializes
/// it.
///
/// # Repeatability
///
/// A sequence built with [`Sequence::from_vec`] is *repeatable*: every
/// traversal restarts from the first element, so terminal operations can be
/// called any number of times with the same result. A sequence built with
/// [`Sequence::from_iter_once`] is *single-use*: its first traversal
/// consumes the iterator and later traversals are empty. The capability is
/// queryable via [`Sequence::repeatable`].
///
/// # Example
///
/// ```rust
/// use cascade::prelude::*;
///
/// let evens = Sequence::from_vec(vec![1, 2, 3, 4, 5, 6])
///     .filter(predicate(|n: &i32, _| n % 2 == 0))
///     .map(mapper(|n: i32, _| n * 10));
///
/// assert_eq!(evens.to_vec().unwrap(), vec![20, 40, 60]);
/// ```
pub struct Sequence<T> {
    pub(crate) node: Arc<dyn Node<T>>,
    pub(crate) config: PipelineConfig,
}

impl<T> Clone for Sequence<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            config: self.config,
        }
    }
}

impl<T> Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap a vector into a repeatable sequence.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::from_node(VecSource::new(items))
    }

    /// Collect an iterable into a repeatable sequence.
    pub fn from_values(items: impl IntoIterator<Item = T>) -> Self {
        Self::from_vec(items.into_iter().collect())
    }

    /// Wrap an iterator into a single-use sequence.
    ///
    /// The first traversal consumes the iterator; later traversals yield
    /// nothing. Use [`Sequence::from_vec`] when terminals need to be
    /// re-runnable.
    pub fn from_iter_once(iter: impl Iterator<Item = T> + Send + 'static) -> Self {
        Self::from_node(IterSource::new(iter))
    }

    /// The empty sequence.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Whether fresh traversals restart from the first element.
    pub fn repeatable(&self) -> bool {
        self.node.repeatable()
    }

    /// The pipeline-wide configuration.
    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Replace the pipeline-wide configuration.
    ///
    /// The config is read when a traversal opens, so it applies to every
    /// stage of the chain, upstream stages included.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Iterate the pipeline, one `Result` per element.
    ///
    /// This is the pull-next-or-done protocol the rest of the ecosystem
    /// consumes; downstream crates need nothing beyond it. The iterator
    /// fuses after the first error.
    pub fn iter(&self) -> Iter<T> {
        match self.open_cursor() {
            Ok(cursor) => Iter {
                state: IterState::Running(cursor),
            },
            Err(err) => Iter {
                state: IterState::Failed(err),
            },
        }
    }

    pub(crate) fn from_node(node: impl Node<T> + 'static) -> Self {
        Self {
            node: Arc::new(node),
            config: PipelineConfig::new(),
        }
    }

    /// Build a downstream handle around `node`, inheriting this pipeline's
    /// configuration.
    pub(crate) fn derive<U>(&self, node: impl Node<U> + 'static) -> Sequence<U> {
        Sequence {
            node: Arc::new(node),
            config: self.config,
        }
    }

    /// Open a fresh traversal of this pipeline.
    pub(crate) fn open_cursor(&self) -> Result<Cursor<T>> {
        self.node.open(&self.config)
    }
}

impl<T> From<Vec<T>> for Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T> FromIterator<T> for Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

/// A sequence already open for traversal, wrapped back into a node.
///
/// `when_empty`-style stages probe their upstream before deciding which
/// branch to traverse; the probed element and the live cursor are resumed
/// through this node so nothing pulled during the probe is lost. Single-use
/// by construction.
pub(crate) struct ResumedNode<T> {
    state: Mutex<Option<(Option<T>, Cursor<T>)>>,
}

impl<T> ResumedNode<T> {
    pub(crate) fn new(buffered: Option<T>, rest: Cursor<T>) -> Self {
        Self {
            state: Mutex::new(Some((buffered, rest))),
        }
    }
}

impl<T> Node<T> for ResumedNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, _config: &PipelineConfig) -> Result<Cursor<T>> {
        let taken = self
            .state
            .lock()
            .map_err(|_| Error::unexpected("resumed traversal mutex poisoned"))?
            .take();
        match taken {
            Some((buffered, rest)) => Ok(Box::new(ResumedCursor { buffered, rest })),
            None => Ok(Box::new(Exhausted)),
        }
    }

    fn repeatable(&self) -> bool {
        false
    }
}

struct ResumedCursor<T> {
    buffered: Option<T>,
    rest: Cursor<T>,
}

impl<T> Pull<T> for ResumedCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        if let Some(item) = self.buffered.take() {
            return Ok(Some(item));
        }
        self.rest.pull()
    }
}

// ============================================================================
// Iteration protocol
// ============================================================================

/// Iterator over one pipeline traversal. Created by [`Sequence::iter`].
pub struct Iter<T> {
    state: IterState<T>,
}

enum IterState<T> {
    Running(Cursor<T>),
    Failed(Error),
    Done,
}

impl<T> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, IterState::Done) {
            IterState::Running(mut cursor) => match cursor.pull() {
                Ok(Some(item)) => {
                    self.state = IterState::Running(cursor);
                    Some(Ok(item))
                }
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            },
            IterState::Failed(err) => Some(Err(err)),
            IterState::Done => None,
        }
    }
}

impl<T> IntoIterator for Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = Result<T>;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> IntoIterator for &Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = Result<T>;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_cheap_to_clone_and_share() {
        let seq = Sequence::from_vec(vec![1, 2, 3]);
        let other = seq.clone();
        assert_eq!(seq.to_vec().unwrap(), other.to_vec().unwrap());
    }

    #[test]
    fn test_iter_yields_each_element_once() {
        let seq = Sequence::from_vec(vec!["a", "b"]);
        let items: Vec<_> = seq.iter().collect::<Result<_>>().unwrap();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[test]
    fn test_single_use_sequence_reports_capability() {
        let once = Sequence::from_iter_once(0..3);
        assert!(!once.repeatable());
        assert_eq!(once.to_vec().unwrap(), vec![0, 1, 2]);
        assert_eq!(once.to_vec().unwrap(), Vec::<i32>::new());

        let repeatable = Sequence::from_vec(vec![0, 1, 2]);
        assert!(repeatable.repeatable());
    }
}

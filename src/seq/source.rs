//! Sources and the pull-based cursor protocol for synchronous pipelines.

use std::sync::{Arc, Mutex};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};

// ============================================================================
// Cursor Protocol
// ============================================================================

/// One pull-based traversal of a pipeline stage.
///
/// `pull` returns the next element, `Ok(None)` once the stage is exhausted.
/// Cursors own all per-traversal state (index counters, buffers, dedup
/// sets); nothing survives into the next traversal.
pub(crate) trait Pull<T>: Send {
    /// Produce the next element, or `None` when exhausted.
    fn pull(&mut self) -> Result<Option<T>>;
}

/// A boxed cursor, as handed between stages.
pub(crate) type Cursor<T> = Box<dyn Pull<T>>;

/// A pipeline node: the source, or one operator stage holding its upstream.
///
/// Nodes are immutable after construction and never cache results; every
/// traversal opens a fresh cursor chain rooted at the source.
pub(crate) trait Node<T>: Send + Sync {
    /// Open a fresh cursor for one traversal.
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>>;

    /// Whether fresh traversals restart from the first element.
    ///
    /// Array-backed sources are repeatable; iterator-backed sources are
    /// consumed by their first traversal, after which further traversals
    /// are empty. Stages inherit the property from their upstream.
    fn repeatable(&self) -> bool;
}

/// A cursor that is already exhausted.
pub(crate) struct Exhausted;

impl<T> Pull<T> for Exhausted {
    fn pull(&mut self) -> Result<Option<T>> {
        Ok(None)
    }
}

/// Drain a cursor, counting the elements it yields.
pub(crate) fn drain_count<T>(mut cursor: Cursor<T>) -> Result<usize> {
    let mut count = 0usize;
    while cursor.pull()?.is_some() {
        count += 1;
    }
    Ok(count)
}

// ============================================================================
// Sources
// ============================================================================

/// Repeatable source backed by a shared vector.
///
/// Every traversal clones elements out from the start.
pub(crate) struct VecSource<T> {
    items: Arc<Vec<T>>,
}

impl<T> VecSource<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }
}

impl<T> Node<T> for VecSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, _config: &PipelineConfig) -> Result<Cursor<T>> {
        Ok(Box::new(VecCursor {
            items: Arc::clone(&self.items),
            position: 0,
        }))
    }

    fn repeatable(&self) -> bool {
        true
    }
}

struct VecCursor<T> {
    items: Arc<Vec<T>>,
    position: usize,
}

impl<T> Pull<T> for VecCursor<T>
where
    T: Clone + Send + Sync,
{
    fn pull(&mut self) -> Result<Option<T>> {
        let item = self.items.get(self.position).cloned();
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }
}

/// Single-use source backed by an arbitrary iterator.
///
/// The first traversal consumes the iterator; later traversals are empty.
pub(crate) struct IterSource<T> {
    inner: Mutex<Option<Box<dyn Iterator<Item = T> + Send>>>,
}

impl<T> IterSource<T> {
    pub(crate) fn new(iter: impl Iterator<Item = T> + Send + 'static) -> Self {
        Self {
            inner: Mutex::new(Some(Box::new(iter))),
        }
    }
}

impl<T> Node<T> for IterSource<T>
where
    T: Send + Sync + 'static,
{
    fn open(&self, _config: &PipelineConfig) -> Result<Cursor<T>> {
        let taken = self
            .inner
            .lock()
            .map_err(|_| Error::unexpected("iterator source mutex poisoned"))?
            .take();
        match taken {
            Some(iter) => Ok(Box::new(IterCursor { iter })),
            None => {
                tracing::trace!("single-use source already consumed, traversal is empty");
                Ok(Box::new(Exhausted))
            }
        }
    }

    fn repeatable(&self) -> bool {
        false
    }
}

struct IterCursor<T> {
    iter: Box<dyn Iterator<Item = T> + Send>,
}

impl<T> Pull<T> for IterCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        Ok(self.iter.next())
    }
}

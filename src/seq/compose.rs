//! Structural composition: concatenation, zip, sort, reverse, conditional
//! rebuilds, pipe, and tap.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pair::Pair;
use crate::strategy::{Comparator, NaturalOrder};

use super::{Cursor, Node, Pull, ResumedNode, Sequence};

impl<T> Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Concatenate `other` in front of this sequence, lazily.
    pub fn prepend(&self, other: &Sequence<T>) -> Sequence<T> {
        self.derive(ConcatNode {
            first: Arc::clone(&other.node),
            second: Arc::clone(&self.node),
        })
    }

    /// Concatenate `other` behind this sequence, lazily.
    pub fn append(&self, other: &Sequence<T>) -> Sequence<T> {
        self.derive(ConcatNode {
            first: Arc::clone(&self.node),
            second: Arc::clone(&other.node),
        })
    }

    /// Pair elements positionally with `other`.
    ///
    /// Stops at the shorter sequence; nothing is padded. Once one side is
    /// exhausted the other side is not pulled again.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cascade::prelude::*;
    ///
    /// let letters = Sequence::from_vec(vec!["a", "b", "c"]);
    /// let numbers = Sequence::from_vec(vec![1, 2, 3, 4]);
    /// let pairs = letters.zip(&numbers).to_vec().unwrap();
    /// assert_eq!(pairs.len(), 3);
    /// assert_eq!(pairs[0], Pair::new("a", 1));
    /// ```
    pub fn zip<U>(&self, other: &Sequence<U>) -> Sequence<Pair<T, U>>
    where
        U: Clone + Send + Sync + 'static,
    {
        self.derive(ZipNode {
            left: Arc::clone(&self.node),
            right: Arc::clone(&other.node),
        })
    }

    /// Sort by the element type's own total order.
    ///
    /// Sorting is inherently eager: the upstream is materialized on first
    /// pull, then streamed out in order.
    pub fn sort(&self) -> Sequence<T>
    where
        T: Ord,
    {
        self.sort_by(NaturalOrder)
    }

    /// Sort with an explicit comparator. Eager like [`Sequence::sort`].
    pub fn sort_by<C>(&self, comparator: C) -> Sequence<T>
    where
        C: Comparator<T> + 'static,
    {
        self.derive(SortNode {
            upstream: Arc::clone(&self.node),
            comparator: Arc::new(comparator),
        })
    }

    /// Reverse the sequence.
    ///
    /// The upstream is consumed in blocks (size set by
    /// [`PipelineConfig::reverse_block`](crate::PipelineConfig::reverse_block))
    /// and the blocks are replayed last-first, each back to front, so the
    /// net effect is full reversal with block-granular buffering.
    pub fn reverse(&self) -> Sequence<T> {
        self.derive(ReverseNode {
            upstream: Arc::clone(&self.node),
        })
    }

    /// Rebuild the pipeline through `build` when `condition` holds.
    pub fn when(&self, condition: bool, build: impl FnOnce(Sequence<T>) -> Sequence<T>) -> Sequence<T> {
        if condition {
            build(self.clone())
        } else {
            self.clone()
        }
    }

    /// Rebuild the pipeline through `build` when `condition` does not hold.
    pub fn when_not(
        &self,
        condition: bool,
        build: impl FnOnce(Sequence<T>) -> Sequence<T>,
    ) -> Sequence<T> {
        self.when(!condition, build)
    }

    /// Rebuild the pipeline through `build` if the sequence turns out to be
    /// empty.
    ///
    /// The emptiness probe runs when the result is consumed, not when this
    /// method is called.
    pub fn when_empty<F>(&self, build: F) -> Sequence<T>
    where
        F: Fn(Sequence<T>) -> Sequence<T> + Send + Sync + 'static,
    {
        self.derive(WhenEmptyNode {
            upstream: Arc::clone(&self.node),
            rebuild: Arc::new(build),
            trigger_on_empty: true,
        })
    }

    /// Rebuild the pipeline through `build` if the sequence turns out to be
    /// non-empty.
    ///
    /// Like [`Sequence::when_empty`], the probe is deferred until the
    /// result is consumed. The element pulled by the probe is resumed into
    /// the rebuilt pipeline, so single-use sources lose nothing.
    pub fn when_not_empty<F>(&self, build: F) -> Sequence<T>
    where
        F: Fn(Sequence<T>) -> Sequence<T> + Send + Sync + 'static,
    {
        self.derive(WhenEmptyNode {
            upstream: Arc::clone(&self.node),
            rebuild: Arc::new(build),
            trigger_on_empty: false,
        })
    }

    /// Hand the whole pipeline to `f` and return its result directly.
    ///
    /// An escape hatch for multi-step custom logic; `f` runs immediately.
    pub fn pipe<R>(&self, f: impl FnOnce(Sequence<T>) -> R) -> R {
        f(self.clone())
    }

    /// Invoke `f` with the pipeline and pass the sequence through
    /// unchanged.
    ///
    /// `f` receives a borrowed handle, so the side effect cannot change
    /// what is yielded downstream.
    pub fn tap(&self, f: impl FnOnce(&Sequence<T>)) -> Sequence<T> {
        f(self);
        self.clone()
    }
}

// ============================================================================
// Concat Stage
// ============================================================================

struct ConcatNode<T> {
    first: Arc<dyn Node<T>>,
    second: Arc<dyn Node<T>>,
}

impl<T> Node<T> for ConcatNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
        Ok(Box::new(ConcatCursor {
            active: self.first.open(config)?,
            second: Some(Arc::clone(&self.second)),
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.first.repeatable() && self.second.repeatable()
    }
}

struct ConcatCursor<T> {
    active: Cursor<T>,
    /// The tail pipeline, opened only once the head is exhausted.
    second: Option<Arc<dyn Node<T>>>,
    config: PipelineConfig,
}

impl<T> Pull<T> for ConcatCursor<T>
where
    T: Send + Sync + 'static,
{
    fn pull(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.active.pull()? {
                return Ok(Some(item));
            }
            match self.second.take() {
                Some(node) => self.active = node.open(&self.config)?,
                None => return Ok(None),
            }
        }
    }
}

// ============================================================================
// Zip Stage
// ============================================================================

struct ZipNode<T, U> {
    left: Arc<dyn Node<T>>,
    right: Arc<dyn Node<U>>,
}

impl<T, U> Node<Pair<T, U>> for ZipNode<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<Pair<T, U>>> {
        Ok(Box::new(ZipCursor {
            left: self.left.open(config)?,
            right: self.right.open(config)?,
            done: false,
        }))
    }

    fn repeatable(&self) -> bool {
        self.left.repeatable() && self.right.repeatable()
    }
}

struct ZipCursor<T, U> {
    left: Cursor<T>,
    right: Cursor<U>,
    done: bool,
}

impl<T, U> Pull<Pair<T, U>> for ZipCursor<T, U>
where
    T: Send,
    U: Send,
{
    fn pull(&mut self) -> Result<Option<Pair<T, U>>> {
        if self.done {
            return Ok(None);
        }
        let Some(left) = self.left.pull()? else {
            self.done = true;
            return Ok(None);
        };
        let Some(right) = self.right.pull()? else {
            self.done = true;
            return Ok(None);
        };
        Ok(Some(Pair::new(left, right)))
    }
}

// ============================================================================
// Sort Stage
// ============================================================================

struct SortNode<T> {
    upstream: Arc<dyn Node<T>>,
    comparator: Arc<dyn Comparator<T>>,
}

impl<T> Node<T> for SortNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
        Ok(Box::new(SortCursor {
            upstream: Some(self.upstream.open(config)?),
            comparator: Arc::clone(&self.comparator),
            sorted: None,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct SortCursor<T> {
    upstream: Option<Cursor<T>>,
    comparator: Arc<dyn Comparator<T>>,
    sorted: Option<std::vec::IntoIter<T>>,
}

impl<T> Pull<T> for SortCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        if self.sorted.is_none() {
            let Some(mut upstream) = self.upstream.take() else {
                return Ok(None);
            };
            let mut items = Vec::new();
            while let Some(item) = upstream.pull()? {
                items.push(item);
            }
            tracing::trace!(len = items.len(), "materialized pipeline for sort");
            items.sort_by(|a, b| self.comparator.compare(a, b));
            self.sorted = Some(items.into_iter());
        }
        Ok(self.sorted.as_mut().and_then(Iterator::next))
    }
}

// ============================================================================
// Reverse Stage
// ============================================================================

struct ReverseNode<T> {
    upstream: Arc<dyn Node<T>>,
}

impl<T> Node<T> for ReverseNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
        Ok(Box::new(ReverseCursor {
            upstream: Some(self.upstream.open(config)?),
            block_size: config.reverse_block_size(),
            blocks: None,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct ReverseCursor<T> {
    upstream: Option<Cursor<T>>,
    block_size: usize,
    /// Buffered upstream blocks; replayed last-first, each back to front.
    blocks: Option<Vec<Vec<T>>>,
}

impl<T> Pull<T> for ReverseCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        if self.blocks.is_none() {
            let Some(mut upstream) = self.upstream.take() else {
                return Ok(None);
            };
            let mut blocks: Vec<Vec<T>> = Vec::new();
            let mut block = Vec::with_capacity(self.block_size.min(64));
            while let Some(item) = upstream.pull()? {
                block.push(item);
                if block.len() == self.block_size {
                    blocks.push(std::mem::take(&mut block));
                }
            }
            if !block.is_empty() {
                blocks.push(block);
            }
            tracing::trace!(blocks = blocks.len(), "buffered pipeline for reverse");
            self.blocks = Some(blocks);
        }
        let Some(blocks) = self.blocks.as_mut() else {
            return Ok(None);
        };
        while let Some(block) = blocks.last_mut() {
            if let Some(item) = block.pop() {
                return Ok(Some(item));
            }
            blocks.pop();
        }
        Ok(None)
    }
}

// ============================================================================
// Conditional Rebuild Stage
// ============================================================================

struct WhenEmptyNode<T> {
    upstream: Arc<dyn Node<T>>,
    rebuild: Arc<dyn Fn(Sequence<T>) -> Sequence<T> + Send + Sync>,
    trigger_on_empty: bool,
}

impl<T> Node<T> for WhenEmptyNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
        Ok(Box::new(WhenEmptyCursor {
            upstream: Arc::clone(&self.upstream),
            rebuild: Arc::clone(&self.rebuild),
            trigger_on_empty: self.trigger_on_empty,
            delegate: None,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct WhenEmptyCursor<T> {
    upstream: Arc<dyn Node<T>>,
    rebuild: Arc<dyn Fn(Sequence<T>) -> Sequence<T> + Send + Sync>,
    trigger_on_empty: bool,
    delegate: Option<Cursor<T>>,
    config: PipelineConfig,
}

impl<T> Pull<T> for WhenEmptyCursor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn pull(&mut self) -> Result<Option<T>> {
        if self.delegate.is_none() {
            let mut probe = self.upstream.open(&self.config)?;
            let first = probe.pull()?;
            let is_empty = first.is_none();
            tracing::trace!(
                empty = is_empty,
                rebuilding = is_empty == self.trigger_on_empty,
                "probed pipeline for emptiness"
            );
            let delegate = if is_empty == self.trigger_on_empty {
                let base = if is_empty {
                    // The probe consumed nothing; rebuild from the original.
                    Sequence {
                        node: Arc::clone(&self.upstream),
                        config: self.config,
                    }
                } else {
                    // Resume the probed element so single-use sources lose
                    // nothing.
                    Sequence {
                        node: Arc::new(ResumedNode::new(first, probe)),
                        config: self.config,
                    }
                };
                (self.rebuild)(base).open_cursor()?
            } else {
                ResumedNode::new(first, probe).open(&self.config)?
            };
            self.delegate = Some(delegate);
        }
        match self.delegate.as_mut() {
            Some(delegate) => delegate.pull(),
            None => Ok(None),
        }
    }
}

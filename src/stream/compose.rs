//! Structural composition for asynchronous pipelines.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pair::Pair;
use crate::strategy::{Comparator, NaturalOrder};

use super::{AsyncCursor, AsyncNode, AsyncPull, AsyncSequence, ResumedNode};

impl<T> AsyncSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Concatenate `other` in front of this sequence, lazily.
    pub fn prepend(&self, other: &AsyncSequence<T>) -> AsyncSequence<T> {
        self.derive(ConcatNode {
            first: Arc::clone(&other.node),
            second: Arc::clone(&self.node),
        })
    }

    /// Concatenate `other` behind this sequence, lazily.
    pub fn append(&self, other: &AsyncSequence<T>) -> AsyncSequence<T> {
        self.derive(ConcatNode {
            first: Arc::clone(&self.node),
            second: Arc::clone(&other.node),
        })
    }

    /// Pair elements positionally with `other`, stopping at the shorter
    /// side. Pulls alternate strictly left-then-right, one in flight.
    pub fn zip<U>(&self, other: &AsyncSequence<U>) -> AsyncSequence<Pair<T, U>>
    where
        U: Clone + Send + Sync + 'static,
    {
        self.derive(ZipNode {
            left: Arc::clone(&self.node),
            right: Arc::clone(&other.node),
        })
    }

    /// Sort by the element type's own total order; eager on first pull.
    pub fn sort(&self) -> AsyncSequence<T>
    where
        T: Ord,
    {
        self.sort_by(NaturalOrder)
    }

    /// Sort with an explicit comparator; eager on first pull.
    pub fn sort_by<C>(&self, comparator: C) -> AsyncSequence<T>
    where
        C: Comparator<T> + 'static,
    {
        self.derive(SortNode {
            upstream: Arc::clone(&self.node),
            comparator: Arc::new(comparator),
        })
    }

    /// Reverse the sequence via block buffering, like the synchronous
    /// stage.
    pub fn reverse(&self) -> AsyncSequence<T> {
        self.derive(ReverseNode {
            upstream: Arc::clone(&self.node),
        })
    }

    /// Rebuild the pipeline through `build` when `condition` holds.
    pub fn when(
        &self,
        condition: bool,
        build: impl FnOnce(AsyncSequence<T>) -> AsyncSequence<T>,
    ) -> AsyncSequence<T> {
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
        build: impl FnOnce(AsyncSequence<T>) -> AsyncSequence<T>,
    ) -> AsyncSequence<T> {
        self.when(!condition, build)
    }

    /// Rebuild the pipeline through `build` if it turns out to be empty;
    /// the probe runs when the result is consumed.
    pub fn when_empty<F>(&self, build: F) -> AsyncSequence<T>
    where
        F: Fn(AsyncSequence<T>) -> AsyncSequence<T> + Send + Sync + 'static,
    {
        self.derive(WhenEmptyNode {
            upstream: Arc::clone(&self.node),
            rebuild: Arc::new(build),
            trigger_on_empty: true,
        })
    }

    /// Rebuild the pipeline through `build` if it turns out to be
    /// non-empty; the probed element is resumed into the rebuilt pipeline.
    pub fn when_not_empty<F>(&self, build: F) -> AsyncSequence<T>
    where
        F: Fn(AsyncSequence<T>) -> AsyncSequence<T> + Send + Sync + 'static,
    {
        self.derive(WhenEmptyNode {
            upstream: Arc::clone(&self.node),
            rebuild: Arc::new(build),
            trigger_on_empty: false,
        })
    }

    /// Hand the whole pipeline to `f` and return its result directly.
    pub fn pipe<R>(&self, f: impl FnOnce(AsyncSequence<T>) -> R) -> R {
        f(self.clone())
    }

    /// Invoke `f` with the pipeline and pass the sequence through
    /// unchanged.
    pub fn tap(&self, f: impl FnOnce(&AsyncSequence<T>)) -> AsyncSequence<T> {
        f(self);
        self.clone()
    }
}

// ============================================================================
// Concat Stage
// ============================================================================

struct ConcatNode<T> {
    first: Arc<dyn AsyncNode<T>>,
    second: Arc<dyn AsyncNode<T>>,
}

impl<T> AsyncNode<T> for ConcatNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
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
    active: AsyncCursor<T>,
    second: Option<Arc<dyn AsyncNode<T>>>,
    config: PipelineConfig,
}

impl<T> AsyncPull<T> for ConcatCursor<T>
where
    T: Send + Sync + 'static,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            loop {
                if let Some(item) = self.active.pull().await? {
                    return Ok(Some(item));
                }
                match self.second.take() {
                    Some(node) => self.active = node.open(&self.config)?,
                    None => return Ok(None),
                }
            }
        })
    }
}

// ============================================================================
// Zip Stage
// ============================================================================

struct ZipNode<T, U> {
    left: Arc<dyn AsyncNode<T>>,
    right: Arc<dyn AsyncNode<U>>,
}

impl<T, U> AsyncNode<Pair<T, U>> for ZipNode<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<Pair<T, U>>> {
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
    left: AsyncCursor<T>,
    right: AsyncCursor<U>,
    done: bool,
}

impl<T, U> AsyncPull<Pair<T, U>> for ZipCursor<T, U>
where
    T: Send,
    U: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Pair<T, U>>>> {
        Box::pin(async move {
            if self.done {
                return Ok(None);
            }
            let Some(left) = self.left.pull().await? else {
                self.done = true;
                return Ok(None);
            };
            let Some(right) = self.right.pull().await? else {
                self.done = true;
                return Ok(None);
            };
            Ok(Some(Pair::new(left, right)))
        })
    }
}

// ============================================================================
// Sort Stage
// ============================================================================

struct SortNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    comparator: Arc<dyn Comparator<T>>,
}

impl<T> AsyncNode<T> for SortNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
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
    upstream: Option<AsyncCursor<T>>,
    comparator: Arc<dyn Comparator<T>>,
    sorted: Option<std::vec::IntoIter<T>>,
}

impl<T> AsyncPull<T> for SortCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            if self.sorted.is_none() {
                let Some(mut upstream) = self.upstream.take() else {
                    return Ok(None);
                };
                let mut items = Vec::new();
                while let Some(item) = upstream.pull().await? {
                    items.push(item);
                }
                tracing::trace!(len = items.len(), "materialized pipeline for sort");
                items.sort_by(|a, b| self.comparator.compare(a, b));
                self.sorted = Some(items.into_iter());
            }
            Ok(self.sorted.as_mut().and_then(Iterator::next))
        })
    }
}

// ============================================================================
// Reverse Stage
// ============================================================================

struct ReverseNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
}

impl<T> AsyncNode<T> for ReverseNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
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
    upstream: Option<AsyncCursor<T>>,
    block_size: usize,
    blocks: Option<Vec<Vec<T>>>,
}

impl<T> AsyncPull<T> for ReverseCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            if self.blocks.is_none() {
                let Some(mut upstream) = self.upstream.take() else {
                    return Ok(None);
                };
                let mut blocks: Vec<Vec<T>> = Vec::new();
                let mut block = Vec::with_capacity(self.block_size.min(64));
                while let Some(item) = upstream.pull().await? {
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
        })
    }
}

// ============================================================================
// Conditional Rebuild Stage
// ============================================================================

struct WhenEmptyNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    rebuild: Arc<dyn Fn(AsyncSequence<T>) -> AsyncSequence<T> + Send + Sync>,
    trigger_on_empty: bool,
}

impl<T> AsyncNode<T> for WhenEmptyNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
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
    upstream: Arc<dyn AsyncNode<T>>,
    rebuild: Arc<dyn Fn(AsyncSequence<T>) -> AsyncSequence<T> + Send + Sync>,
    trigger_on_empty: bool,
    delegate: Option<AsyncCursor<T>>,
    config: PipelineConfig,
}

impl<T> AsyncPull<T> for WhenEmptyCursor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            if self.delegate.is_none() {
                let mut probe = self.upstream.open(&self.config)?;
                let first = probe.pull().await?;
                let is_empty = first.is_none();
                tracing::trace!(
                    empty = is_empty,
                    rebuilding = is_empty == self.trigger_on_empty,
                    "probed pipeline for emptiness"
                );
                let delegate = if is_empty == self.trigger_on_empty {
                    let base = if is_empty {
                        AsyncSequence {
                            node: Arc::clone(&self.upstream),
                            config: self.config,
                        }
                    } else {
                        AsyncSequence {
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
                Some(delegate) => delegate.pull().await,
                None => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::mapper;

    #[tokio::test]
    async fn test_concat_order() {
        let middle = AsyncSequence::from_vec(vec![2]);
        let all = middle
            .prepend(&AsyncSequence::from_vec(vec![1]))
            .append(&AsyncSequence::from_vec(vec![3]));
        assert_eq!(all.to_vec().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_zip_truncates_both_ways() {
        let short = AsyncSequence::from_vec(vec!["a", "b", "c"]);
        let long = AsyncSequence::from_vec(vec![1, 2, 3, 4]);
        assert_eq!(short.zip(&long).count().await.unwrap(), 3);
        assert_eq!(long.zip(&short).count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_sort_and_reverse() {
        let seq = AsyncSequence::from_vec(vec![3, 1, 2]);
        assert_eq!(seq.sort().to_vec().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(seq.reverse().to_vec().await.unwrap(), vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_when_empty_substitutes_a_fallback() {
        let empty = AsyncSequence::<i32>::empty();
        let fallback = empty.when_empty(|_| AsyncSequence::from_vec(vec![5]));
        assert_eq!(fallback.to_vec().await.unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_when_not_empty_keeps_the_probed_element() {
        let seq = AsyncSequence::from_stream(futures::stream::iter(vec![1, 2]));
        let doubled = seq.when_not_empty(|s| s.map(mapper(|n: i32, _| n * 2)));
        assert_eq!(doubled.to_vec().await.unwrap(), vec![2, 4]);
    }
}

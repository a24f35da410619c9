//! Positional selection stages for asynchronous pipelines.

use std::sync::Arc;

use futures::future::BoxFuture;
use smallvec::SmallVec;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::strategy::{predicate, AsyncPredicate, Negate};

use super::{drain_count, AsyncCursor, AsyncNode, AsyncPull, AsyncSequence};

impl<T> AsyncSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Keep the first `n` elements; a negative `n` is relative to the end
    /// and sizes the upstream with an extra traversal first.
    pub fn take(&self, n: isize) -> AsyncSequence<T> {
        self.derive(TakeNode {
            upstream: Arc::clone(&self.node),
            count: n,
        })
    }

    /// Drop the first `n` elements; a negative `n` is relative to the end
    /// and sizes the upstream like [`AsyncSequence::take`].
    pub fn skip(&self, n: isize) -> AsyncSequence<T> {
        self.derive(SkipNode {
            upstream: Arc::clone(&self.node),
            count: n,
        })
    }

    /// Yield elements up to, and excluding, the first match; the upstream
    /// is not pulled past the match.
    pub fn take_until<P>(&self, until: P) -> AsyncSequence<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.derive(TakeUntilNode {
            upstream: Arc::clone(&self.node),
            until: Arc::new(until),
        })
    }

    /// Yield elements while the predicate holds; [`AsyncSequence::take_until`]
    /// with the predicate negated.
    pub fn take_while<P>(&self, while_: P) -> AsyncSequence<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.take_until(Negate::new(while_))
    }

    /// Discard elements before the first match, then yield from the match
    /// onward (the matching element is included).
    pub fn skip_until<P>(&self, until: P) -> AsyncSequence<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.derive(SkipUntilNode {
            upstream: Arc::clone(&self.node),
            until: Arc::new(until),
        })
    }

    /// Discard elements while the predicate holds;
    /// [`AsyncSequence::skip_until`] with the predicate negated.
    pub fn skip_while<P>(&self, while_: P) -> AsyncSequence<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.skip_until(Negate::new(while_))
    }

    /// Keep the elements at positions `0, step, 2·step, ...`.
    pub fn nth(&self, step: usize) -> AsyncSequence<T> {
        debug_assert!(step > 0, "nth step must be non-zero");
        self.filter(predicate(move |_: &T, index| index % step == 0))
    }

    /// Splice `items` immediately before the first match; without a match
    /// the sequence passes through unchanged.
    pub fn insert_before<P>(&self, at: P, items: Vec<T>) -> AsyncSequence<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.derive(InsertNode {
            upstream: Arc::clone(&self.node),
            at: Arc::new(at),
            items: Arc::new(items),
            placement: Placement::Before,
        })
    }

    /// Splice `items` immediately after the first match; without a match
    /// the sequence passes through unchanged.
    pub fn insert_after<P>(&self, at: P, items: Vec<T>) -> AsyncSequence<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.derive(InsertNode {
            upstream: Arc::clone(&self.node),
            at: Arc::new(at),
            items: Arc::new(items),
            placement: Placement::After,
        })
    }
}

// ============================================================================
// Take / Skip Stages
// ============================================================================

struct TakeNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    count: isize,
}

impl<T> AsyncNode<T> for TakeNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(TakeCursor {
            node: Arc::clone(&self.upstream),
            config: *config,
            count: self.count,
            inner: None,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct TakeCursor<T> {
    node: Arc<dyn AsyncNode<T>>,
    config: PipelineConfig,
    count: isize,
    /// Upstream cursor plus the remaining quota, resolved at first pull
    /// (negative quotas need the upstream length).
    inner: Option<(AsyncCursor<T>, usize)>,
}

impl<T> AsyncPull<T> for TakeCursor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            if self.inner.is_none() {
                let remaining = if self.count >= 0 {
                    self.count as usize
                } else {
                    let len = drain_count(self.node.open(&self.config)?).await?;
                    tracing::debug!(len, shift = self.count, "sized upstream for negative take");
                    len.saturating_sub(self.count.unsigned_abs())
                };
                self.inner = Some((self.node.open(&self.config)?, remaining));
            }
            let Some((upstream, remaining)) = self.inner.as_mut() else {
                return Ok(None);
            };
            if *remaining == 0 {
                return Ok(None);
            }
            match upstream.pull().await? {
                Some(item) => {
                    *remaining -= 1;
                    Ok(Some(item))
                }
                None => {
                    *remaining = 0;
                    Ok(None)
                }
            }
        })
    }
}

struct SkipNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    count: isize,
}

impl<T> AsyncNode<T> for SkipNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(SkipCursor {
            node: Arc::clone(&self.upstream),
            config: *config,
            count: self.count,
            inner: None,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct SkipCursor<T> {
    node: Arc<dyn AsyncNode<T>>,
    config: PipelineConfig,
    count: isize,
    inner: Option<(AsyncCursor<T>, usize)>,
}

impl<T> AsyncPull<T> for SkipCursor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            if self.inner.is_none() {
                let to_skip = if self.count >= 0 {
                    self.count as usize
                } else {
                    let len = drain_count(self.node.open(&self.config)?).await?;
                    tracing::debug!(len, shift = self.count, "sized upstream for negative skip");
                    len.saturating_sub(self.count.unsigned_abs())
                };
                self.inner = Some((self.node.open(&self.config)?, to_skip));
            }
            let Some((upstream, to_skip)) = self.inner.as_mut() else {
                return Ok(None);
            };
            while *to_skip > 0 {
                if upstream.pull().await?.is_none() {
                    *to_skip = 0;
                    return Ok(None);
                }
                *to_skip -= 1;
            }
            upstream.pull().await
        })
    }
}

// ============================================================================
// TakeUntil / SkipUntil Stages
// ============================================================================

struct TakeUntilNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    until: Arc<dyn AsyncPredicate<T>>,
}

impl<T> AsyncNode<T> for TakeUntilNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(TakeUntilCursor {
            upstream: self.upstream.open(config)?,
            until: Arc::clone(&self.until),
            done: false,
            index: 0,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct TakeUntilCursor<T> {
    upstream: AsyncCursor<T>,
    until: Arc<dyn AsyncPredicate<T>>,
    done: bool,
    index: usize,
    config: PipelineConfig,
}

impl<T> AsyncPull<T> for TakeUntilCursor<T>
where
    T: Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            if self.done {
                return Ok(None);
            }
            match self.upstream.pull().await? {
                Some(item) => {
                    let index = self.config.next_index(&mut self.index)?;
                    if self.until.test(&item, index).await? {
                        self.done = true;
                        Ok(None)
                    } else {
                        Ok(Some(item))
                    }
                }
                None => {
                    self.done = true;
                    Ok(None)
                }
            }
        })
    }
}

struct SkipUntilNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    until: Arc<dyn AsyncPredicate<T>>,
}

impl<T> AsyncNode<T> for SkipUntilNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(SkipUntilCursor {
            upstream: self.upstream.open(config)?,
            until: Arc::clone(&self.until),
            skipping: true,
            index: 0,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct SkipUntilCursor<T> {
    upstream: AsyncCursor<T>,
    until: Arc<dyn AsyncPredicate<T>>,
    skipping: bool,
    index: usize,
    config: PipelineConfig,
}

impl<T> AsyncPull<T> for SkipUntilCursor<T>
where
    T: Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            while self.skipping {
                match self.upstream.pull().await? {
                    Some(item) => {
                        let index = self.config.next_index(&mut self.index)?;
                        if self.until.test(&item, index).await? {
                            self.skipping = false;
                            return Ok(Some(item));
                        }
                    }
                    None => return Ok(None),
                }
            }
            self.upstream.pull().await
        })
    }
}

// ============================================================================
// Insert Stages
// ============================================================================

#[derive(Clone, Copy)]
enum Placement {
    Before,
    After,
}

struct InsertNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    at: Arc<dyn AsyncPredicate<T>>,
    items: Arc<Vec<T>>,
    placement: Placement,
}

impl<T> AsyncNode<T> for InsertNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(InsertCursor {
            upstream: self.upstream.open(config)?,
            at: Arc::clone(&self.at),
            items: Arc::clone(&self.items),
            placement: self.placement,
            pending: SmallVec::new(),
            pending_next: 0,
            matched: false,
            index: 0,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct InsertCursor<T> {
    upstream: AsyncCursor<T>,
    at: Arc<dyn AsyncPredicate<T>>,
    items: Arc<Vec<T>>,
    placement: Placement,
    pending: SmallVec<[T; 4]>,
    pending_next: usize,
    matched: bool,
    index: usize,
    config: PipelineConfig,
}

impl<T> AsyncPull<T> for InsertCursor<T>
where
    T: Clone + Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            if self.pending_next < self.pending.len() {
                let item = self.pending[self.pending_next].clone();
                self.pending_next += 1;
                if self.pending_next == self.pending.len() {
                    self.pending.clear();
                }
                return Ok(Some(item));
            }
            match self.upstream.pull().await? {
                Some(item) => {
                    if self.matched {
                        return Ok(Some(item));
                    }
                    let index = self.config.next_index(&mut self.index)?;
                    if !self.at.test(&item, index).await? {
                        return Ok(Some(item));
                    }
                    self.matched = true;
                    match self.placement {
                        Placement::Before => {
                            self.pending.extend(self.items.iter().cloned());
                            self.pending.push(item);
                            self.pending_next = 1;
                            Ok(Some(self.pending[0].clone()))
                        }
                        Placement::After => {
                            self.pending.extend(self.items.iter().cloned());
                            self.pending_next = 0;
                            Ok(Some(item))
                        }
                    }
                }
                None => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::async_predicate;

    #[tokio::test]
    async fn test_take_and_skip_negative_forms() {
        let seq = AsyncSequence::from_vec((1..=10).collect::<Vec<_>>());
        assert_eq!(
            seq.take(-2).to_vec().await.unwrap(),
            (1..=8).collect::<Vec<_>>(),
        );
        assert_eq!(seq.skip(-2).to_vec().await.unwrap(), vec![9, 10]);
    }

    #[tokio::test]
    async fn test_take_until_stops_at_a_suspending_match() {
        let seq = AsyncSequence::from_vec(vec![1, 2, 3, 4]);
        let head = seq.take_until(async_predicate(|n: i32, _| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                Ok(n == 3)
            })
        }));
        assert_eq!(head.to_vec().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_insert_before_and_no_match_passthrough() {
        let seq = AsyncSequence::from_vec(vec![1, 2, 3]);
        let spliced = seq.insert_before(predicate(|n: &i32, _| *n == 2), vec![10]);
        assert_eq!(spliced.to_vec().await.unwrap(), vec![1, 10, 2, 3]);

        let untouched = seq.insert_after(predicate(|n: &i32, _| *n == 42), vec![10]);
        assert_eq!(untouched.to_vec().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_nth_filters_on_position() {
        let seq = AsyncSequence::from_vec(vec![10, 11, 12, 13, 14]);
        assert_eq!(seq.nth(2).to_vec().await.unwrap(), vec![10, 12, 14]);
    }
}

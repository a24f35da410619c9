//! Stateless transform stages for asynchronous pipelines.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::strategy::{AsyncMapper, AsyncPredicate};

use super::{AsyncCursor, AsyncNode, AsyncPull, AsyncSequence};

impl<T> AsyncSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Keep only the elements the predicate accepts.
    ///
    /// Counts every upstream element it considers, like the synchronous
    /// stage; the predicate's verdict may suspend.
    pub fn filter<P>(&self, predicate: P) -> AsyncSequence<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.derive(FilterNode {
            upstream: Arc::clone(&self.node),
            predicate: Arc::new(predicate),
        })
    }

    /// Replace every element with the mapper's output.
    pub fn map<Out, M>(&self, mapper: M) -> AsyncSequence<Out>
    where
        Out: Clone + Send + Sync + 'static,
        M: AsyncMapper<T, Out> + 'static,
    {
        self.derive(MapNode {
            upstream: Arc::clone(&self.node),
            mapper: Arc::new(mapper),
        })
    }

    /// Map the elements the predicate accepts; pass the rest through
    /// unchanged.
    pub fn update<P, M>(&self, predicate: P, mapper: M) -> AsyncSequence<T>
    where
        P: AsyncPredicate<T> + 'static,
        M: AsyncMapper<T, T> + 'static,
    {
        self.derive(UpdateNode {
            upstream: Arc::clone(&self.node),
            predicate: Arc::new(predicate),
            mapper: Arc::new(mapper),
        })
    }

    /// Map every element to a sub-pipeline and splice each sub-pipeline
    /// into the output before the next upstream element.
    pub fn flat_map<Out, M>(&self, mapper: M) -> AsyncSequence<Out>
    where
        Out: Clone + Send + Sync + 'static,
        M: AsyncMapper<T, AsyncSequence<Out>> + 'static,
    {
        self.derive(FlatMapNode {
            upstream: Arc::clone(&self.node),
            mapper: Arc::new(mapper),
        })
    }
}

impl<T> AsyncSequence<AsyncSequence<T>>
where
    T: Clone + Send + Sync + 'static,
{
    /// Flatten one level of nested pipelines.
    pub fn collapse(&self) -> AsyncSequence<T> {
        self.derive(CollapseNode {
            upstream: Arc::clone(&self.node),
            _item: PhantomData,
        })
    }
}

impl<T> AsyncSequence<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    /// Flatten one level of vector groups.
    pub fn collapse(&self) -> AsyncSequence<T> {
        self.derive(CollapseNode {
            upstream: Arc::clone(&self.node),
            _item: PhantomData,
        })
    }
}

// ============================================================================
// Filter Stage
// ============================================================================

struct FilterNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    predicate: Arc<dyn AsyncPredicate<T>>,
}

impl<T> AsyncNode<T> for FilterNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(FilterCursor {
            upstream: self.upstream.open(config)?,
            predicate: Arc::clone(&self.predicate),
            index: 0,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct FilterCursor<T> {
    upstream: AsyncCursor<T>,
    predicate: Arc<dyn AsyncPredicate<T>>,
    index: usize,
    config: PipelineConfig,
}

impl<T> AsyncPull<T> for FilterCursor<T>
where
    T: Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            while let Some(item) = self.upstream.pull().await? {
                let index = self.config.next_index(&mut self.index)?;
                if self.predicate.test(&item, index).await? {
                    return Ok(Some(item));
                }
            }
            Ok(None)
        })
    }
}

// ============================================================================
// Map Stage
// ============================================================================

struct MapNode<T, Out> {
    upstream: Arc<dyn AsyncNode<T>>,
    mapper: Arc<dyn AsyncMapper<T, Out>>,
}

impl<T, Out> AsyncNode<Out> for MapNode<T, Out>
where
    T: Clone + Send + Sync + 'static,
    Out: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<Out>> {
        Ok(Box::new(MapCursor {
            upstream: self.upstream.open(config)?,
            mapper: Arc::clone(&self.mapper),
            index: 0,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct MapCursor<T, Out> {
    upstream: AsyncCursor<T>,
    mapper: Arc<dyn AsyncMapper<T, Out>>,
    index: usize,
    config: PipelineConfig,
}

impl<T, Out> AsyncPull<Out> for MapCursor<T, Out>
where
    T: Send,
    Out: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Out>>> {
        Box::pin(async move {
            match self.upstream.pull().await? {
                Some(item) => {
                    let index = self.config.next_index(&mut self.index)?;
                    Ok(Some(self.mapper.apply(item, index).await?))
                }
                None => Ok(None),
            }
        })
    }
}

// ============================================================================
// Update Stage
// ============================================================================

struct UpdateNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    predicate: Arc<dyn AsyncPredicate<T>>,
    mapper: Arc<dyn AsyncMapper<T, T>>,
}

impl<T> AsyncNode<T> for UpdateNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(UpdateCursor {
            upstream: self.upstream.open(config)?,
            predicate: Arc::clone(&self.predicate),
            mapper: Arc::clone(&self.mapper),
            index: 0,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct UpdateCursor<T> {
    upstream: AsyncCursor<T>,
    predicate: Arc<dyn AsyncPredicate<T>>,
    mapper: Arc<dyn AsyncMapper<T, T>>,
    index: usize,
    config: PipelineConfig,
}

impl<T> AsyncPull<T> for UpdateCursor<T>
where
    T: Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            match self.upstream.pull().await? {
                Some(item) => {
                    let index = self.config.next_index(&mut self.index)?;
                    if self.predicate.test(&item, index).await? {
                        Ok(Some(self.mapper.apply(item, index).await?))
                    } else {
                        Ok(Some(item))
                    }
                }
                None => Ok(None),
            }
        })
    }
}

// ============================================================================
// FlatMap Stage
// ============================================================================

struct FlatMapNode<T, Out> {
    upstream: Arc<dyn AsyncNode<T>>,
    mapper: Arc<dyn AsyncMapper<T, AsyncSequence<Out>>>,
}

impl<T, Out> AsyncNode<Out> for FlatMapNode<T, Out>
where
    T: Clone + Send + Sync + 'static,
    Out: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<Out>> {
        Ok(Box::new(FlatMapCursor {
            upstream: self.upstream.open(config)?,
            mapper: Arc::clone(&self.mapper),
            active: None,
            index: 0,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct FlatMapCursor<T, Out> {
    upstream: AsyncCursor<T>,
    mapper: Arc<dyn AsyncMapper<T, AsyncSequence<Out>>>,
    active: Option<AsyncCursor<Out>>,
    index: usize,
    config: PipelineConfig,
}

impl<T, Out> AsyncPull<Out> for FlatMapCursor<T, Out>
where
    T: Send,
    Out: Clone + Send + Sync + 'static,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Out>>> {
        Box::pin(async move {
            loop {
                if let Some(active) = self.active.as_mut() {
                    if let Some(item) = active.pull().await? {
                        return Ok(Some(item));
                    }
                    self.active = None;
                }
                match self.upstream.pull().await? {
                    Some(item) => {
                        let index = self.config.next_index(&mut self.index)?;
                        let sub = self.mapper.apply(item, index).await?;
                        self.active = Some(sub.open_cursor()?);
                    }
                    None => return Ok(None),
                }
            }
        })
    }
}

// ============================================================================
// Collapse Stage
// ============================================================================

/// Element shapes the asynchronous `collapse` can flatten.
trait Nested<T>: Clone + Send + Sync + 'static {
    fn into_cursor(self) -> Result<AsyncCursor<T>>;
}

impl<T> Nested<T> for AsyncSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn into_cursor(self) -> Result<AsyncCursor<T>> {
        self.open_cursor()
    }
}

impl<T> Nested<T> for Vec<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn into_cursor(self) -> Result<AsyncCursor<T>> {
        Ok(Box::new(OwnedVecCursor {
            iter: self.into_iter(),
        }))
    }
}

struct OwnedVecCursor<T> {
    iter: std::vec::IntoIter<T>,
}

impl<T> AsyncPull<T> for OwnedVecCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(std::future::ready(Ok(self.iter.next())))
    }
}

struct CollapseNode<U, T> {
    upstream: Arc<dyn AsyncNode<U>>,
    _item: PhantomData<fn() -> T>,
}

impl<U, T> AsyncNode<T> for CollapseNode<U, T>
where
    U: Nested<T>,
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(CollapseCursor {
            upstream: self.upstream.open(config)?,
            active: None,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct CollapseCursor<U, T> {
    upstream: AsyncCursor<U>,
    active: Option<AsyncCursor<T>>,
}

impl<U, T> AsyncPull<T> for CollapseCursor<U, T>
where
    U: Nested<T>,
    T: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            loop {
                if let Some(active) = self.active.as_mut() {
                    if let Some(item) = active.pull().await? {
                        return Ok(Some(item));
                    }
                    self.active = None;
                }
                match self.upstream.pull().await? {
                    Some(nested) => self.active = Some(nested.into_cursor()?),
                    None => return Ok(None),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{async_mapper, async_predicate, mapper, predicate};

    #[tokio::test]
    async fn test_filter_with_a_suspending_predicate() {
        let seq = AsyncSequence::from_vec(vec![1, 2, 3, 4]);
        let odd = seq.filter(async_predicate(|n: i32, _| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                Ok(n % 2 == 1)
            })
        }));
        assert_eq!(odd.to_vec().await.unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_synchronous_strategies_work_unchanged() {
        let seq = AsyncSequence::from_vec(vec![1, 2, 3]);
        let tripled = seq
            .filter(predicate(|n: &i32, _| *n > 1))
            .map(mapper(|n: i32, _| n * 3));
        assert_eq!(tripled.to_vec().await.unwrap(), vec![6, 9]);
    }

    #[tokio::test]
    async fn test_flat_map_splices_sub_pipelines() {
        let seq = AsyncSequence::from_vec(vec![1, 2]);
        let spliced = seq.flat_map(async_mapper(|n: i32, _| {
            Box::pin(async move { Ok(AsyncSequence::from_vec(vec![n, n * 10])) })
        }));
        assert_eq!(spliced.to_vec().await.unwrap(), vec![1, 10, 2, 20]);
    }

    #[tokio::test]
    async fn test_collapse_flattens_groups() {
        let groups = AsyncSequence::from_vec(vec![vec![1, 2], vec![3]]);
        assert_eq!(groups.collapse().to_vec().await.unwrap(), vec![1, 2, 3]);
    }
}

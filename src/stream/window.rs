//! Windowing and partitioning stages for asynchronous pipelines.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::pair::Pair;
use crate::strategy::{identity, AsyncBoundaryPredicate, AsyncKeySelector, AsyncPredicate};

use super::{AsyncCursor, AsyncNode, AsyncPull, AsyncSequence};

impl<T> AsyncSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Group consecutive elements into fixed-size blocks; the final block
    /// may be shorter. A zero size is a caller contract violation.
    pub fn chunk(&self, size: usize) -> AsyncSequence<Vec<T>> {
        debug_assert!(size > 0, "chunk size must be non-zero");
        self.derive(ChunkNode {
            upstream: Arc::clone(&self.node),
            size,
        })
    }

    /// Group consecutive elements, starting a new group whenever the
    /// boundary predicate rejects an element. The first element opens the
    /// first group without consulting it.
    pub fn chunk_while<B>(&self, boundary: B) -> AsyncSequence<Vec<T>>
    where
        B: AsyncBoundaryPredicate<T> + 'static,
    {
        self.derive(ChunkWhileNode {
            upstream: Arc::clone(&self.node),
            boundary: Arc::new(boundary),
        })
    }

    /// Divide the sequence into exactly `parts` contiguous groups, earliest
    /// groups absorbing the remainder. Buffers the upstream on first pull.
    pub fn split(&self, parts: usize) -> AsyncSequence<Vec<T>> {
        debug_assert!(parts > 0, "split requires at least one group");
        self.derive(SplitNode {
            upstream: Arc::clone(&self.node),
            parts,
        })
    }

    /// Separate the sequence into the matching elements and the rest, as
    /// exactly two groups in original relative order.
    pub fn partition<P>(&self, predicate: P) -> AsyncSequence<Vec<T>>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.derive(PartitionNode {
            upstream: Arc::clone(&self.node),
            predicate: Arc::new(predicate),
        })
    }

    /// Bucket elements by a derived key, in first-seen key order.
    pub fn group_by<K, S>(&self, selector: S) -> AsyncSequence<Pair<K, Vec<T>>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        S: AsyncKeySelector<T, K> + 'static,
    {
        self.derive(GroupByNode {
            upstream: Arc::clone(&self.node),
            selector: Arc::new(selector),
        })
    }

    /// Bucket elements by their own value.
    pub fn group(&self) -> AsyncSequence<Pair<T, Vec<T>>>
    where
        T: Eq + Hash,
    {
        self.group_by(identity())
    }

    /// Count elements per derived key, in first-seen key order.
    pub fn count_by<K, S>(&self, selector: S) -> AsyncSequence<Pair<K, usize>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        S: AsyncKeySelector<T, K> + 'static,
    {
        self.derive(CountByNode {
            upstream: Arc::clone(&self.node),
            selector: Arc::new(selector),
        })
    }

    /// Count occurrences of each distinct element.
    pub fn counts(&self) -> AsyncSequence<Pair<T, usize>>
    where
        T: Eq + Hash,
    {
        self.count_by(identity())
    }

    /// Keep only the first element seen for each derived key.
    pub fn unique_by<K, S>(&self, selector: S) -> AsyncSequence<T>
    where
        K: Eq + Hash + Send + Sync + 'static,
        S: AsyncKeySelector<T, K> + 'static,
    {
        self.derive(UniqueNode {
            upstream: Arc::clone(&self.node),
            selector: Arc::new(selector),
        })
    }

    /// Keep only the first occurrence of each distinct element.
    pub fn unique(&self) -> AsyncSequence<T>
    where
        T: Eq + Hash,
    {
        self.unique_by(identity())
    }

    /// Overlapping windows of `size` consecutive elements.
    ///
    /// Declared but not implemented, like the synchronous stage: raises
    /// [`Error::Unimplemented`] when the pipeline is consumed.
    pub fn sliding(&self, size: usize, step: Option<usize>) -> AsyncSequence<Vec<T>> {
        self.derive(SlidingNode {
            upstream: Arc::clone(&self.node),
            size,
            step,
        })
    }
}

// ============================================================================
// Chunk Stage
// ============================================================================

struct ChunkNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    size: usize,
}

impl<T> AsyncNode<Vec<T>> for ChunkNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<Vec<T>>> {
        Ok(Box::new(ChunkCursor {
            upstream: self.upstream.open(config)?,
            size: self.size,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct ChunkCursor<T> {
    upstream: AsyncCursor<T>,
    size: usize,
}

impl<T> AsyncPull<Vec<T>> for ChunkCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Vec<T>>>> {
        Box::pin(async move {
            let mut group = Vec::new();
            while group.len() < self.size {
                match self.upstream.pull().await? {
                    Some(item) => group.push(item),
                    None => break,
                }
            }
            if group.is_empty() {
                Ok(None)
            } else {
                Ok(Some(group))
            }
        })
    }
}

// ============================================================================
// ChunkWhile Stage
// ============================================================================

struct ChunkWhileNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    boundary: Arc<dyn AsyncBoundaryPredicate<T>>,
}

impl<T> AsyncNode<Vec<T>> for ChunkWhileNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<Vec<T>>> {
        Ok(Box::new(ChunkWhileCursor {
            upstream: self.upstream.open(config)?,
            boundary: Arc::clone(&self.boundary),
            group: Vec::new(),
            index: 0,
            done: false,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct ChunkWhileCursor<T> {
    upstream: AsyncCursor<T>,
    boundary: Arc<dyn AsyncBoundaryPredicate<T>>,
    group: Vec<T>,
    index: usize,
    done: bool,
    config: PipelineConfig,
}

impl<T> AsyncPull<Vec<T>> for ChunkWhileCursor<T>
where
    T: Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Vec<T>>>> {
        Box::pin(async move {
            if self.done {
                return Ok(None);
            }
            loop {
                match self.upstream.pull().await? {
                    Some(item) => {
                        let index = self.config.next_index(&mut self.index)?;
                        if index == 0 || self.boundary.test(&item, index, &self.group).await? {
                            self.group.push(item);
                        } else {
                            let finished = std::mem::replace(&mut self.group, vec![item]);
                            return Ok(Some(finished));
                        }
                    }
                    None => {
                        self.done = true;
                        if self.group.is_empty() {
                            return Ok(None);
                        }
                        return Ok(Some(std::mem::take(&mut self.group)));
                    }
                }
            }
        })
    }
}

// ============================================================================
// Split Stage
// ============================================================================

struct SplitNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    parts: usize,
}

impl<T> AsyncNode<Vec<T>> for SplitNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<Vec<T>>> {
        Ok(Box::new(SplitCursor {
            upstream: Some(self.upstream.open(config)?),
            parts: self.parts,
            groups: None,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct SplitCursor<T> {
    upstream: Option<AsyncCursor<T>>,
    parts: usize,
    groups: Option<std::vec::IntoIter<Vec<T>>>,
}

impl<T> AsyncPull<Vec<T>> for SplitCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Vec<T>>>> {
        Box::pin(async move {
            if self.groups.is_none() {
                let Some(mut upstream) = self.upstream.take() else {
                    return Ok(None);
                };
                let mut items = Vec::new();
                while let Some(item) = upstream.pull().await? {
                    items.push(item);
                }
                tracing::trace!(total = items.len(), parts = self.parts, "sizing split input");

                let base = items.len() / self.parts;
                let remainder = items.len() % self.parts;
                let mut groups = Vec::with_capacity(self.parts);
                let mut rest = items;
                for position in 0..self.parts {
                    let take = base + usize::from(position < remainder);
                    let tail = rest.split_off(take.min(rest.len()));
                    groups.push(std::mem::replace(&mut rest, tail));
                }
                self.groups = Some(groups.into_iter());
            }
            Ok(self.groups.as_mut().and_then(Iterator::next))
        })
    }
}

// ============================================================================
// Partition Stage
// ============================================================================

struct PartitionNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    predicate: Arc<dyn AsyncPredicate<T>>,
}

impl<T> AsyncNode<Vec<T>> for PartitionNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<Vec<T>>> {
        Ok(Box::new(PartitionCursor {
            upstream: Some(self.upstream.open(config)?),
            predicate: Arc::clone(&self.predicate),
            groups: None,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct PartitionCursor<T> {
    upstream: Option<AsyncCursor<T>>,
    predicate: Arc<dyn AsyncPredicate<T>>,
    groups: Option<std::vec::IntoIter<Vec<T>>>,
    config: PipelineConfig,
}

impl<T> AsyncPull<Vec<T>> for PartitionCursor<T>
where
    T: Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Vec<T>>>> {
        Box::pin(async move {
            if self.groups.is_none() {
                let Some(mut upstream) = self.upstream.take() else {
                    return Ok(None);
                };
                let mut passed = Vec::new();
                let mut failed = Vec::new();
                let mut index = 0usize;
                while let Some(item) = upstream.pull().await? {
                    let position = self.config.next_index(&mut index)?;
                    if self.predicate.test(&item, position).await? {
                        passed.push(item);
                    } else {
                        failed.push(item);
                    }
                }
                self.groups = Some(vec![passed, failed].into_iter());
            }
            Ok(self.groups.as_mut().and_then(Iterator::next))
        })
    }
}

// ============================================================================
// GroupBy / CountBy Stages
// ============================================================================

/// Drain the upstream into first-seen-order buckets.
async fn collect_buckets<T, K>(
    mut upstream: AsyncCursor<T>,
    selector: &dyn AsyncKeySelector<T, K>,
    config: &PipelineConfig,
) -> Result<Vec<(K, Vec<T>)>>
where
    K: Eq + Hash + Clone,
{
    let mut buckets: Vec<(K, Vec<T>)> = Vec::new();
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut index = 0usize;
    while let Some(item) = upstream.pull().await? {
        let position = config.next_index(&mut index)?;
        let key = selector.select(&item, position).await?;
        match positions.get(&key) {
            Some(&slot) => buckets[slot].1.push(item),
            None => {
                positions.insert(key.clone(), buckets.len());
                buckets.push((key, vec![item]));
            }
        }
    }
    Ok(buckets)
}

struct GroupByNode<T, K> {
    upstream: Arc<dyn AsyncNode<T>>,
    selector: Arc<dyn AsyncKeySelector<T, K>>,
}

impl<T, K> AsyncNode<Pair<K, Vec<T>>> for GroupByNode<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<Pair<K, Vec<T>>>> {
        Ok(Box::new(GroupByCursor {
            upstream: Some(self.upstream.open(config)?),
            selector: Arc::clone(&self.selector),
            buckets: None,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct GroupByCursor<T, K> {
    upstream: Option<AsyncCursor<T>>,
    selector: Arc<dyn AsyncKeySelector<T, K>>,
    buckets: Option<std::vec::IntoIter<(K, Vec<T>)>>,
    config: PipelineConfig,
}

impl<T, K> AsyncPull<Pair<K, Vec<T>>> for GroupByCursor<T, K>
where
    T: Send + Sync,
    K: Eq + Hash + Clone + Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Pair<K, Vec<T>>>>> {
        Box::pin(async move {
            if self.buckets.is_none() {
                let Some(upstream) = self.upstream.take() else {
                    return Ok(None);
                };
                let buckets =
                    collect_buckets(upstream, self.selector.as_ref(), &self.config).await?;
                self.buckets = Some(buckets.into_iter());
            }
            Ok(self
                .buckets
                .as_mut()
                .and_then(Iterator::next)
                .map(Pair::from))
        })
    }
}

struct CountByNode<T, K> {
    upstream: Arc<dyn AsyncNode<T>>,
    selector: Arc<dyn AsyncKeySelector<T, K>>,
}

impl<T, K> AsyncNode<Pair<K, usize>> for CountByNode<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<Pair<K, usize>>> {
        Ok(Box::new(CountByCursor {
            upstream: Some(self.upstream.open(config)?),
            selector: Arc::clone(&self.selector),
            counts: None,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct CountByCursor<T, K> {
    upstream: Option<AsyncCursor<T>>,
    selector: Arc<dyn AsyncKeySelector<T, K>>,
    counts: Option<std::vec::IntoIter<(K, usize)>>,
    config: PipelineConfig,
}

impl<T, K> AsyncPull<Pair<K, usize>> for CountByCursor<T, K>
where
    T: Send + Sync,
    K: Eq + Hash + Clone + Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<Pair<K, usize>>>> {
        Box::pin(async move {
            if self.counts.is_none() {
                let Some(upstream) = self.upstream.take() else {
                    return Ok(None);
                };
                let buckets =
                    collect_buckets(upstream, self.selector.as_ref(), &self.config).await?;
                let counts: Vec<(K, usize)> = buckets
                    .into_iter()
                    .map(|(key, bucket)| (key, bucket.len()))
                    .collect();
                self.counts = Some(counts.into_iter());
            }
            Ok(self
                .counts
                .as_mut()
                .and_then(Iterator::next)
                .map(Pair::from))
        })
    }
}

// ============================================================================
// Unique Stage
// ============================================================================

struct UniqueNode<T, K> {
    upstream: Arc<dyn AsyncNode<T>>,
    selector: Arc<dyn AsyncKeySelector<T, K>>,
}

impl<T, K> AsyncNode<T> for UniqueNode<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(UniqueCursor {
            upstream: self.upstream.open(config)?,
            selector: Arc::clone(&self.selector),
            seen: HashSet::new(),
            index: 0,
            config: *config,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct UniqueCursor<T, K> {
    upstream: AsyncCursor<T>,
    selector: Arc<dyn AsyncKeySelector<T, K>>,
    seen: HashSet<K>,
    index: usize,
    config: PipelineConfig,
}

impl<T, K> AsyncPull<T> for UniqueCursor<T, K>
where
    T: Send + Sync,
    K: Eq + Hash + Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            while let Some(item) = self.upstream.pull().await? {
                let index = self.config.next_index(&mut self.index)?;
                let key = self.selector.select(&item, index).await?;
                if self.seen.insert(key) {
                    return Ok(Some(item));
                }
            }
            Ok(None)
        })
    }
}

// ============================================================================
// Sliding Stage (declared, unimplemented)
// ============================================================================

struct SlidingNode<T> {
    upstream: Arc<dyn AsyncNode<T>>,
    size: usize,
    step: Option<usize>,
}

impl<T> AsyncNode<Vec<T>> for SlidingNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, _config: &PipelineConfig) -> Result<AsyncCursor<Vec<T>>> {
        tracing::debug!(
            size = self.size,
            step = ?self.step,
            "sliding window traversal requested"
        );
        Err(Error::Unimplemented("sliding"))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{boundary, predicate, selector};

    #[tokio::test]
    async fn test_chunk_and_final_short_block() {
        let seq = AsyncSequence::from_vec((1..=5).collect::<Vec<_>>());
        let groups = seq.chunk(2).to_vec().await.unwrap();
        assert_eq!(groups, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[tokio::test]
    async fn test_chunk_while_groups_runs() {
        let seq = AsyncSequence::from_vec(vec![1, 1, 2, 3, 3]);
        let runs = seq
            .chunk_while(boundary(|item: &i32, _, group: &[i32]| {
                group.last() == Some(item)
            }))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(runs, vec![vec![1, 1], vec![2], vec![3, 3]]);
    }

    #[tokio::test]
    async fn test_split_matches_the_sync_distribution() {
        let seq = AsyncSequence::from_vec((1..=11).collect::<Vec<_>>());
        let sizes: Vec<usize> = seq
            .split(3)
            .to_vec()
            .await
            .unwrap()
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![4, 4, 3]);
    }

    #[tokio::test]
    async fn test_partition_produces_exactly_two_groups() {
        let seq = AsyncSequence::from_vec(vec![1, -1, 2, -2]);
        let groups = seq
            .partition(predicate(|n: &i32, _| *n > 0))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(groups, vec![vec![1, 2], vec![-1, -2]]);
    }

    #[tokio::test]
    async fn test_group_by_and_unique() {
        let seq = AsyncSequence::from_vec(vec![1, 2, 3, 4, 5]);
        let buckets = seq
            .group_by(selector(|n: &i32, _| n % 2))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(buckets[0].key, 1);
        assert_eq!(buckets[0].value, vec![1, 3, 5]);
        assert_eq!(buckets[1].value, vec![2, 4]);

        let dedup = AsyncSequence::from_vec(vec![1, 1, 2]).unique();
        assert_eq!(dedup.to_vec().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_sliding_is_unimplemented() {
        let seq = AsyncSequence::from_vec(vec![1, 2, 3]);
        let err = seq.sliding(2, Some(1)).to_vec().await.unwrap_err();
        assert!(matches!(err, Error::Unimplemented("sliding")));
    }
}

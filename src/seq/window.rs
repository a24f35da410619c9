//! Windowing and partitioning stages: chunk, chunk_while, split, partition,
//! grouping, counting, unique, sliding.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::pair::Pair;
use crate::strategy::{identity, BoundaryPredicate, KeySelector, Predicate};

use super::{Cursor, Node, Pull, Sequence};

impl<T> Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Group consecutive elements into fixed-size blocks.
    ///
    /// The final block may be shorter. A zero size is a caller contract
    /// violation.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cascade::prelude::*;
    ///
    /// let seq = Sequence::from_vec((1..=8).collect::<Vec<_>>());
    /// assert_eq!(
    ///     seq.chunk(4).to_vec().unwrap(),
    ///     vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]],
    /// );
    /// ```
    pub fn chunk(&self, size: usize) -> Sequence<Vec<T>> {
        debug_assert!(size > 0, "chunk size must be non-zero");
        self.derive(ChunkNode {
            upstream: Arc::clone(&self.node),
            size,
        })
    }

    /// Group consecutive elements, starting a new group whenever the
    /// boundary predicate rejects an element.
    ///
    /// The first element always opens the first group; the predicate is not
    /// consulted for index 0. Later elements are tested against the group
    /// built so far.
    pub fn chunk_while<B>(&self, boundary: B) -> Sequence<Vec<T>>
    where
        B: BoundaryPredicate<T> + 'static,
    {
        self.derive(ChunkWhileNode {
            upstream: Arc::clone(&self.node),
            boundary: Arc::new(boundary),
        })
    }

    /// Divide the sequence into exactly `parts` contiguous groups of
    /// near-equal size.
    ///
    /// When the length is not evenly divisible, the earliest groups each
    /// receive one extra element until the remainder is exhausted. Forces
    /// the upstream to be sized, so the whole input is buffered on first
    /// pull.
    pub fn split(&self, parts: usize) -> Sequence<Vec<T>> {
        debug_assert!(parts > 0, "split requires at least one group");
        self.derive(SplitNode {
            upstream: Arc::clone(&self.node),
            parts,
        })
    }

    /// Separate the sequence into exactly two groups: the elements the
    /// predicate accepts, then the rest, each in original relative order.
    pub fn partition<P>(&self, predicate: P) -> Sequence<Vec<T>>
    where
        P: Predicate<T> + 'static,
    {
        self.derive(PartitionNode {
            upstream: Arc::clone(&self.node),
            predicate: Arc::new(predicate),
        })
    }

    /// Bucket elements by a derived key.
    ///
    /// Buckets appear in first-seen key order; elements within a bucket
    /// keep their insertion order.
    pub fn group_by<K, S>(&self, selector: S) -> Sequence<Pair<K, Vec<T>>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        S: KeySelector<T, K> + 'static,
    {
        self.derive(GroupByNode {
            upstream: Arc::clone(&self.node),
            selector: Arc::new(selector),
        })
    }

    /// Bucket elements by their own value.
    pub fn group(&self) -> Sequence<Pair<T, Vec<T>>>
    where
        T: Eq + Hash,
    {
        self.group_by(identity())
    }

    /// Count elements per derived key.
    ///
    /// Same bucketing as [`Sequence::group_by`], but the output carries the
    /// bucket sizes instead of the buckets.
    pub fn count_by<K, S>(&self, selector: S) -> Sequence<Pair<K, usize>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        S: KeySelector<T, K> + 'static,
    {
        self.derive(CountByNode {
            upstream: Arc::clone(&self.node),
            selector: Arc::new(selector),
        })
    }

    /// Count occurrences of each distinct element.
    pub fn counts(&self) -> Sequence<Pair<T, usize>>
    where
        T: Eq + Hash,
    {
        self.count_by(identity())
    }

    /// Keep only the first element seen for each derived key, preserving
    /// the original order.
    pub fn unique_by<K, S>(&self, selector: S) -> Sequence<T>
    where
        K: Eq + Hash + Send + Sync + 'static,
        S: KeySelector<T, K> + 'static,
    {
        self.derive(UniqueNode {
            upstream: Arc::clone(&self.node),
            selector: Arc::new(selector),
        })
    }

    /// Keep only the first occurrence of each distinct element.
    pub fn unique(&self) -> Sequence<T>
    where
        T: Eq + Hash,
    {
        self.unique_by(identity())
    }

    /// Overlapping windows of `size` consecutive elements.
    ///
    /// Declared but not implemented: the stage raises
    /// [`Error::Unimplemented`] when the pipeline is consumed. The call
    /// itself stays lazy like every other operator.
    pub fn sliding(&self, size: usize, step: Option<usize>) -> Sequence<Vec<T>> {
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
    upstream: Arc<dyn Node<T>>,
    size: usize,
}

impl<T> Node<Vec<T>> for ChunkNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<Vec<T>>> {
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
    upstream: Cursor<T>,
    size: usize,
}

impl<T> Pull<Vec<T>> for ChunkCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<Vec<T>>> {
        let mut group = Vec::new();
        while group.len() < self.size {
            match self.upstream.pull()? {
                Some(item) => group.push(item),
                None => break,
            }
        }
        if group.is_empty() {
            Ok(None)
        } else {
            Ok(Some(group))
        }
    }
}

// ============================================================================
// ChunkWhile Stage
// ============================================================================

struct ChunkWhileNode<T> {
    upstream: Arc<dyn Node<T>>,
    boundary: Arc<dyn BoundaryPredicate<T>>,
}

impl<T> Node<Vec<T>> for ChunkWhileNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<Vec<T>>> {
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
    upstream: Cursor<T>,
    boundary: Arc<dyn BoundaryPredicate<T>>,
    group: Vec<T>,
    index: usize,
    done: bool,
    config: PipelineConfig,
}

impl<T> Pull<Vec<T>> for ChunkWhileCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<Vec<T>>> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.upstream.pull()? {
                Some(item) => {
                    let index = self.config.next_index(&mut self.index)?;
                    if index == 0 || self.boundary.test(&item, index, &self.group)? {
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
    }
}

// ============================================================================
// Split Stage
// ============================================================================

struct SplitNode<T> {
    upstream: Arc<dyn Node<T>>,
    parts: usize,
}

impl<T> Node<Vec<T>> for SplitNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<Vec<T>>> {
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
    upstream: Option<Cursor<T>>,
    parts: usize,
    groups: Option<std::vec::IntoIter<Vec<T>>>,
}

impl<T> Pull<Vec<T>> for SplitCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<Vec<T>>> {
        if self.groups.is_none() {
            let Some(mut upstream) = self.upstream.take() else {
                return Ok(None);
            };
            let mut items = Vec::new();
            while let Some(item) = upstream.pull()? {
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
    }
}

// ============================================================================
// Partition Stage
// ============================================================================

struct PartitionNode<T> {
    upstream: Arc<dyn Node<T>>,
    predicate: Arc<dyn Predicate<T>>,
}

impl<T> Node<Vec<T>> for PartitionNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<Vec<T>>> {
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
    upstream: Option<Cursor<T>>,
    predicate: Arc<dyn Predicate<T>>,
    groups: Option<std::vec::IntoIter<Vec<T>>>,
    config: PipelineConfig,
}

impl<T> Pull<Vec<T>> for PartitionCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<Vec<T>>> {
        if self.groups.is_none() {
            let Some(mut upstream) = self.upstream.take() else {
                return Ok(None);
            };
            let mut passed = Vec::new();
            let mut failed = Vec::new();
            let mut index = 0usize;
            while let Some(item) = upstream.pull()? {
                let position = self.config.next_index(&mut index)?;
                if self.predicate.test(&item, position)? {
                    passed.push(item);
                } else {
                    failed.push(item);
                }
            }
            self.groups = Some(vec![passed, failed].into_iter());
        }
        Ok(self.groups.as_mut().and_then(Iterator::next))
    }
}

// ============================================================================
// GroupBy / CountBy Stages
// ============================================================================

/// Drain the upstream into first-seen-order buckets.
fn collect_buckets<T, K>(
    mut upstream: Cursor<T>,
    selector: &dyn KeySelector<T, K>,
    config: &PipelineConfig,
) -> Result<Vec<(K, Vec<T>)>>
where
    K: Eq + Hash + Clone,
{
    let mut buckets: Vec<(K, Vec<T>)> = Vec::new();
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut index = 0usize;
    while let Some(item) = upstream.pull()? {
        let position = config.next_index(&mut index)?;
        let key = selector.select(&item, position)?;
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
    upstream: Arc<dyn Node<T>>,
    selector: Arc<dyn KeySelector<T, K>>,
}

impl<T, K> Node<Pair<K, Vec<T>>> for GroupByNode<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<Pair<K, Vec<T>>>> {
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
    upstream: Option<Cursor<T>>,
    selector: Arc<dyn KeySelector<T, K>>,
    buckets: Option<std::vec::IntoIter<(K, Vec<T>)>>,
    config: PipelineConfig,
}

impl<T, K> Pull<Pair<K, Vec<T>>> for GroupByCursor<T, K>
where
    T: Send,
    K: Eq + Hash + Clone + Send,
{
    fn pull(&mut self) -> Result<Option<Pair<K, Vec<T>>>> {
        if self.buckets.is_none() {
            let Some(upstream) = self.upstream.take() else {
                return Ok(None);
            };
            let buckets = collect_buckets(upstream, self.selector.as_ref(), &self.config)?;
            self.buckets = Some(buckets.into_iter());
        }
        Ok(self
            .buckets
            .as_mut()
            .and_then(Iterator::next)
            .map(Pair::from))
    }
}

struct CountByNode<T, K> {
    upstream: Arc<dyn Node<T>>,
    selector: Arc<dyn KeySelector<T, K>>,
}

impl<T, K> Node<Pair<K, usize>> for CountByNode<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<Pair<K, usize>>> {
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
    upstream: Option<Cursor<T>>,
    selector: Arc<dyn KeySelector<T, K>>,
    counts: Option<std::vec::IntoIter<(K, usize)>>,
    config: PipelineConfig,
}

impl<T, K> Pull<Pair<K, usize>> for CountByCursor<T, K>
where
    T: Send,
    K: Eq + Hash + Clone + Send,
{
    fn pull(&mut self) -> Result<Option<Pair<K, usize>>> {
        if self.counts.is_none() {
            let Some(upstream) = self.upstream.take() else {
                return Ok(None);
            };
            let buckets = collect_buckets(upstream, self.selector.as_ref(), &self.config)?;
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
    }
}

// ============================================================================
// Unique Stage
// ============================================================================

struct UniqueNode<T, K> {
    upstream: Arc<dyn Node<T>>,
    selector: Arc<dyn KeySelector<T, K>>,
}

impl<T, K> Node<T> for UniqueNode<T, K>
where
    T: Clone + Send + Sync + 'static,
    K: Eq + Hash + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
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
    upstream: Cursor<T>,
    selector: Arc<dyn KeySelector<T, K>>,
    seen: HashSet<K>,
    index: usize,
    config: PipelineConfig,
}

impl<T, K> Pull<T> for UniqueCursor<T, K>
where
    T: Send,
    K: Eq + Hash + Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        while let Some(item) = self.upstream.pull()? {
            let index = self.config.next_index(&mut self.index)?;
            let key = self.selector.select(&item, index)?;
            if self.seen.insert(key) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }
}

// ============================================================================
// Sliding Stage (declared, unimplemented)
// ============================================================================

struct SlidingNode<T> {
    upstream: Arc<dyn Node<T>>,
    size: usize,
    step: Option<usize>,
}

impl<T> Node<Vec<T>> for SlidingNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, _config: &PipelineConfig) -> Result<Cursor<Vec<T>>> {
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

    #[test]
    fn test_chunk_by_one_yields_singletons() {
        let seq = Sequence::from_vec((1..=8).collect::<Vec<_>>());
        let groups = seq.chunk(1).to_vec().unwrap();
        assert_eq!(groups.len(), 8);
        assert!(groups.iter().all(|group| group.len() == 1));
    }

    #[test]
    fn test_chunk_while_groups_runs() {
        let seq = Sequence::from_vec(vec![1, 1, 2, 2, 3]);
        let runs = seq
            .chunk_while(boundary(|item: &i32, _, group: &[i32]| {
                group.last() == Some(item)
            }))
            .to_vec()
            .unwrap();
        assert_eq!(runs, vec![vec![1, 1], vec![2, 2], vec![3]]);
    }

    #[test]
    fn test_split_distributes_remainder_to_earliest_groups() {
        let seq = Sequence::from_vec((1..=11).collect::<Vec<_>>());
        let groups = seq.split(3).to_vec().unwrap();
        let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
        assert_eq!(groups[0], vec![1, 2, 3, 4]);
        assert_eq!(groups[2], vec![9, 10, 11]);
    }

    #[test]
    fn test_split_pads_with_empty_groups() {
        let seq = Sequence::from_vec(vec![1, 2]);
        let groups = seq.split(3).to_vec().unwrap();
        assert_eq!(groups, vec![vec![1], vec![2], vec![]]);
    }

    #[test]
    fn test_partition_keeps_order_in_both_groups() {
        let seq = Sequence::from_vec(vec![1, -2, 3, -4]);
        let groups = seq
            .partition(predicate(|n: &i32, _| *n > 0))
            .to_vec()
            .unwrap();
        assert_eq!(groups, vec![vec![1, 3], vec![-2, -4]]);
    }

    #[test]
    fn test_group_by_preserves_first_seen_key_order() {
        let seq = Sequence::from_vec(vec!["apple", "avocado", "banana", "apricot"]);
        let buckets = seq
            .group_by(selector(|word: &&str, _| word.as_bytes()[0]))
            .to_vec()
            .unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key, b'a');
        assert_eq!(buckets[0].value, vec!["apple", "avocado", "apricot"]);
        assert_eq!(buckets[1].key, b'b');
        assert_eq!(buckets[1].value, vec!["banana"]);
    }

    #[test]
    fn test_counts_by_value() {
        let seq = Sequence::from_vec(vec!["a", "b", "a", "a"]);
        let counts = seq.counts().to_vec().unwrap();
        assert_eq!(counts[0].key, "a");
        assert_eq!(counts[0].value, 3);
        assert_eq!(counts[1].key, "b");
        assert_eq!(counts[1].value, 1);
    }

    #[test]
    fn test_unique_keeps_first_occurrence() {
        let seq = Sequence::from_vec(vec![3, 1, 3, 2, 1]);
        assert_eq!(seq.unique().to_vec().unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn test_sliding_is_unimplemented() {
        let seq = Sequence::from_vec(vec![1, 2, 3]);
        let windows = seq.sliding(2, None);
        let err = windows.to_vec().unwrap_err();
        assert!(matches!(err, Error::Unimplemented("sliding")));
    }
}

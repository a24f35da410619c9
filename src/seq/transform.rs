//! Stateless transform stages: filter, map, update, flat_map, collapse.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::strategy::{Mapper, Predicate};

use super::{Cursor, Node, Pull, Sequence};

impl<T> Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Keep only the elements the predicate accepts.
    ///
    /// The stage counts every upstream element it considers, whether or not
    /// it is yielded, and reports that index to the predicate.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cascade::prelude::*;
    ///
    /// let seq = Sequence::from_vec(vec![1, 2, 3, 4]);
    /// let odd = seq.filter(predicate(|n: &i32, _| n % 2 == 1));
    /// assert_eq!(odd.to_vec().unwrap(), vec![1, 3]);
    /// ```
    pub fn filter<P>(&self, predicate: P) -> Sequence<T>
    where
        P: Predicate<T> + 'static,
    {
        self.derive(FilterNode {
            upstream: Arc::clone(&self.node),
            predicate: Arc::new(predicate),
        })
    }

    /// Replace every element with the mapper's output.
    ///
    /// The output element type is decoupled from the input type.
    pub fn map<Out, M>(&self, mapper: M) -> Sequence<Out>
    where
        Out: Clone + Send + Sync + 'static,
        M: Mapper<T, Out> + 'static,
    {
        self.derive(MapNode {
            upstream: Arc::clone(&self.node),
            mapper: Arc::new(mapper),
        })
    }

    /// Map the elements the predicate accepts; pass the rest through
    /// unchanged.
    pub fn update<P, M>(&self, predicate: P, mapper: M) -> Sequence<T>
    where
        P: Predicate<T> + 'static,
        M: Mapper<T, T> + 'static,
    {
        self.derive(UpdateNode {
            upstream: Arc::clone(&self.node),
            predicate: Arc::new(predicate),
            mapper: Arc::new(mapper),
        })
    }

    /// Map every element to a sub-sequence and splice each sub-sequence
    /// into the output before moving to the next upstream element.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cascade::prelude::*;
    ///
    /// let seq = Sequence::from_vec(vec![1, 2, 3]);
    /// let repeated = seq.flat_map(mapper(|n: i32, _| {
    ///     Sequence::from_vec(vec![n; n as usize])
    /// }));
    /// assert_eq!(repeated.to_vec().unwrap(), vec![1, 2, 2, 3, 3, 3]);
    /// ```
    pub fn flat_map<Out, M>(&self, mapper: M) -> Sequence<Out>
    where
        Out: Clone + Send + Sync + 'static,
        M: Mapper<T, Sequence<Out>> + 'static,
    {
        self.derive(FlatMapNode {
            upstream: Arc::clone(&self.node),
            mapper: Arc::new(mapper),
        })
    }
}

impl<T> Sequence<Sequence<T>>
where
    T: Clone + Send + Sync + 'static,
{
    /// Flatten one level of nested sequences.
    pub fn collapse(&self) -> Sequence<T> {
        self.derive(CollapseNode {
            upstream: Arc::clone(&self.node),
            _item: PhantomData,
        })
    }
}

impl<T> Sequence<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    /// Flatten one level of vector groups, as produced by the windowing
    /// stages.
    pub fn collapse(&self) -> Sequence<T> {
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
    upstream: Arc<dyn Node<T>>,
    predicate: Arc<dyn Predicate<T>>,
}

impl<T> Node<T> for FilterNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
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
    upstream: Cursor<T>,
    predicate: Arc<dyn Predicate<T>>,
    index: usize,
    config: PipelineConfig,
}

impl<T> Pull<T> for FilterCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        while let Some(item) = self.upstream.pull()? {
            let index = self.config.next_index(&mut self.index)?;
            if self.predicate.test(&item, index)? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }
}

// ============================================================================
// Map Stage
// ============================================================================

struct MapNode<T, Out> {
    upstream: Arc<dyn Node<T>>,
    mapper: Arc<dyn Mapper<T, Out>>,
}

impl<T, Out> Node<Out> for MapNode<T, Out>
where
    T: Clone + Send + Sync + 'static,
    Out: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<Out>> {
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
    upstream: Cursor<T>,
    mapper: Arc<dyn Mapper<T, Out>>,
    index: usize,
    config: PipelineConfig,
}

impl<T, Out> Pull<Out> for MapCursor<T, Out>
where
    T: Send,
    Out: Send,
{
    fn pull(&mut self) -> Result<Option<Out>> {
        match self.upstream.pull()? {
            Some(item) => {
                let index = self.config.next_index(&mut self.index)?;
                Ok(Some(self.mapper.apply(item, index)?))
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// Update Stage
// ============================================================================

struct UpdateNode<T> {
    upstream: Arc<dyn Node<T>>,
    predicate: Arc<dyn Predicate<T>>,
    mapper: Arc<dyn Mapper<T, T>>,
}

impl<T> Node<T> for UpdateNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
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
    upstream: Cursor<T>,
    predicate: Arc<dyn Predicate<T>>,
    mapper: Arc<dyn Mapper<T, T>>,
    index: usize,
    config: PipelineConfig,
}

impl<T> Pull<T> for UpdateCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        match self.upstream.pull()? {
            Some(item) => {
                let index = self.config.next_index(&mut self.index)?;
                if self.predicate.test(&item, index)? {
                    Ok(Some(self.mapper.apply(item, index)?))
                } else {
                    Ok(Some(item))
                }
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// FlatMap Stage
// ============================================================================

struct FlatMapNode<T, Out> {
    upstream: Arc<dyn Node<T>>,
    mapper: Arc<dyn Mapper<T, Sequence<Out>>>,
}

impl<T, Out> Node<Out> for FlatMapNode<T, Out>
where
    T: Clone + Send + Sync + 'static,
    Out: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<Out>> {
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
    upstream: Cursor<T>,
    mapper: Arc<dyn Mapper<T, Sequence<Out>>>,
    active: Option<Cursor<Out>>,
    index: usize,
    config: PipelineConfig,
}

impl<T, Out> Pull<Out> for FlatMapCursor<T, Out>
where
    T: Send,
    Out: Clone + Send + Sync + 'static,
{
    fn pull(&mut self) -> Result<Option<Out>> {
        loop {
            if let Some(active) = self.active.as_mut() {
                if let Some(item) = active.pull()? {
                    return Ok(Some(item));
                }
                self.active = None;
            }
            match self.upstream.pull()? {
                Some(item) => {
                    let index = self.config.next_index(&mut self.index)?;
                    let sub = self.mapper.apply(item, index)?;
                    self.active = Some(sub.open_cursor()?);
                }
                None => return Ok(None),
            }
        }
    }
}

// ============================================================================
// Collapse Stage
// ============================================================================

/// Element shapes `collapse` can flatten: a nested pipeline or a vector
/// group.
trait Nested<T>: Clone + Send + Sync + 'static {
    fn into_cursor(self) -> Result<Cursor<T>>;
}

impl<T> Nested<T> for Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn into_cursor(self) -> Result<Cursor<T>> {
        self.open_cursor()
    }
}

impl<T> Nested<T> for Vec<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn into_cursor(self) -> Result<Cursor<T>> {
        Ok(Box::new(OwnedVecCursor {
            iter: self.into_iter(),
        }))
    }
}

struct OwnedVecCursor<T> {
    iter: std::vec::IntoIter<T>,
}

impl<T> Pull<T> for OwnedVecCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        Ok(self.iter.next())
    }
}

struct CollapseNode<U, T> {
    upstream: Arc<dyn Node<U>>,
    _item: PhantomData<fn() -> T>,
}

impl<U, T> Node<T> for CollapseNode<U, T>
where
    U: Nested<T>,
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
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
    upstream: Cursor<U>,
    active: Option<Cursor<T>>,
}

impl<U, T> Pull<T> for CollapseCursor<U, T>
where
    U: Nested<T>,
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(active) = self.active.as_mut() {
                if let Some(item) = active.pull()? {
                    return Ok(Some(item));
                }
                self.active = None;
            }
            match self.upstream.pull()? {
                Some(nested) => self.active = Some(nested.into_cursor()?),
                None => return Ok(None),
            }
        }
    }
}

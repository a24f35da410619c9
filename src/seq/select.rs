//! Positional selection stages: take, skip, their until/while forms, nth,
//! and splicing around the first match.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::strategy::{predicate, Negate, Predicate};

use super::{drain_count, Cursor, Node, Pull, Sequence};

impl<T> Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Keep the first `n` elements.
    ///
    /// A negative `n` is relative to the end: `take(-2)` keeps everything
    /// but the last two elements. The negative form needs the upstream
    /// length, so it sizes the upstream with an extra traversal before
    /// yielding; the non-negative form stays fully lazy and never pulls
    /// past the cut.
    pub fn take(&self, n: isize) -> Sequence<T> {
        self.derive(TakeNode {
            upstream: Arc::clone(&self.node),
            count: n,
        })
    }

    /// Drop the first `n` elements.
    ///
    /// A negative `n` is relative to the end: `skip(-2)` keeps only the
    /// last two elements. The negative form sizes the upstream like
    /// [`Sequence::take`].
    pub fn skip(&self, n: isize) -> Sequence<T> {
        self.derive(SkipNode {
            upstream: Arc::clone(&self.node),
            count: n,
        })
    }

    /// Yield elements up to, and excluding, the first match.
    ///
    /// Once the match is seen the upstream is not pulled again.
    pub fn take_until<P>(&self, until: P) -> Sequence<T>
    where
        P: Predicate<T> + 'static,
    {
        self.derive(TakeUntilNode {
            upstream: Arc::clone(&self.node),
            until: Arc::new(until),
        })
    }

    /// Yield elements while the predicate holds.
    ///
    /// Defined as [`Sequence::take_until`] with the predicate negated.
    pub fn take_while<P>(&self, while_: P) -> Sequence<T>
    where
        P: Predicate<T> + 'static,
    {
        self.take_until(Negate::new(while_))
    }

    /// Discard elements before the first match, then yield from the match
    /// onward (the matching element is included).
    pub fn skip_until<P>(&self, until: P) -> Sequence<T>
    where
        P: Predicate<T> + 'static,
    {
        self.derive(SkipUntilNode {
            upstream: Arc::clone(&self.node),
            until: Arc::new(until),
        })
    }

    /// Discard elements while the predicate holds.
    ///
    /// Defined as [`Sequence::skip_until`] with the predicate negated.
    pub fn skip_while<P>(&self, while_: P) -> Sequence<T>
    where
        P: Predicate<T> + 'static,
    {
        self.skip_until(Negate::new(while_))
    }

    /// Keep the elements at positions `0, step, 2·step, ...`.
    ///
    /// Implemented as a filter on the stage-local index.
    pub fn nth(&self, step: usize) -> Sequence<T> {
        debug_assert!(step > 0, "nth step must be non-zero");
        self.filter(predicate(move |_: &T, index| index % step == 0))
    }

    /// Splice `items` immediately before the first match.
    ///
    /// When nothing matches, the sequence passes through unchanged; the
    /// items are not appended at the end.
    pub fn insert_before<P>(&self, at: P, items: Vec<T>) -> Sequence<T>
    where
        P: Predicate<T> + 'static,
    {
        self.derive(InsertNode {
            upstream: Arc::clone(&self.node),
            at: Arc::new(at),
            items: Arc::new(items),
            placement: Placement::Before,
        })
    }

    /// Splice `items` immediately after the first match.
    ///
    /// When nothing matches, the sequence passes through unchanged.
    pub fn insert_after<P>(&self, at: P, items: Vec<T>) -> Sequence<T>
    where
        P: Predicate<T> + 'static,
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
    upstream: Arc<dyn Node<T>>,
    count: isize,
}

impl<T> Node<T> for TakeNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
        let remaining = if self.count >= 0 {
            self.count as usize
        } else {
            let len = drain_count(self.upstream.open(config)?)?;
            tracing::debug!(len, shift = self.count, "sized upstream for negative take");
            len.saturating_sub(self.count.unsigned_abs())
        };
        Ok(Box::new(TakeCursor {
            upstream: self.upstream.open(config)?,
            remaining,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct TakeCursor<T> {
    upstream: Cursor<T>,
    remaining: usize,
}

impl<T> Pull<T> for TakeCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match self.upstream.pull()? {
            Some(item) => {
                self.remaining -= 1;
                Ok(Some(item))
            }
            None => {
                self.remaining = 0;
                Ok(None)
            }
        }
    }
}

struct SkipNode<T> {
    upstream: Arc<dyn Node<T>>,
    count: isize,
}

impl<T> Node<T> for SkipNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
        let to_skip = if self.count >= 0 {
            self.count as usize
        } else {
            let len = drain_count(self.upstream.open(config)?)?;
            tracing::debug!(len, shift = self.count, "sized upstream for negative skip");
            len.saturating_sub(self.count.unsigned_abs())
        };
        Ok(Box::new(SkipCursor {
            upstream: self.upstream.open(config)?,
            to_skip,
        }))
    }

    fn repeatable(&self) -> bool {
        self.upstream.repeatable()
    }
}

struct SkipCursor<T> {
    upstream: Cursor<T>,
    to_skip: usize,
}

impl<T> Pull<T> for SkipCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        while self.to_skip > 0 {
            if self.upstream.pull()?.is_none() {
                self.to_skip = 0;
                return Ok(None);
            }
            self.to_skip -= 1;
        }
        self.upstream.pull()
    }
}

// ============================================================================
// TakeUntil / SkipUntil Stages
// ============================================================================

struct TakeUntilNode<T> {
    upstream: Arc<dyn Node<T>>,
    until: Arc<dyn Predicate<T>>,
}

impl<T> Node<T> for TakeUntilNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
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
    upstream: Cursor<T>,
    until: Arc<dyn Predicate<T>>,
    done: bool,
    index: usize,
    config: PipelineConfig,
}

impl<T> Pull<T> for TakeUntilCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        if self.done {
            return Ok(None);
        }
        match self.upstream.pull()? {
            Some(item) => {
                let index = self.config.next_index(&mut self.index)?;
                if self.until.test(&item, index)? {
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
    }
}

struct SkipUntilNode<T> {
    upstream: Arc<dyn Node<T>>,
    until: Arc<dyn Predicate<T>>,
}

impl<T> Node<T> for SkipUntilNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
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
    upstream: Cursor<T>,
    until: Arc<dyn Predicate<T>>,
    skipping: bool,
    index: usize,
    config: PipelineConfig,
}

impl<T> Pull<T> for SkipUntilCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> Result<Option<T>> {
        while self.skipping {
            match self.upstream.pull()? {
                Some(item) => {
                    let index = self.config.next_index(&mut self.index)?;
                    if self.until.test(&item, index)? {
                        self.skipping = false;
                        return Ok(Some(item));
                    }
                }
                None => return Ok(None),
            }
        }
        self.upstream.pull()
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
    upstream: Arc<dyn Node<T>>,
    at: Arc<dyn Predicate<T>>,
    items: Arc<Vec<T>>,
    placement: Placement,
}

impl<T> Node<T> for InsertNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<Cursor<T>> {
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
    upstream: Cursor<T>,
    at: Arc<dyn Predicate<T>>,
    items: Arc<Vec<T>>,
    placement: Placement,
    /// Splice queue, filled once at the match site.
    pending: SmallVec<[T; 4]>,
    pending_next: usize,
    matched: bool,
    index: usize,
    config: PipelineConfig,
}

impl<T> Pull<T> for InsertCursor<T>
where
    T: Clone + Send + Sync,
{
    fn pull(&mut self) -> Result<Option<T>> {
        if self.pending_next < self.pending.len() {
            let item = self.pending[self.pending_next].clone();
            self.pending_next += 1;
            if self.pending_next == self.pending.len() {
                self.pending.clear();
            }
            return Ok(Some(item));
        }
        match self.upstream.pull()? {
            Some(item) => {
                if self.matched {
                    return Ok(Some(item));
                }
                let index = self.config.next_index(&mut self.index)?;
                if !self.at.test(&item, index)? {
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_negative_is_relative_to_the_end() {
        let seq = Sequence::from_vec((1..=10).collect::<Vec<_>>());
        assert_eq!(seq.take(-2).to_vec().unwrap(), (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn test_skip_negative_keeps_the_tail() {
        let seq = Sequence::from_vec((1..=10).collect::<Vec<_>>());
        assert_eq!(seq.skip(-2).to_vec().unwrap(), vec![9, 10]);
    }

    #[test]
    fn test_take_until_excludes_the_match() {
        let seq = Sequence::from_vec(vec![1, 2, 3, 4]);
        let head = seq.take_until(predicate(|n: &i32, _| *n == 3));
        assert_eq!(head.to_vec().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_skip_until_includes_the_match() {
        let seq = Sequence::from_vec(vec![1, 2, 3, 4]);
        let tail = seq.skip_until(predicate(|n: &i32, _| *n == 3));
        assert_eq!(tail.to_vec().unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_while_forms_negate_their_predicate() {
        let seq = Sequence::from_vec(vec![1, 2, 3, 1]);
        assert_eq!(
            seq.take_while(predicate(|n: &i32, _| *n < 3))
                .to_vec()
                .unwrap(),
            vec![1, 2],
        );
        assert_eq!(
            seq.skip_while(predicate(|n: &i32, _| *n < 3))
                .to_vec()
                .unwrap(),
            vec![3, 1],
        );
    }

    #[test]
    fn test_nth_keeps_every_step_position() {
        let seq = Sequence::from_vec(vec!["a", "b", "c", "d", "e"]);
        assert_eq!(seq.nth(2).to_vec().unwrap(), vec!["a", "c", "e"]);
    }

    #[test]
    fn test_insert_before_splices_at_the_first_match() {
        let seq = Sequence::from_vec(vec![1, 2, 3, 2]);
        let spliced = seq.insert_before(predicate(|n: &i32, _| *n == 2), vec![10, 11]);
        assert_eq!(spliced.to_vec().unwrap(), vec![1, 10, 11, 2, 3, 2]);
    }

    #[test]
    fn test_insert_after_splices_behind_the_first_match() {
        let seq = Sequence::from_vec(vec![1, 2, 3, 2]);
        let spliced = seq.insert_after(predicate(|n: &i32, _| *n == 2), vec![10]);
        assert_eq!(spliced.to_vec().unwrap(), vec![1, 2, 10, 3, 2]);
    }

    #[test]
    fn test_insert_without_a_match_passes_through() {
        let seq = Sequence::from_vec(vec![1, 2, 3]);
        let spliced = seq.insert_before(predicate(|n: &i32, _| *n == 99), vec![7]);
        assert_eq!(spliced.to_vec().unwrap(), vec![1, 2, 3]);
    }
}

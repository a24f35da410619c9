//! Terminal operations for asynchronous pipelines.
//!
//! Mirrors the synchronous terminals operation for operation; every method
//! opens a fresh cursor chain and drives it, suspending wherever the source
//! or a strategy does.

use std::fmt::Display;

use crate::error::{Error, Result};
use crate::numeric::Numeric;
use crate::strategy::{AsyncPredicate, AsyncReducer};

use super::{AsyncPull as _, AsyncSequence};

impl<T> AsyncSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Materialize the pipeline into a vector.
    pub async fn to_vec(&self) -> Result<Vec<T>> {
        let mut cursor = self.open_cursor()?;
        let mut items = Vec::new();
        while let Some(item) = cursor.pull().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Count the elements the pipeline yields.
    pub async fn count(&self) -> Result<usize> {
        super::drain_count(self.open_cursor()?).await
    }

    /// Whether the pipeline yields no elements; pulls at most one.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.open_cursor()?.pull().await?.is_none())
    }

    /// Fold the sequence left to right from an explicit seed.
    pub async fn fold<Acc, R>(&self, seed: Acc, reducer: R) -> Result<Acc>
    where
        Acc: Send,
        R: AsyncReducer<Acc, T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut acc = seed;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull().await? {
            let index = self.config.next_index(&mut counter)?;
            acc = reducer.combine(acc, item, index).await?;
        }
        Ok(acc)
    }

    /// Fold the sequence left to right without a seed.
    ///
    /// Same contract as the synchronous form: the first element seeds the
    /// accumulator, the first combine call reports index 0 for the second
    /// element, and an empty sequence raises [`Error::InvalidType`].
    pub async fn reduce<R>(&self, reducer: R) -> Result<T>
    where
        R: AsyncReducer<T, T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut acc = match cursor.pull().await? {
            Some(first) => first,
            None => return Err(Error::InvalidType("reduce of an empty sequence without a seed")),
        };
        let mut counter = 0usize;
        while let Some(item) = cursor.pull().await? {
            let index = self.config.next_index(&mut counter)?;
            acc = reducer.combine(acc, item, index).await?;
        }
        Ok(acc)
    }

    /// Concatenate the elements' display forms with `separator`.
    pub async fn join(&self, separator: &str) -> Result<String>
    where
        T: Display,
    {
        let mut cursor = self.open_cursor()?;
        let mut out = String::new();
        let mut first = true;
        while let Some(item) = cursor.pull().await? {
            if !first {
                out.push_str(separator);
            }
            out.push_str(&item.to_string());
            first = false;
        }
        Ok(out)
    }

    /// Concatenate with the default comma separator.
    pub async fn join_default(&self) -> Result<String>
    where
        T: Display,
    {
        self.join(",").await
    }

    /// Whether any element matches; stops at the first match.
    pub async fn some<P>(&self, matches: P) -> Result<bool>
    where
        P: AsyncPredicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull().await? {
            let index = self.config.next_index(&mut counter)?;
            if matches.test(&item, index).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether every element matches; stops at the first failure.
    pub async fn every<P>(&self, matches: P) -> Result<bool>
    where
        P: AsyncPredicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull().await? {
            let index = self.config.next_index(&mut counter)?;
            if !matches.test(&item, index).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Share of matching elements, from 0 to 100; empty yields 0.
    pub async fn percentage<P>(&self, matches: P) -> Result<f64>
    where
        P: AsyncPredicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        let mut total = 0usize;
        let mut matched = 0usize;
        while let Some(item) = cursor.pull().await? {
            let index = self.config.next_index(&mut counter)?;
            total += 1;
            if matches.test(&item, index).await? {
                matched += 1;
            }
        }
        if total == 0 {
            return Ok(0.0);
        }
        Ok(matched as f64 / total as f64 * 100.0)
    }

    /// Zero-based position of the first match, or `None`.
    pub async fn search<P>(&self, matches: P) -> Result<Option<usize>>
    where
        P: AsyncPredicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull().await? {
            let index = self.config.next_index(&mut counter)?;
            if matches.test(&item, index).await? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // First / Last
    // ========================================================================

    /// The first element, if any. Pulls at most one element.
    pub async fn first(&self) -> Result<Option<T>> {
        self.open_cursor()?.pull().await
    }

    /// The first matching element, if any.
    pub async fn first_where<P>(&self, matches: P) -> Result<Option<T>>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.filter(matches).first().await
    }

    /// The first element, or `default` when the sequence is empty.
    pub async fn first_or(&self, default: T) -> Result<T> {
        Ok(self.first().await?.unwrap_or(default))
    }

    /// The first matching element, or `default` when nothing matches.
    pub async fn first_where_or<P>(&self, matches: P, default: T) -> Result<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        Ok(self.first_where(matches).await?.unwrap_or(default))
    }

    /// The first element, or [`Error::ItemNotFound`].
    pub async fn first_or_fail(&self) -> Result<T> {
        self.first()
            .await?
            .ok_or(Error::ItemNotFound("first_or_fail"))
    }

    /// The first matching element, or [`Error::ItemNotFound`].
    pub async fn first_where_or_fail<P>(&self, matches: P) -> Result<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.first_where(matches)
            .await?
            .ok_or(Error::ItemNotFound("first_where_or_fail"))
    }

    /// The last element, if any. Drains the pipeline.
    pub async fn last(&self) -> Result<Option<T>> {
        let mut cursor = self.open_cursor()?;
        let mut last = None;
        while let Some(item) = cursor.pull().await? {
            last = Some(item);
        }
        Ok(last)
    }

    /// The last matching element, if any. Drains the pipeline.
    pub async fn last_where<P>(&self, matches: P) -> Result<Option<T>>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.filter(matches).last().await
    }

    /// The last element, or `default` when the sequence is empty.
    pub async fn last_or(&self, default: T) -> Result<T> {
        Ok(self.last().await?.unwrap_or(default))
    }

    /// The last matching element, or `default` when nothing matches.
    pub async fn last_where_or<P>(&self, matches: P, default: T) -> Result<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        Ok(self.last_where(matches).await?.unwrap_or(default))
    }

    /// The last element, or [`Error::ItemNotFound`].
    pub async fn last_or_fail(&self) -> Result<T> {
        self.last().await?.ok_or(Error::ItemNotFound("last_or_fail"))
    }

    /// The last matching element, or [`Error::ItemNotFound`].
    pub async fn last_where_or_fail<P>(&self, matches: P) -> Result<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.last_where(matches)
            .await?
            .ok_or(Error::ItemNotFound("last_where_or_fail"))
    }

    // ========================================================================
    // Before / After
    // ========================================================================

    /// The element immediately preceding the first match.
    pub async fn before<P>(&self, matches: P) -> Result<Option<T>>
    where
        P: AsyncPredicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        let mut previous: Option<T> = None;
        while let Some(item) = cursor.pull().await? {
            let index = self.config.next_index(&mut counter)?;
            if matches.test(&item, index).await? {
                return Ok(previous);
            }
            previous = Some(item);
        }
        Ok(None)
    }

    /// Like [`AsyncSequence::before`], with a default for the absent case.
    pub async fn before_or<P>(&self, matches: P, default: T) -> Result<T>
    where
        P: AsyncPredicate<T>,
    {
        Ok(self.before(matches).await?.unwrap_or(default))
    }

    /// Like [`AsyncSequence::before`], raising [`Error::ItemNotFound`] for
    /// the absent case.
    pub async fn before_or_fail<P>(&self, matches: P) -> Result<T>
    where
        P: AsyncPredicate<T>,
    {
        self.before(matches)
            .await?
            .ok_or(Error::ItemNotFound("before_or_fail"))
    }

    /// The element immediately following the first match; the upstream is
    /// pulled exactly one element past the match.
    pub async fn after<P>(&self, matches: P) -> Result<Option<T>>
    where
        P: AsyncPredicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull().await? {
            let index = self.config.next_index(&mut counter)?;
            if matches.test(&item, index).await? {
                return cursor.pull().await;
            }
        }
        Ok(None)
    }

    /// Like [`AsyncSequence::after`], with a default for the absent case.
    pub async fn after_or<P>(&self, matches: P, default: T) -> Result<T>
    where
        P: AsyncPredicate<T>,
    {
        Ok(self.after(matches).await?.unwrap_or(default))
    }

    /// Like [`AsyncSequence::after`], raising [`Error::ItemNotFound`] for
    /// the absent case.
    pub async fn after_or_fail<P>(&self, matches: P) -> Result<T>
    where
        P: AsyncPredicate<T>,
    {
        self.after(matches)
            .await?
            .ok_or(Error::ItemNotFound("after_or_fail"))
    }

    // ========================================================================
    // Sole
    // ========================================================================

    /// The only element of the sequence; error cases as in the synchronous
    /// form, with the second match detected without pulling further.
    pub async fn sole(&self) -> Result<T> {
        let mut cursor = self.open_cursor()?;
        let first = match cursor.pull().await? {
            Some(item) => item,
            None => return Err(Error::ItemNotFound("sole")),
        };
        if cursor.pull().await?.is_some() {
            return Err(Error::MultipleItemsFound("sole"));
        }
        Ok(first)
    }

    /// The only matching element.
    pub async fn sole_where<P>(&self, matches: P) -> Result<T>
    where
        P: AsyncPredicate<T> + 'static,
    {
        self.filter(matches).sole().await
    }
}

// ============================================================================
// Numeric Aggregations
// ============================================================================

impl<T> AsyncSequence<T>
where
    T: Numeric,
{
    /// Sum the elements under the pipeline's guard policy.
    pub async fn sum(&self) -> Result<T> {
        let guard = self.config.guards_limits();
        let mut cursor = self.open_cursor()?;
        let mut total = T::zero();
        while let Some(item) = cursor.pull().await? {
            total = total.accumulate(item, guard)?;
        }
        Ok(total)
    }

    /// Arithmetic mean as `f64`; an empty sequence yields the platform NaN.
    pub async fn average(&self) -> Result<f64> {
        let guard = self.config.guards_limits();
        let mut cursor = self.open_cursor()?;
        let mut total = T::zero();
        let mut count = 0usize;
        while let Some(item) = cursor.pull().await? {
            total = total.accumulate(item, guard)?;
            count += 1;
        }
        Ok(total.as_f64() / count as f64)
    }

    /// The middle element by position in sequence order; empty yields 0.
    pub async fn median(&self) -> Result<f64> {
        let items = self.to_vec().await?;
        if items.is_empty() {
            return Ok(0.0);
        }
        let middle = items.len() / 2;
        if items.len() % 2 == 1 {
            Ok(items[middle].as_f64())
        } else {
            Ok((items[middle - 1].as_f64() + items[middle].as_f64()) / 2.0)
        }
    }

    /// The running minimum, seeded at zero like the synchronous form.
    pub async fn min(&self) -> Result<T> {
        let mut cursor = self.open_cursor()?;
        let mut best = T::zero();
        while let Some(item) = cursor.pull().await? {
            if item < best {
                best = item;
            }
        }
        Ok(best)
    }

    /// The running maximum, seeded at zero like the synchronous form.
    pub async fn max(&self) -> Result<T> {
        let mut cursor = self.open_cursor()?;
        let mut best = T::zero();
        while let Some(item) = cursor.pull().await? {
            if item > best {
                best = item;
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{async_reducer, predicate, reducer};

    #[tokio::test]
    async fn test_reduce_without_seed_matches_the_sync_contract() {
        let seq = AsyncSequence::from_vec(vec![1, 2, 3]);
        let total = seq
            .reduce(reducer(|acc: i32, item, _| acc + item))
            .await
            .unwrap();
        assert_eq!(total, 6);

        let empty = AsyncSequence::<i32>::empty();
        let err = empty
            .reduce(reducer(|acc: i32, item, _| acc + item))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidType(_)));
    }

    #[tokio::test]
    async fn test_fold_with_a_suspending_reducer() {
        let seq = AsyncSequence::from_vec(vec![1i64, 2, 3]);
        let total = seq
            .fold(
                0i64,
                async_reducer(|acc: i64, item: i64, _| {
                    Box::pin(async move {
                        tokio::task::yield_now().await;
                        Ok(acc + item)
                    })
                }),
            )
            .await
            .unwrap();
        assert_eq!(total, 6);
    }

    #[tokio::test]
    async fn test_sole_discriminates_three_cases() {
        assert_eq!(AsyncSequence::from_vec(vec![5]).sole().await.unwrap(), 5);
        assert!(matches!(
            AsyncSequence::<i32>::empty().sole().await,
            Err(Error::ItemNotFound(_)),
        ));
        assert!(matches!(
            AsyncSequence::from_vec(vec![5, 6]).sole().await,
            Err(Error::MultipleItemsFound(_)),
        ));
    }

    #[tokio::test]
    async fn test_numeric_terminals() {
        let seq = AsyncSequence::from_vec(vec![1i64, 2, 3, 4]);
        assert_eq!(seq.sum().await.unwrap(), 10);
        assert_eq!(seq.average().await.unwrap(), 2.5);
        assert_eq!(seq.median().await.unwrap(), 2.5);
        assert_eq!(seq.max().await.unwrap(), 4);

        let negatives = AsyncSequence::from_vec(vec![-5i64, -1]);
        assert_eq!(negatives.max().await.unwrap(), 0);
        assert_eq!(negatives.min().await.unwrap(), -5);
    }

    #[tokio::test]
    async fn test_search_and_percentage() {
        let seq = AsyncSequence::from_vec(vec![10, 20, 30]);
        assert_eq!(
            seq.search(predicate(|n: &i32, _| *n == 20)).await.unwrap(),
            Some(1),
        );
        let share = seq
            .percentage(predicate(|n: &i32, _| *n > 10))
            .await
            .unwrap();
        assert!((share - 200.0 / 3.0).abs() < 1e-9);
    }
}

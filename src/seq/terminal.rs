//! Terminal operations: the only points where a pipeline is evaluated.
//!
//! Every terminal opens a fresh cursor chain and drains it fully or
//! partially. Calling a terminal twice on the same handle re-runs the whole
//! chain; on a repeatable source both runs see the same elements.

use std::fmt::Display;

use crate::error::{Error, Result};
use crate::numeric::Numeric;
use crate::strategy::{Predicate, Reducer};

use super::{Pull, Sequence};

impl<T> Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Materialize the pipeline into a vector.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let mut cursor = self.open_cursor()?;
        let mut items = Vec::new();
        while let Some(item) = cursor.pull()? {
            items.push(item);
        }
        Ok(items)
    }

    /// Count the elements the pipeline yields.
    pub fn count(&self) -> Result<usize> {
        super::drain_count(self.open_cursor()?)
    }

    /// Whether the pipeline yields no elements.
    ///
    /// Pulls at most one element.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.open_cursor()?.pull()?.is_none())
    }

    /// Fold the sequence left to right from an explicit seed.
    pub fn fold<Acc, R>(&self, seed: Acc, reducer: R) -> Result<Acc>
    where
        R: Reducer<Acc, T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut acc = seed;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull()? {
            let index = self.config.next_index(&mut counter)?;
            acc = reducer.combine(acc, item, index)?;
        }
        Ok(acc)
    }

    /// Fold the sequence left to right without a seed.
    ///
    /// The first element becomes the initial accumulator and combining
    /// starts from the second element; the first combine call reports
    /// index 0 even though it receives the logically second element. An
    /// empty sequence cannot seed itself and raises
    /// [`Error::InvalidType`].
    pub fn reduce<R>(&self, reducer: R) -> Result<T>
    where
        R: Reducer<T, T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut acc = match cursor.pull()? {
            Some(first) => first,
            None => return Err(Error::InvalidType("reduce of an empty sequence without a seed")),
        };
        let mut counter = 0usize;
        while let Some(item) = cursor.pull()? {
            let index = self.config.next_index(&mut counter)?;
            acc = reducer.combine(acc, item, index)?;
        }
        Ok(acc)
    }

    /// Concatenate the elements' display forms with `separator`.
    pub fn join(&self, separator: &str) -> Result<String>
    where
        T: Display,
    {
        let mut cursor = self.open_cursor()?;
        let mut out = String::new();
        let mut first = true;
        while let Some(item) = cursor.pull()? {
            if !first {
                out.push_str(separator);
            }
            out.push_str(&item.to_string());
            first = false;
        }
        Ok(out)
    }

    /// Concatenate with the default comma separator.
    pub fn join_default(&self) -> Result<String>
    where
        T: Display,
    {
        self.join(",")
    }

    /// Whether any element matches; stops at the first match.
    pub fn some<P>(&self, matches: P) -> Result<bool>
    where
        P: Predicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull()? {
            let index = self.config.next_index(&mut counter)?;
            if matches.test(&item, index)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether every element matches; stops at the first failure.
    pub fn every<P>(&self, matches: P) -> Result<bool>
    where
        P: Predicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull()? {
            let index = self.config.next_index(&mut counter)?;
            if !matches.test(&item, index)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Share of matching elements, from 0 to 100.
    ///
    /// An empty sequence yields 0.
    pub fn percentage<P>(&self, matches: P) -> Result<f64>
    where
        P: Predicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        let mut total = 0usize;
        let mut matched = 0usize;
        while let Some(item) = cursor.pull()? {
            let index = self.config.next_index(&mut counter)?;
            total += 1;
            if matches.test(&item, index)? {
                matched += 1;
            }
        }
        if total == 0 {
            return Ok(0.0);
        }
        Ok(matched as f64 / total as f64 * 100.0)
    }

    /// Zero-based position of the first match, or `None`.
    pub fn search<P>(&self, matches: P) -> Result<Option<usize>>
    where
        P: Predicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull()? {
            let index = self.config.next_index(&mut counter)?;
            if matches.test(&item, index)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // First / Last
    // ========================================================================

    /// The first element, if any. Pulls at most one element.
    pub fn first(&self) -> Result<Option<T>> {
        self.open_cursor()?.pull()
    }

    /// The first matching element, if any.
    pub fn first_where<P>(&self, matches: P) -> Result<Option<T>>
    where
        P: Predicate<T> + 'static,
    {
        self.filter(matches).first()
    }

    /// The first element, or `default` when the sequence is empty.
    pub fn first_or(&self, default: T) -> Result<T> {
        Ok(self.first()?.unwrap_or(default))
    }

    /// The first matching element, or `default` when nothing matches.
    pub fn first_where_or<P>(&self, matches: P, default: T) -> Result<T>
    where
        P: Predicate<T> + 'static,
    {
        Ok(self.first_where(matches)?.unwrap_or(default))
    }

    /// The first element, or [`Error::ItemNotFound`] when the sequence is
    /// empty.
    pub fn first_or_fail(&self) -> Result<T> {
        self.first()?.ok_or(Error::ItemNotFound("first_or_fail"))
    }

    /// The first matching element, or [`Error::ItemNotFound`].
    pub fn first_where_or_fail<P>(&self, matches: P) -> Result<T>
    where
        P: Predicate<T> + 'static,
    {
        self.first_where(matches)?
            .ok_or(Error::ItemNotFound("first_where_or_fail"))
    }

    /// The last element, if any. Drains the pipeline.
    pub fn last(&self) -> Result<Option<T>> {
        let mut cursor = self.open_cursor()?;
        let mut last = None;
        while let Some(item) = cursor.pull()? {
            last = Some(item);
        }
        Ok(last)
    }

    /// The last matching element, if any. Drains the pipeline.
    pub fn last_where<P>(&self, matches: P) -> Result<Option<T>>
    where
        P: Predicate<T> + 'static,
    {
        self.filter(matches).last()
    }

    /// The last element, or `default` when the sequence is empty.
    pub fn last_or(&self, default: T) -> Result<T> {
        Ok(self.last()?.unwrap_or(default))
    }

    /// The last matching element, or `default` when nothing matches.
    pub fn last_where_or<P>(&self, matches: P, default: T) -> Result<T>
    where
        P: Predicate<T> + 'static,
    {
        Ok(self.last_where(matches)?.unwrap_or(default))
    }

    /// The last element, or [`Error::ItemNotFound`] when the sequence is
    /// empty.
    pub fn last_or_fail(&self) -> Result<T> {
        self.last()?.ok_or(Error::ItemNotFound("last_or_fail"))
    }

    /// The last matching element, or [`Error::ItemNotFound`].
    pub fn last_where_or_fail<P>(&self, matches: P) -> Result<T>
    where
        P: Predicate<T> + 'static,
    {
        self.last_where(matches)?
            .ok_or(Error::ItemNotFound("last_where_or_fail"))
    }

    // ========================================================================
    // Before / After
    // ========================================================================

    /// The element immediately preceding the first match.
    ///
    /// `None` when nothing matches or the match is the first element.
    pub fn before<P>(&self, matches: P) -> Result<Option<T>>
    where
        P: Predicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        let mut previous: Option<T> = None;
        while let Some(item) = cursor.pull()? {
            let index = self.config.next_index(&mut counter)?;
            if matches.test(&item, index)? {
                return Ok(previous);
            }
            previous = Some(item);
        }
        Ok(None)
    }

    /// Like [`Sequence::before`], with a default for the absent case.
    pub fn before_or<P>(&self, matches: P, default: T) -> Result<T>
    where
        P: Predicate<T>,
    {
        Ok(self.before(matches)?.unwrap_or(default))
    }

    /// Like [`Sequence::before`], raising [`Error::ItemNotFound`] for the
    /// absent case.
    pub fn before_or_fail<P>(&self, matches: P) -> Result<T>
    where
        P: Predicate<T>,
    {
        self.before(matches)?
            .ok_or(Error::ItemNotFound("before_or_fail"))
    }

    /// The element immediately following the first match.
    ///
    /// `None` when nothing matches or the match is the last element. The
    /// upstream is pulled exactly one element past the match.
    pub fn after<P>(&self, matches: P) -> Result<Option<T>>
    where
        P: Predicate<T>,
    {
        let mut cursor = self.open_cursor()?;
        let mut counter = 0usize;
        while let Some(item) = cursor.pull()? {
            let index = self.config.next_index(&mut counter)?;
            if matches.test(&item, index)? {
                return cursor.pull();
            }
        }
        Ok(None)
    }

    /// Like [`Sequence::after`], with a default for the absent case.
    pub fn after_or<P>(&self, matches: P, default: T) -> Result<T>
    where
        P: Predicate<T>,
    {
        Ok(self.after(matches)?.unwrap_or(default))
    }

    /// Like [`Sequence::after`], raising [`Error::ItemNotFound`] for the
    /// absent case.
    pub fn after_or_fail<P>(&self, matches: P) -> Result<T>
    where
        P: Predicate<T>,
    {
        self.after(matches)?
            .ok_or(Error::ItemNotFound("after_or_fail"))
    }

    // ========================================================================
    // Sole
    // ========================================================================

    /// The only element of the sequence.
    ///
    /// An empty sequence raises [`Error::ItemNotFound`]; a second element
    /// raises [`Error::MultipleItemsFound`] the moment it is seen, without
    /// pulling further.
    pub fn sole(&self) -> Result<T> {
        let mut cursor = self.open_cursor()?;
        let first = match cursor.pull()? {
            Some(item) => item,
            None => return Err(Error::ItemNotFound("sole")),
        };
        if cursor.pull()?.is_some() {
            return Err(Error::MultipleItemsFound("sole"));
        }
        Ok(first)
    }

    /// The only matching element. Error cases as in [`Sequence::sole`].
    pub fn sole_where<P>(&self, matches: P) -> Result<T>
    where
        P: Predicate<T> + 'static,
    {
        self.filter(matches).sole()
    }
}

// ============================================================================
// Numeric Aggregations
// ============================================================================

impl<T> Sequence<T>
where
    T: Numeric,
{
    /// Sum the elements.
    ///
    /// With bounds guarding enabled, each accumulation step checks the sign
    /// and magnitude of the running total first and raises
    /// [`Error::NumericOverflow`] / [`Error::NumericUnderflow`] instead of
    /// leaving the representable range.
    pub fn sum(&self) -> Result<T> {
        let guard = self.config.guards_limits();
        let mut cursor = self.open_cursor()?;
        let mut total = T::zero();
        while let Some(item) = cursor.pull()? {
            total = total.accumulate(item, guard)?;
        }
        Ok(total)
    }

    /// Arithmetic mean of the elements as `f64`.
    ///
    /// The sum is accumulated under the same guard policy as
    /// [`Sequence::sum`]. An empty sequence divides zero by zero and yields
    /// the platform NaN; the division is deliberately not guarded.
    pub fn average(&self) -> Result<f64> {
        let guard = self.config.guards_limits();
        let mut cursor = self.open_cursor()?;
        let mut total = T::zero();
        let mut count = 0usize;
        while let Some(item) = cursor.pull()? {
            total = total.accumulate(item, guard)?;
            count += 1;
        }
        Ok(total.as_f64() / count as f64)
    }

    /// The middle element, taken by position in sequence order.
    ///
    /// Even-length sequences yield the mean of the two central elements.
    /// An empty sequence yields 0, not an error.
    pub fn median(&self) -> Result<f64> {
        let items = self.to_vec()?;
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

    /// The running minimum, seeded at zero.
    ///
    /// The seed is only replaced by a strictly smaller candidate, so an
    /// input lying entirely above zero keeps the zero seed as its result.
    /// Kept for compatibility with the historical behavior; see the crate
    /// documentation before relying on it for one-sided inputs.
    pub fn min(&self) -> Result<T> {
        let mut cursor = self.open_cursor()?;
        let mut best = T::zero();
        while let Some(item) = cursor.pull()? {
            if item < best {
                best = item;
            }
        }
        Ok(best)
    }

    /// The running maximum, seeded at zero.
    ///
    /// Mirror image of [`Sequence::min`]: an input lying entirely below
    /// zero keeps the zero seed as its result.
    pub fn max(&self) -> Result<T> {
        let mut cursor = self.open_cursor()?;
        let mut best = T::zero();
        while let Some(item) = cursor.pull()? {
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
    use crate::strategy::{predicate, reducer};

    #[test]
    fn test_reduce_without_seed_numbers_from_the_second_element() {
        let seq = Sequence::from_vec(vec!["a", "b", "c"]);
        let trace = seq
            .reduce(reducer(|acc: &'static str, item, index| {
                assert!(matches!((item, index), ("b", 0) | ("c", 1)));
                if index == 1 {
                    assert_eq!(item, "c");
                }
                acc
            }))
            .unwrap();
        assert_eq!(trace, "a");
    }

    #[test]
    fn test_reduce_of_empty_without_seed_is_invalid() {
        let seq = Sequence::<i32>::empty();
        let err = seq.reduce(reducer(|acc: i32, item, _| acc + item)).unwrap_err();
        assert!(matches!(err, Error::InvalidType(_)));
    }

    #[test]
    fn test_fold_runs_from_the_seed() {
        let seq = Sequence::from_vec(vec![1, 2, 3]);
        let total = seq.fold(10, reducer(|acc: i32, item, _| acc + item)).unwrap();
        assert_eq!(total, 16);
    }

    #[test]
    fn test_join_with_default_and_custom_separators() {
        let seq = Sequence::from_vec(vec!["a", "b", "c"]);
        assert_eq!(seq.join_default().unwrap(), "a,b,c");
        assert_eq!(seq.join("_#_").unwrap(), "a_#_b_#_c");
    }

    #[test]
    fn test_sole_discriminates_three_cases() {
        let one = Sequence::from_vec(vec![7]);
        assert_eq!(one.sole().unwrap(), 7);

        let none = Sequence::<i32>::empty();
        assert!(matches!(none.sole(), Err(Error::ItemNotFound(_))));

        let two = Sequence::from_vec(vec![7, 8]);
        assert!(matches!(two.sole(), Err(Error::MultipleItemsFound(_))));
    }

    #[test]
    fn test_before_and_after_neighbors() {
        let seq = Sequence::from_vec(vec![1, 2, 3]);
        assert_eq!(seq.before(predicate(|n: &i32, _| *n == 2)).unwrap(), Some(1));
        assert_eq!(seq.after(predicate(|n: &i32, _| *n == 2)).unwrap(), Some(3));
        assert_eq!(seq.before(predicate(|n: &i32, _| *n == 1)).unwrap(), None);
        assert_eq!(seq.after(predicate(|n: &i32, _| *n == 3)).unwrap(), None);
        assert!(matches!(
            seq.after_or_fail(predicate(|n: &i32, _| *n == 9)),
            Err(Error::ItemNotFound(_)),
        ));
    }

    #[test]
    fn test_search_returns_the_first_matching_position() {
        let seq = Sequence::from_vec(vec!["x", "y", "z"]);
        assert_eq!(seq.search(predicate(|s: &&str, _| *s == "y")).unwrap(), Some(1));
        assert_eq!(seq.search(predicate(|s: &&str, _| *s == "q")).unwrap(), None);
    }

    #[test]
    fn test_median_positional_and_empty_cases() {
        let odd = Sequence::from_vec(vec![7i64, 1, 9]);
        assert_eq!(odd.median().unwrap(), 1.0);

        let even = Sequence::from_vec(vec![1i64, 2, 3, 4]);
        assert_eq!(even.median().unwrap(), 2.5);

        let empty = Sequence::<i64>::empty();
        assert_eq!(empty.median().unwrap(), 0.0);
    }

    #[test]
    fn test_min_max_keep_the_zero_seed_on_one_sided_input() {
        let negatives = Sequence::from_vec(vec![-3i64, -1, -2]);
        assert_eq!(negatives.max().unwrap(), 0);
        assert_eq!(negatives.min().unwrap(), -3);

        let positives = Sequence::from_vec(vec![3i64, 1, 2]);
        assert_eq!(positives.min().unwrap(), 0);
        assert_eq!(positives.max().unwrap(), 3);
    }

    #[test]
    fn test_average_and_percentage() {
        let seq = Sequence::from_vec(vec![1i64, 2, 3, 4]);
        assert_eq!(seq.average().unwrap(), 2.5);
        assert_eq!(
            seq.percentage(predicate(|n: &i64, _| n % 2 == 0)).unwrap(),
            50.0,
        );
        assert_eq!(
            Sequence::<i64>::empty()
                .percentage(predicate(|_: &i64, _| true))
                .unwrap(),
            0.0,
        );
    }

    #[test]
    fn test_average_of_empty_is_nan() {
        let empty = Sequence::<f64>::empty();
        assert!(empty.average().unwrap().is_nan());
    }

    #[test]
    fn test_guarded_sum_overflows_proactively() {
        let config = crate::PipelineConfig::new().guard_limits(true);
        let seq = Sequence::from_vec(vec![i64::MAX, 1]).with_config(config);
        assert!(matches!(seq.sum(), Err(Error::NumericOverflow(_))));

        let unguarded = Sequence::from_vec(vec![i64::MAX, 1]);
        assert_eq!(unguarded.sum().unwrap(), i64::MIN);
    }

    #[test]
    fn test_terminals_are_idempotent_on_repeatable_sources() {
        let seq = Sequence::from_vec(vec![3i64, 1, 2]);
        assert_eq!(seq.to_vec().unwrap(), seq.to_vec().unwrap());
        assert_eq!(seq.sum().unwrap(), seq.sum().unwrap());
        assert_eq!(seq.first().unwrap(), seq.first().unwrap());
        assert_eq!(seq.count().unwrap(), seq.count().unwrap());
    }
}

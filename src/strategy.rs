//! Named strategy interfaces for the operator families.
//!
//! Every operator stage is configured with a strategy object rather than a
//! bare closure: one named interface per family (predicate, mapper, reducer,
//! key selector, boundary, comparator), each taking the item and the
//! stage-local index. All strategy calls are fallible so custom strategies
//! can fail; plain closures are wrapped through the constructor functions
//! ([`predicate`], [`mapper`], ...) and cannot.
//!
//! The async pipeline accepts the same wrappers (a synchronous strategy is
//! trivially a suspending one), plus the `async_*` constructors for
//! strategies that genuinely suspend.

use std::cmp::Ordering;
use std::future::ready;

use futures::future::BoxFuture;

use crate::error::{BoxError, Error, Result};

// ============================================================================
// Synchronous strategy interfaces
// ============================================================================

/// Decides whether an element passes a stage.
pub trait Predicate<T>: Send + Sync {
    /// Test `item` at the stage-local `index`.
    fn test(&self, item: &T, index: usize) -> Result<bool>;
}

/// Transforms one element into one output element.
pub trait Mapper<T, Out>: Send + Sync {
    /// Map `item` at the stage-local `index`.
    fn apply(&self, item: T, index: usize) -> Result<Out>;
}

/// Folds elements into an accumulator, left to right.
pub trait Reducer<Acc, T>: Send + Sync {
    /// Combine the accumulator with `item` at `index`.
    fn combine(&self, acc: Acc, item: T, index: usize) -> Result<Acc>;
}

/// Derives a bucketing key from an element.
pub trait KeySelector<T, K>: Send + Sync {
    /// Select the key for `item` at the stage-local `index`.
    fn select(&self, item: &T, index: usize) -> Result<K>;
}

/// Decides whether an element continues the current group.
///
/// Used by `chunk_while`: a `false` verdict closes the group built so far
/// and opens a new one with `item`.
pub trait BoundaryPredicate<T>: Send + Sync {
    /// Test `item` at `index` against the group accumulated so far.
    fn test(&self, item: &T, index: usize, group: &[T]) -> Result<bool>;
}

/// Total order used by the sort stages.
pub trait Comparator<T>: Send + Sync {
    /// Compare two elements.
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

// ============================================================================
// Asynchronous strategy interfaces
// ============================================================================

/// A [`Predicate`] whose verdict may suspend.
pub trait AsyncPredicate<T>: Send + Sync {
    /// Test `item` at the stage-local `index`.
    fn test<'a>(&'a self, item: &'a T, index: usize) -> BoxFuture<'a, Result<bool>>;
}

/// A [`Mapper`] whose output may suspend.
pub trait AsyncMapper<T, Out>: Send + Sync {
    /// Map `item` at the stage-local `index`.
    fn apply<'a>(&'a self, item: T, index: usize) -> BoxFuture<'a, Result<Out>>;
}

/// A [`Reducer`] whose combine step may suspend.
pub trait AsyncReducer<Acc, T>: Send + Sync {
    /// Combine the accumulator with `item` at `index`.
    fn combine<'a>(&'a self, acc: Acc, item: T, index: usize) -> BoxFuture<'a, Result<Acc>>;
}

/// A [`KeySelector`] whose key derivation may suspend.
pub trait AsyncKeySelector<T, K>: Send + Sync {
    /// Select the key for `item` at the stage-local `index`.
    fn select<'a>(&'a self, item: &'a T, index: usize) -> BoxFuture<'a, Result<K>>;
}

/// A [`BoundaryPredicate`] whose verdict may suspend.
pub trait AsyncBoundaryPredicate<T>: Send + Sync {
    /// Test `item` at `index` against the group accumulated so far.
    fn test<'a>(&'a self, item: &'a T, index: usize, group: &'a [T]) -> BoxFuture<'a, Result<bool>>;
}

// ============================================================================
// Infallible closure wrappers
// ============================================================================

/// A [`Predicate`] built from an infallible closure. See [`predicate`].
pub struct PredicateFn<F> {
    f: F,
}

/// Wrap an infallible closure as a [`Predicate`].
pub fn predicate<T, F>(f: F) -> PredicateFn<F>
where
    F: Fn(&T, usize) -> bool + Send + Sync,
{
    PredicateFn { f }
}

impl<T, F> Predicate<T> for PredicateFn<F>
where
    F: Fn(&T, usize) -> bool + Send + Sync,
{
    fn test(&self, item: &T, index: usize) -> Result<bool> {
        Ok((self.f)(item, index))
    }
}

/// A [`Mapper`] built from an infallible closure. See [`mapper`].
pub struct MapperFn<F> {
    f: F,
}

/// Wrap an infallible closure as a [`Mapper`].
pub fn mapper<T, Out, F>(f: F) -> MapperFn<F>
where
    F: Fn(T, usize) -> Out + Send + Sync,
{
    MapperFn { f }
}

impl<T, Out, F> Mapper<T, Out> for MapperFn<F>
where
    F: Fn(T, usize) -> Out + Send + Sync,
{
    fn apply(&self, item: T, index: usize) -> Result<Out> {
        Ok((self.f)(item, index))
    }
}

/// A [`Reducer`] built from an infallible closure. See [`reducer`].
pub struct ReducerFn<F> {
    f: F,
}

/// Wrap an infallible closure as a [`Reducer`].
pub fn reducer<Acc, T, F>(f: F) -> ReducerFn<F>
where
    F: Fn(Acc, T, usize) -> Acc + Send + Sync,
{
    ReducerFn { f }
}

impl<Acc, T, F> Reducer<Acc, T> for ReducerFn<F>
where
    F: Fn(Acc, T, usize) -> Acc + Send + Sync,
{
    fn combine(&self, acc: Acc, item: T, index: usize) -> Result<Acc> {
        Ok((self.f)(acc, item, index))
    }
}

/// A [`KeySelector`] built from an infallible closure. See [`selector`].
pub struct SelectorFn<F> {
    f: F,
}

/// Wrap an infallible closure as a [`KeySelector`].
pub fn selector<T, K, F>(f: F) -> SelectorFn<F>
where
    F: Fn(&T, usize) -> K + Send + Sync,
{
    SelectorFn { f }
}

impl<T, K, F> KeySelector<T, K> for SelectorFn<F>
where
    F: Fn(&T, usize) -> K + Send + Sync,
{
    fn select(&self, item: &T, index: usize) -> Result<K> {
        Ok((self.f)(item, index))
    }
}

/// A [`BoundaryPredicate`] built from an infallible closure. See [`boundary`].
pub struct BoundaryFn<F> {
    f: F,
}

/// Wrap an infallible closure as a [`BoundaryPredicate`].
pub fn boundary<T, F>(f: F) -> BoundaryFn<F>
where
    F: Fn(&T, usize, &[T]) -> bool + Send + Sync,
{
    BoundaryFn { f }
}

impl<T, F> BoundaryPredicate<T> for BoundaryFn<F>
where
    F: Fn(&T, usize, &[T]) -> bool + Send + Sync,
{
    fn test(&self, item: &T, index: usize, group: &[T]) -> Result<bool> {
        Ok((self.f)(item, index, group))
    }
}

/// A [`Comparator`] built from a closure. See [`comparator`].
pub struct ComparatorFn<F> {
    f: F,
}

/// Wrap a closure as a [`Comparator`].
pub fn comparator<T, F>(f: F) -> ComparatorFn<F>
where
    F: Fn(&T, &T) -> Ordering + Send + Sync,
{
    ComparatorFn { f }
}

impl<T, F> Comparator<T> for ComparatorFn<F>
where
    F: Fn(&T, &T) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.f)(a, b)
    }
}

// ============================================================================
// Fallible closure wrappers
// ============================================================================

/// A [`Predicate`] built from a fallible closure. See [`try_predicate`].
pub struct TryPredicateFn<F> {
    f: F,
}

/// Wrap a fallible closure as a [`Predicate`].
///
/// The closure's error enters the pipeline through the exception boundary:
/// a foreign error is wrapped once into [`Error::Unexpected`], a library
/// error propagates unchanged.
pub fn try_predicate<T, F, E>(f: F) -> TryPredicateFn<F>
where
    F: Fn(&T, usize) -> std::result::Result<bool, E> + Send + Sync,
    E: Into<BoxError>,
{
    TryPredicateFn { f }
}

impl<T, F, E> Predicate<T> for TryPredicateFn<F>
where
    F: Fn(&T, usize) -> std::result::Result<bool, E> + Send + Sync,
    E: Into<BoxError>,
{
    fn test(&self, item: &T, index: usize) -> Result<bool> {
        (self.f)(item, index).map_err(Error::unexpected)
    }
}

/// A [`Mapper`] built from a fallible closure. See [`try_mapper`].
pub struct TryMapperFn<F> {
    f: F,
}

/// Wrap a fallible closure as a [`Mapper`].
///
/// Errors cross the same exception boundary as [`try_predicate`].
pub fn try_mapper<T, Out, F, E>(f: F) -> TryMapperFn<F>
where
    F: Fn(T, usize) -> std::result::Result<Out, E> + Send + Sync,
    E: Into<BoxError>,
{
    TryMapperFn { f }
}

impl<T, Out, F, E> Mapper<T, Out> for TryMapperFn<F>
where
    F: Fn(T, usize) -> std::result::Result<Out, E> + Send + Sync,
    E: Into<BoxError>,
{
    fn apply(&self, item: T, index: usize) -> Result<Out> {
        (self.f)(item, index).map_err(Error::unexpected)
    }
}

/// A [`Reducer`] built from a fallible closure. See [`try_reducer`].
pub struct TryReducerFn<F> {
    f: F,
}

/// Wrap a fallible closure as a [`Reducer`].
///
/// Errors cross the same exception boundary as [`try_predicate`].
pub fn try_reducer<Acc, T, F, E>(f: F) -> TryReducerFn<F>
where
    F: Fn(Acc, T, usize) -> std::result::Result<Acc, E> + Send + Sync,
    E: Into<BoxError>,
{
    TryReducerFn { f }
}

impl<Acc, T, F, E> Reducer<Acc, T> for TryReducerFn<F>
where
    F: Fn(Acc, T, usize) -> std::result::Result<Acc, E> + Send + Sync,
    E: Into<BoxError>,
{
    fn combine(&self, acc: Acc, item: T, index: usize) -> Result<Acc> {
        (self.f)(acc, item, index).map_err(Error::unexpected)
    }
}

// ============================================================================
// Named strategies
// ============================================================================

/// Key selector that uses the element itself as its key.
pub struct IdentityKey;

/// The identity [`KeySelector`], for `group_by`/`count_by`/`unique_by`
/// call sites that bucket elements by their own value.
pub fn identity() -> IdentityKey {
    IdentityKey
}

impl<T> KeySelector<T, T> for IdentityKey
where
    T: Clone,
{
    fn select(&self, item: &T, _index: usize) -> Result<T> {
        Ok(item.clone())
    }
}

/// Comparator using the element type's own total order.
pub struct NaturalOrder;

impl<T> Comparator<T> for NaturalOrder
where
    T: Ord,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

/// Logical negation of another predicate.
///
/// The `while`-style selection stages are defined as their `until`
/// counterparts with the predicate negated; this wrapper is that negation.
pub struct Negate<P> {
    inner: P,
}

impl<P> Negate<P> {
    /// Negate `inner`.
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<T, P> Predicate<T> for Negate<P>
where
    P: Predicate<T>,
{
    fn test(&self, item: &T, index: usize) -> Result<bool> {
        Ok(!self.inner.test(item, index)?)
    }
}

// ============================================================================
// Async closure wrappers
// ============================================================================

/// An [`AsyncPredicate`] built from a future-returning closure.
/// See [`async_predicate`].
pub struct AsyncPredicateFn<F> {
    f: F,
}

/// Wrap a future-returning closure as an [`AsyncPredicate`].
///
/// The closure receives the element by value (cloned out of the pipeline)
/// so the returned future owns everything it needs.
pub fn async_predicate<T, F>(f: F) -> AsyncPredicateFn<F>
where
    F: Fn(T, usize) -> BoxFuture<'static, Result<bool>> + Send + Sync,
{
    AsyncPredicateFn { f }
}

impl<T, F> AsyncPredicate<T> for AsyncPredicateFn<F>
where
    T: Clone + Send + Sync,
    F: Fn(T, usize) -> BoxFuture<'static, Result<bool>> + Send + Sync,
{
    fn test<'a>(&'a self, item: &'a T, index: usize) -> BoxFuture<'a, Result<bool>> {
        (self.f)(item.clone(), index)
    }
}

/// An [`AsyncMapper`] built from a future-returning closure.
/// See [`async_mapper`].
pub struct AsyncMapperFn<F> {
    f: F,
}

/// Wrap a future-returning closure as an [`AsyncMapper`].
pub fn async_mapper<T, Out, F>(f: F) -> AsyncMapperFn<F>
where
    F: Fn(T, usize) -> BoxFuture<'static, Result<Out>> + Send + Sync,
{
    AsyncMapperFn { f }
}

impl<T, Out, F> AsyncMapper<T, Out> for AsyncMapperFn<F>
where
    T: Send,
    F: Fn(T, usize) -> BoxFuture<'static, Result<Out>> + Send + Sync,
{
    fn apply<'a>(&'a self, item: T, index: usize) -> BoxFuture<'a, Result<Out>> {
        (self.f)(item, index)
    }
}

/// An [`AsyncReducer`] built from a future-returning closure.
/// See [`async_reducer`].
pub struct AsyncReducerFn<F> {
    f: F,
}

/// Wrap a future-returning closure as an [`AsyncReducer`].
pub fn async_reducer<Acc, T, F>(f: F) -> AsyncReducerFn<F>
where
    F: Fn(Acc, T, usize) -> BoxFuture<'static, Result<Acc>> + Send + Sync,
{
    AsyncReducerFn { f }
}

impl<Acc, T, F> AsyncReducer<Acc, T> for AsyncReducerFn<F>
where
    Acc: Send,
    T: Send,
    F: Fn(Acc, T, usize) -> BoxFuture<'static, Result<Acc>> + Send + Sync,
{
    fn combine<'a>(&'a self, acc: Acc, item: T, index: usize) -> BoxFuture<'a, Result<Acc>> {
        (self.f)(acc, item, index)
    }
}

/// An [`AsyncKeySelector`] built from a future-returning closure.
/// See [`async_selector`].
pub struct AsyncSelectorFn<F> {
    f: F,
}

/// Wrap a future-returning closure as an [`AsyncKeySelector`].
pub fn async_selector<T, K, F>(f: F) -> AsyncSelectorFn<F>
where
    F: Fn(T, usize) -> BoxFuture<'static, Result<K>> + Send + Sync,
{
    AsyncSelectorFn { f }
}

impl<T, K, F> AsyncKeySelector<T, K> for AsyncSelectorFn<F>
where
    T: Clone + Send + Sync,
    F: Fn(T, usize) -> BoxFuture<'static, Result<K>> + Send + Sync,
{
    fn select<'a>(&'a self, item: &'a T, index: usize) -> BoxFuture<'a, Result<K>> {
        (self.f)(item.clone(), index)
    }
}

// ============================================================================
// Sync-to-async bridging
// ============================================================================

impl<T, F> AsyncPredicate<T> for PredicateFn<F>
where
    T: Send + Sync,
    F: Fn(&T, usize) -> bool + Send + Sync,
{
    fn test<'a>(&'a self, item: &'a T, index: usize) -> BoxFuture<'a, Result<bool>> {
        Box::pin(ready(Predicate::test(self, item, index)))
    }
}

impl<T, F, E> AsyncPredicate<T> for TryPredicateFn<F>
where
    T: Send + Sync,
    F: Fn(&T, usize) -> std::result::Result<bool, E> + Send + Sync,
    E: Into<BoxError>,
{
    fn test<'a>(&'a self, item: &'a T, index: usize) -> BoxFuture<'a, Result<bool>> {
        Box::pin(ready(Predicate::test(self, item, index)))
    }
}

impl<T, P> AsyncPredicate<T> for Negate<P>
where
    T: Send + Sync,
    P: AsyncPredicate<T>,
{
    fn test<'a>(&'a self, item: &'a T, index: usize) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(!self.inner.test(item, index).await?) })
    }
}

impl<T, Out, F> AsyncMapper<T, Out> for MapperFn<F>
where
    T: Send,
    Out: Send + 'static,
    F: Fn(T, usize) -> Out + Send + Sync,
{
    fn apply<'a>(&'a self, item: T, index: usize) -> BoxFuture<'a, Result<Out>> {
        Box::pin(ready(Mapper::apply(self, item, index)))
    }
}

impl<T, Out, F, E> AsyncMapper<T, Out> for TryMapperFn<F>
where
    T: Send,
    Out: Send + 'static,
    F: Fn(T, usize) -> std::result::Result<Out, E> + Send + Sync,
    E: Into<BoxError>,
{
    fn apply<'a>(&'a self, item: T, index: usize) -> BoxFuture<'a, Result<Out>> {
        Box::pin(ready(Mapper::apply(self, item, index)))
    }
}

impl<Acc, T, F> AsyncReducer<Acc, T> for ReducerFn<F>
where
    Acc: Send + 'static,
    T: Send,
    F: Fn(Acc, T, usize) -> Acc + Send + Sync,
{
    fn combine<'a>(&'a self, acc: Acc, item: T, index: usize) -> BoxFuture<'a, Result<Acc>> {
        Box::pin(ready(Reducer::combine(self, acc, item, index)))
    }
}

impl<Acc, T, F, E> AsyncReducer<Acc, T> for TryReducerFn<F>
where
    Acc: Send + 'static,
    T: Send,
    F: Fn(Acc, T, usize) -> std::result::Result<Acc, E> + Send + Sync,
    E: Into<BoxError>,
{
    fn combine<'a>(&'a self, acc: Acc, item: T, index: usize) -> BoxFuture<'a, Result<Acc>> {
        Box::pin(ready(Reducer::combine(self, acc, item, index)))
    }
}

impl<T, K, F> AsyncKeySelector<T, K> for SelectorFn<F>
where
    T: Send + Sync,
    K: Send + 'static,
    F: Fn(&T, usize) -> K + Send + Sync,
{
    fn select<'a>(&'a self, item: &'a T, index: usize) -> BoxFuture<'a, Result<K>> {
        Box::pin(ready(KeySelector::select(self, item, index)))
    }
}

impl<T> AsyncKeySelector<T, T> for IdentityKey
where
    T: Clone + Send + Sync,
{
    fn select<'a>(&'a self, item: &'a T, index: usize) -> BoxFuture<'a, Result<T>> {
        Box::pin(ready(KeySelector::select(self, item, index)))
    }
}

impl<T, F> AsyncBoundaryPredicate<T> for BoundaryFn<F>
where
    T: Send + Sync,
    F: Fn(&T, usize, &[T]) -> bool + Send + Sync,
{
    fn test<'a>(&'a self, item: &'a T, index: usize, group: &'a [T]) -> BoxFuture<'a, Result<bool>> {
        Box::pin(ready(BoundaryPredicate::test(self, item, index, group)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_wrapper_reports_index() {
        let even_index = predicate(|_: &i32, index| index % 2 == 0);
        assert!(Predicate::test(&even_index, &10, 0).unwrap());
        assert!(!Predicate::test(&even_index, &10, 1).unwrap());
    }

    #[test]
    fn test_try_predicate_wraps_foreign_errors() {
        let failing = try_predicate(|_: &i32, _| -> std::result::Result<bool, std::io::Error> {
            Err(std::io::Error::other("boom"))
        });
        let err = Predicate::test(&failing, &1, 0).unwrap_err();
        assert!(matches!(err, Error::Unexpected { .. }));
    }

    #[test]
    fn test_negate_inverts() {
        let positive = predicate(|item: &i32, _| *item > 0);
        let negated = Negate::new(positive);
        assert!(!Predicate::test(&negated, &5, 0).unwrap());
        assert!(Predicate::test(&negated, &-5, 0).unwrap());
    }

    #[test]
    fn test_identity_selector_clones_the_element() {
        let id = identity();
        let key: String = KeySelector::select(&id, &"a".to_string(), 3).unwrap();
        assert_eq!(key, "a");
    }

    #[test]
    fn test_natural_order() {
        assert_eq!(Comparator::compare(&NaturalOrder, &1, &2), Ordering::Less);
    }
}

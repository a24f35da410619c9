//! Integration tests for the asynchronous pipeline system.
//!
//! The async variant must mirror the synchronous semantics stage for stage,
//! with suspension allowed at every pull and strategy call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cascade::prelude::*;
use futures::StreamExt;

/// Construction runs no user code; only awaited terminals do.
#[tokio::test]
async fn test_operators_are_lazy_until_a_terminal_runs() {
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&calls);
    let pipeline = AsyncSequence::from_vec(vec![1, 2, 3])
        .filter(predicate(move |_: &i32, _| {
            counted.fetch_add(1, Ordering::Relaxed);
            true
        }));

    assert_eq!(calls.load(Ordering::Relaxed), 0);
    pipeline.to_vec().await.unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 3);
}

/// A genuinely suspending strategy still sees the synchronous index
/// contract: one count per considered element.
#[tokio::test]
async fn test_suspending_predicate_index_fidelity() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

    let record = Arc::clone(&seen);
    AsyncSequence::from_vec(vec!["a", "bc", "c", "a", "d", "a"])
        .filter(async_predicate(move |_: &'static str, index| {
            let record = Arc::clone(&record);
            Box::pin(async move {
                tokio::task::yield_now().await;
                record.lock().unwrap().push(index);
                Ok(true)
            })
        }))
        .to_vec()
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

/// Early termination never pulls the stream past the deciding element.
#[tokio::test]
async fn test_early_termination_does_not_over_pull() {
    let pulled = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&pulled);
    let stream = futures::stream::iter(0..100).inspect(move |_| {
        counted.fetch_add(1, Ordering::Relaxed);
    });
    let seq = AsyncSequence::from_stream(stream);

    assert_eq!(seq.take(3).to_vec().await.unwrap(), vec![0, 1, 2]);
    assert_eq!(pulled.load(Ordering::Relaxed), 3);
}

/// Channel-fed pipelines drain until every sender is gone.
#[tokio::test]
async fn test_channel_source_end_to_end() {
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let producer = tokio::spawn(async move {
        for n in 1..=5 {
            tx.send(n).await.unwrap();
        }
    });

    let seq = AsyncSequence::from_channel(rx);
    let doubled = seq.map(mapper(|n: i32, _| n * 2));
    assert_eq!(doubled.to_vec().await.unwrap(), vec![2, 4, 6, 8, 10]);
    producer.await.unwrap();
}

#[tokio::test]
async fn test_windowing_matches_the_sync_variant() {
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

    let eight = AsyncSequence::from_vec((1..=8).collect::<Vec<_>>());
    assert_eq!(
        eight.chunk(4).to_vec().await.unwrap(),
        vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]],
    );
}

#[tokio::test]
async fn test_zip_and_pair_shape() {
    let left = AsyncSequence::from_vec(vec!["a", "b", "c"]);
    let right = AsyncSequence::from_vec(vec![1, 2, 3, 4]);

    let pairs = left.zip(&right).to_vec().await.unwrap();
    assert_eq!(pairs.len(), 3);
    assert_eq!(*pairs[0].left(), "a");
    assert_eq!(*pairs[0].right(), 1);
}

#[tokio::test]
async fn test_error_contracts_match_the_sync_variant() {
    let empty = AsyncSequence::<i32>::empty();
    assert!(matches!(
        empty.reduce(reducer(|acc: i32, item, _| acc + item)).await,
        Err(Error::InvalidType(_)),
    ));
    assert!(matches!(
        empty.sole().await,
        Err(Error::ItemNotFound(_)),
    ));
    assert!(matches!(
        AsyncSequence::from_vec(vec![1, 2]).sole().await,
        Err(Error::MultipleItemsFound(_)),
    ));

    let failing = AsyncSequence::from_vec(vec![1])
        .map(try_mapper(|_: i32, _| -> std::result::Result<i32, std::io::Error> {
            Err(std::io::Error::other("remote reader failed"))
        }));
    assert!(matches!(
        failing.to_vec().await,
        Err(Error::Unexpected { .. }),
    ));
}

#[tokio::test]
async fn test_median_and_guard_flags() {
    assert_eq!(AsyncSequence::<i64>::empty().median().await.unwrap(), 0.0);

    let config = PipelineConfig::new().guard_limits(true);
    let guarded = AsyncSequence::from_vec(vec![i64::MAX, 1]).with_config(config);
    assert!(matches!(guarded.sum().await, Err(Error::NumericOverflow(_))));
}

/// Re-running a terminal on a repeatable async pipeline re-runs the chain
/// and produces the same result.
#[tokio::test]
async fn test_terminal_idempotence() {
    let pipeline = AsyncSequence::from_vec((1..=6).collect::<Vec<i64>>())
        .filter(predicate(|n: &i64, _| n % 3 != 0));

    assert_eq!(
        pipeline.to_vec().await.unwrap(),
        pipeline.to_vec().await.unwrap(),
    );
    assert_eq!(pipeline.sum().await.unwrap(), pipeline.sum().await.unwrap());
}

/// One pull in flight per traversal: a suspending mapper observes strictly
/// sequential, ordered processing.
#[tokio::test]
async fn test_processing_is_strictly_sequential() {
    let active = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicUsize::new(0));

    let active_probe = Arc::clone(&active);
    let overlap_probe = Arc::clone(&overlap);
    let result = AsyncSequence::from_vec((1..=10).collect::<Vec<_>>())
        .map(async_mapper(move |n: i32, _| {
            let active = Arc::clone(&active_probe);
            let overlap = Arc::clone(&overlap_probe);
            Box::pin(async move {
                if active.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                tokio::task::yield_now().await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(n)
            })
        }))
        .to_vec()
        .await
        .unwrap();

    assert_eq!(result, (1..=10).collect::<Vec<_>>());
    assert_eq!(overlap.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stream_interop_round_trip() {
    let source = futures::stream::iter(vec![1, 2, 3, 4]);
    let seq = AsyncSequence::from_stream(source).filter(predicate(|n: &i32, _| n % 2 == 0));

    let collected: Vec<i32> = seq
        .into_stream()
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(collected, vec![2, 4]);
}

#[tokio::test]
async fn test_sync_to_async_bridge_keeps_semantics() {
    let sync = Sequence::from_vec((1..=5).collect::<Vec<i64>>())
        .filter(predicate(|n: &i64, _| n % 2 == 1));

    let lifted = sync.into_async().map(mapper(|n: i64, _| n * 10));
    assert_eq!(lifted.to_vec().await.unwrap(), vec![10, 30, 50]);
}

//! Integration tests for the synchronous pipeline system.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cascade::prelude::*;
use cascade::strategy::Predicate;

/// Constructing operator stages must not run any user callback; only a
/// terminal operation drives the chain.
#[test]
fn test_operators_are_lazy_until_a_terminal_runs() {
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&calls);
    let pipeline = Sequence::from_vec(vec![1, 2, 3, 4])
        .filter(predicate(move |n: &i32, _| {
            counted.fetch_add(1, Ordering::Relaxed);
            n % 2 == 0
        }))
        .map(mapper(|n: i32, _| n * 10));

    assert_eq!(calls.load(Ordering::Relaxed), 0);

    assert_eq!(pipeline.to_vec().unwrap(), vec![20, 40]);
    assert_eq!(calls.load(Ordering::Relaxed), 4);
}

/// A filter stage counts every element it considers, yielded or not.
#[test]
fn test_filter_index_fidelity() {
    let seen = Arc::new(Mutex::new(Vec::new()));

    let record = Arc::clone(&seen);
    Sequence::from_vec(vec!["a", "bc", "c", "a", "d", "a"])
        .filter(predicate(move |_: &&str, index| {
            record.lock().unwrap().push(index);
            true
        }))
        .to_vec()
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

/// Early-terminating terminals must not pull the source past the deciding
/// element.
#[test]
fn test_early_termination_does_not_over_pull() {
    let pulled = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&pulled);
    let seq = Sequence::from_iter_once((0..100).inspect(move |_| {
        counted.fetch_add(1, Ordering::Relaxed);
    }));
    assert_eq!(seq.take(3).to_vec().unwrap(), vec![0, 1, 2]);
    assert_eq!(pulled.load(Ordering::Relaxed), 3);

    let pulled = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&pulled);
    let seq = Sequence::from_iter_once((0..100).inspect(move |_| {
        counted.fetch_add(1, Ordering::Relaxed);
    }));
    assert_eq!(seq.first().unwrap(), Some(0));
    assert_eq!(pulled.load(Ordering::Relaxed), 1);
}

/// `sole` stops pulling as soon as the second match is seen.
#[test]
fn test_sole_short_circuits_on_the_second_match() {
    let pulled = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&pulled);
    let seq = Sequence::from_iter_once((0..100).inspect(move |_| {
        counted.fetch_add(1, Ordering::Relaxed);
    }));
    assert!(matches!(seq.sole(), Err(Error::MultipleItemsFound(_))));
    assert_eq!(pulled.load(Ordering::Relaxed), 2);
}

#[test]
fn test_reduce_and_join_contracts() {
    let seq = Sequence::from_vec(vec!["a", "b", "c"]);
    assert_eq!(seq.join_default().unwrap(), "a,b,c");
    assert_eq!(seq.join("_#_").unwrap(), "a_#_b_#_c");

    let empty = Sequence::<i32>::empty();
    assert!(matches!(
        empty.reduce(reducer(|acc: i32, item, _| acc + item)),
        Err(Error::InvalidType(_)),
    ));

    // Without a seed the first combine call reports index 0 for the
    // logically second element.
    let indices = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&indices);
    let folded = Sequence::from_vec(vec![10, 20, 30])
        .reduce(reducer(move |acc: i32, item, index| {
            record.lock().unwrap().push((item, index));
            acc + item
        }))
        .unwrap();
    assert_eq!(folded, 60);
    assert_eq!(*indices.lock().unwrap(), vec![(20, 0), (30, 1)]);
}

#[test]
fn test_windowing_contracts() {
    let eight = Sequence::from_vec((1..=8).collect::<Vec<_>>());
    assert_eq!(
        eight.chunk(4).to_vec().unwrap(),
        vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]],
    );
    assert_eq!(eight.chunk(1).count().unwrap(), 8);

    let eleven = Sequence::from_vec((1..=11).collect::<Vec<_>>());
    let sizes: Vec<usize> = eleven
        .split(3)
        .to_vec()
        .unwrap()
        .iter()
        .map(Vec::len)
        .collect();
    assert_eq!(sizes, vec![4, 4, 3]);
}

/// Partition produces exactly two groups with original relative order, even
/// for mixed-shape elements.
#[test]
fn test_partition_over_mixed_elements() {
    #[derive(Debug, Clone, PartialEq)]
    enum Value {
        Text(&'static str),
        Number(i64),
    }

    let seq = Sequence::from_vec(vec![
        Value::Text("a"),
        Value::Number(1),
        Value::Text("b"),
        Value::Number(2),
    ]);
    let groups = seq
        .partition(predicate(|v: &Value, _| matches!(v, Value::Text(_))))
        .to_vec()
        .unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0], vec![Value::Text("a"), Value::Text("b")]);
    assert_eq!(groups[1], vec![Value::Number(1), Value::Number(2)]);
}

#[test]
fn test_take_skip_negative_arguments() {
    let seq = Sequence::from_vec((1..=10).collect::<Vec<_>>());
    assert_eq!(seq.take(-2).to_vec().unwrap(), (1..=8).collect::<Vec<_>>());
    assert_eq!(seq.skip(-2).to_vec().unwrap(), vec![9, 10]);
    assert_eq!(seq.take(-20).to_vec().unwrap(), Vec::<i32>::new());
    assert_eq!(seq.skip(-20).to_vec().unwrap(), (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_insert_no_match_passthrough() {
    let seq = Sequence::from_vec(vec![1, 2, 3]);
    let nothing = predicate(|n: &i32, _| *n == 99);
    assert_eq!(
        seq.insert_before(nothing, vec![7, 8]).to_vec().unwrap(),
        vec![1, 2, 3],
    );
    let nothing = predicate(|n: &i32, _| *n == 99);
    assert_eq!(
        seq.insert_after(nothing, vec![7, 8]).to_vec().unwrap(),
        vec![1, 2, 3],
    );
}

#[test]
fn test_zip_truncates_to_the_shorter_sequence() {
    let letters = Sequence::from_vec(vec!["a", "b", "c"]);
    let numbers = Sequence::from_vec(vec![1, 2, 3, 4]);

    let pairs = letters.zip(&numbers).to_vec().unwrap();
    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[2], Pair::new("c", 3));

    let reversed = numbers.zip(&letters).to_vec().unwrap();
    assert_eq!(reversed.len(), 3);
    assert_eq!(reversed[0], Pair::new(1, "a"));
}

#[test]
fn test_median_and_min_max_edge_cases() {
    assert_eq!(Sequence::<i64>::empty().median().unwrap(), 0.0);
    assert_eq!(Sequence::from_vec(vec![1i64, 2, 3, 4]).median().unwrap(), 2.5);

    // The zero seed survives one-sided input.
    let negatives = Sequence::from_vec(vec![-4i64, -2, -9]);
    assert_eq!(negatives.max().unwrap(), 0);
    assert_eq!(negatives.min().unwrap(), -9);
}

/// Terminal operations re-run the chain from the source; on a repeatable
/// source the results are identical every time.
#[test]
fn test_terminal_idempotence() {
    let pipeline = Sequence::from_vec((1..=6).collect::<Vec<i64>>())
        .filter(predicate(|n: &i64, _| n % 2 == 0))
        .map(mapper(|n: i64, _| n * n));

    assert_eq!(pipeline.to_vec().unwrap(), pipeline.to_vec().unwrap());
    assert_eq!(pipeline.sum().unwrap(), pipeline.sum().unwrap());
    assert_eq!(pipeline.first().unwrap(), pipeline.first().unwrap());
}

/// A single-use source is consumed by its first traversal, and says so.
#[test]
fn test_single_use_versus_repeatable_sources() {
    let single = Sequence::from_iter_once(vec![1, 2, 3].into_iter());
    assert!(!single.repeatable());
    assert_eq!(single.to_vec().unwrap(), vec![1, 2, 3]);
    assert_eq!(single.to_vec().unwrap(), Vec::<i32>::new());

    let repeatable = Sequence::from_vec(vec![1, 2, 3]);
    assert!(repeatable.repeatable());
    assert_eq!(repeatable.to_vec().unwrap(), vec![1, 2, 3]);
    assert_eq!(repeatable.to_vec().unwrap(), vec![1, 2, 3]);
}

/// Foreign strategy errors are wrapped once; library errors from custom
/// strategies propagate unchanged.
#[test]
fn test_exception_translation_boundary() {
    let seq = Sequence::from_vec(vec![1, 2, 3]);

    let failing = seq.map(try_mapper(|n: i32, _| {
        if n == 2 {
            Err(std::io::Error::other("backing store went away"))
        } else {
            Ok(n)
        }
    }));
    match failing.to_vec() {
        Err(Error::Unexpected { source }) => {
            assert!(source.downcast_ref::<std::io::Error>().is_some());
        }
        other => panic!("expected a wrapped foreign error, got {other:?}"),
    }

    struct NotFound;
    impl Predicate<i32> for NotFound {
        fn test(&self, _item: &i32, _index: usize) -> Result<bool> {
            Err(Error::ItemNotFound("custom lookup"))
        }
    }
    match seq.filter(NotFound).to_vec() {
        Err(Error::ItemNotFound("custom lookup")) => {}
        other => panic!("expected the library error untouched, got {other:?}"),
    }
}

/// The guard flag is pipeline-wide: set once at the handle, honored by the
/// numeric terminals.
#[test]
fn test_guarded_pipeline_configuration() {
    let config = PipelineConfig::new().guard_limits(true);

    let guarded = Sequence::from_vec(vec![i64::MAX, 1]).with_config(config);
    assert!(matches!(guarded.sum(), Err(Error::NumericOverflow(_))));

    let guarded = Sequence::from_vec(vec![i64::MIN, -1]).with_config(config);
    assert!(matches!(guarded.sum(), Err(Error::NumericUnderflow(_))));

    let unguarded = Sequence::from_vec(vec![i64::MAX, 1]);
    assert_eq!(unguarded.sum().unwrap(), i64::MIN);
}

#[test]
fn test_iteration_protocol() {
    let seq = Sequence::from_vec(vec![1, 2, 3]);
    let via_iter: Vec<i32> = seq.iter().map(Result::unwrap).collect();
    assert_eq!(via_iter, vec![1, 2, 3]);

    let mut total = 0;
    for item in &seq {
        total += item.unwrap();
    }
    assert_eq!(total, 6);
}

#[test]
fn test_grouping_and_uniqueness() {
    let words = Sequence::from_vec(vec!["ant", "bee", "ape", "bug", "auk"]);

    let buckets = words
        .group_by(selector(|w: &&str, _| w.as_bytes()[0]))
        .to_vec()
        .unwrap();
    assert_eq!(buckets[0].key, b'a');
    assert_eq!(buckets[0].value, vec!["ant", "ape", "auk"]);
    assert_eq!(buckets[1].value, vec!["bee", "bug"]);

    let counts = words
        .count_by(selector(|w: &&str, _| w.len()))
        .to_vec()
        .unwrap();
    assert_eq!(counts, vec![Pair::new(3, 5)]);

    let firsts = words
        .unique_by(selector(|w: &&str, _| w.as_bytes()[0]))
        .to_vec()
        .unwrap();
    assert_eq!(firsts, vec!["ant", "bee"]);
}

/// A long chain exercises several stage kinds in one traversal.
#[test]
fn test_long_pipeline() {
    let result = Sequence::from_vec((1..=20).collect::<Vec<i64>>())
        .filter(predicate(|n: &i64, _| n % 2 == 0))
        .map(mapper(|n: i64, _| n * 3))
        .skip(1)
        .take(6)
        .reverse()
        .to_vec()
        .unwrap();
    assert_eq!(result, vec![42, 36, 30, 24, 18, 12]);
}

#[test]
fn test_update_flat_map_and_collapse() {
    let seq = Sequence::from_vec(vec![1, 2, 3]);

    let bumped = seq.update(
        predicate(|n: &i32, _| n % 2 == 1),
        mapper(|n: i32, _| n + 100),
    );
    assert_eq!(bumped.to_vec().unwrap(), vec![101, 2, 103]);

    let spliced = seq.flat_map(mapper(|n: i32, _| Sequence::from_vec(vec![n, -n])));
    assert_eq!(spliced.to_vec().unwrap(), vec![1, -1, 2, -2, 3, -3]);

    let nested = seq.chunk(2);
    assert_eq!(nested.collapse().to_vec().unwrap(), vec![1, 2, 3]);
}

//! Asynchronous lazy pipelines.
//!
//! [`AsyncSequence<T>`] mirrors [`Sequence`](crate::Sequence) stage for
//! stage over sources whose production may suspend: streams, channels, or
//! strategies that await. Only one pull is in flight per traversal; ordering
//! and index counting are identical to the synchronous variant.

mod compose;
mod select;
mod source;
mod terminal;
mod transform;
mod window;

use std::sync::{Arc, Mutex};

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::seq::Sequence;

pub(crate) use source::{
    drain_count, AsyncCursor, AsyncNode, AsyncPull, ChannelSource, Exhausted, StreamSource,
    SyncBridgeNode, VecSource,
};

/// A lazy, chainable pipeline over an asynchronous sequence of elements.
///
/// Construction is free of side effects and runs no user code; terminal
/// operations open a fresh cursor chain and drive it one element at a time,
/// suspending wherever the source or a strategy does.
///
/// # Repeatability
///
/// Vector-backed sequences are repeatable; stream- and channel-backed
/// sequences are consumed by their first traversal and yield nothing
/// afterwards, exactly like the single-use synchronous sources. The
/// capability is queryable via [`AsyncSequence::repeatable`].
///
/// # Example
///
/// ```rust
/// use cascade::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cascade::Result<()> {
/// let evens = AsyncSequence::from_vec(vec![1, 2, 3, 4])
///     .filter(predicate(|n: &i32, _| n % 2 == 0));
/// assert_eq!(evens.to_vec().await?, vec![2, 4]);
/// # Ok(())
/// # }
/// ```
pub struct AsyncSequence<T> {
    pub(crate) node: Arc<dyn AsyncNode<T>>,
    pub(crate) config: PipelineConfig,
}

impl<T> Clone for AsyncSequence<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            config: self.config,
        }
    }
}

impl<T> AsyncSequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap a vector into a repeatable sequence.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::from_node(VecSource::new(items))
    }

    /// Collect an iterable into a repeatable sequence.
    pub fn from_values(items: impl IntoIterator<Item = T>) -> Self {
        Self::from_vec(items.into_iter().collect())
    }

    /// Wrap a stream into a single-use sequence.
    pub fn from_stream(stream: impl Stream<Item = T> + Send + 'static) -> Self {
        Self::from_node(StreamSource::new(stream.boxed()))
    }

    /// Wrap a tokio mpsc receiver into a single-use sequence.
    ///
    /// The traversal ends when every sender is dropped.
    pub fn from_channel(receiver: tokio::sync::mpsc::Receiver<T>) -> Self {
        Self::from_node(ChannelSource::new(receiver))
    }

    /// The empty sequence.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Whether fresh traversals restart from the first element.
    pub fn repeatable(&self) -> bool {
        self.node.repeatable()
    }

    /// The pipeline-wide configuration.
    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Replace the pipeline-wide configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Convert the pipeline into a `futures` stream of results.
    ///
    /// This is the pull-next-or-done protocol downstream crates consume.
    /// The stream ends after the first error.
    pub fn into_stream(self) -> BoxStream<'static, Result<T>> {
        match self.open_cursor() {
            Ok(cursor) => futures::stream::unfold(Some(cursor), |state| async move {
                let mut cursor = state?;
                match cursor.pull().await {
                    Ok(Some(item)) => Some((Ok(item), Some(cursor))),
                    Ok(None) => None,
                    Err(err) => Some((Err(err), None)),
                }
            })
            .boxed(),
            Err(err) => futures::stream::once(std::future::ready(Err(err))).boxed(),
        }
    }

    pub(crate) fn from_node(node: impl AsyncNode<T> + 'static) -> Self {
        Self {
            node: Arc::new(node),
            config: PipelineConfig::new(),
        }
    }

    /// Build a downstream handle around `node`, inheriting this pipeline's
    /// configuration.
    pub(crate) fn derive<U>(&self, node: impl AsyncNode<U> + 'static) -> AsyncSequence<U> {
        AsyncSequence {
            node: Arc::new(node),
            config: self.config,
        }
    }

    /// Open a fresh traversal of this pipeline.
    pub(crate) fn open_cursor(&self) -> Result<AsyncCursor<T>> {
        self.node.open(&self.config)
    }
}

impl<T> Sequence<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Lift this synchronous pipeline into the asynchronous protocol.
    ///
    /// The resulting pipeline keeps the configuration and repeatability of
    /// the original; pulls complete without suspending.
    pub fn into_async(self) -> AsyncSequence<T> {
        AsyncSequence {
            node: Arc::new(SyncBridgeNode::new(self.node)),
            config: self.config,
        }
    }
}

/// A sequence already open for traversal, wrapped back into a node.
///
/// The deferred emptiness probes resume their pulled element through this
/// node, exactly like the synchronous twin. Single-use by construction.
pub(crate) struct ResumedNode<T> {
    state: Mutex<Option<(Option<T>, AsyncCursor<T>)>>,
}

impl<T> ResumedNode<T> {
    pub(crate) fn new(buffered: Option<T>, rest: AsyncCursor<T>) -> Self {
        Self {
            state: Mutex::new(Some((buffered, rest))),
        }
    }
}

impl<T> AsyncNode<T> for ResumedNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, _config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        let taken = self
            .state
            .lock()
            .map_err(|_| Error::unexpected("resumed traversal mutex poisoned"))?
            .take();
        match taken {
            Some((buffered, rest)) => Ok(Box::new(ResumedCursor { buffered, rest })),
            None => Ok(Box::new(Exhausted)),
        }
    }

    fn repeatable(&self) -> bool {
        false
    }
}

struct ResumedCursor<T> {
    buffered: Option<T>,
    rest: AsyncCursor<T>,
}

impl<T> AsyncPull<T> for ResumedCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> futures::future::BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move {
            if let Some(item) = self.buffered.take() {
                return Ok(Some(item));
            }
            self.rest.pull().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_into_stream_round_trip() {
        let seq = AsyncSequence::from_vec(vec![1, 2, 3]);
        let items: Vec<i32> = seq
            .into_stream()
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sync_pipeline_lifts_into_async() {
        let sync = Sequence::from_vec(vec![1, 2, 3]);
        let lifted = sync.into_async();
        assert!(lifted.repeatable());
        assert_eq!(lifted.to_vec().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_stream_backed_sequence_is_single_use() {
        let seq = AsyncSequence::from_stream(futures::stream::iter(0..3));
        assert!(!seq.repeatable());
        assert_eq!(seq.to_vec().await.unwrap(), vec![0, 1, 2]);
        assert_eq!(seq.to_vec().await.unwrap(), Vec::<i32>::new());
    }
}

//! Sources and the suspending cursor protocol for asynchronous pipelines.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::seq::{self, Pull as _};

// ============================================================================
// Cursor Protocol
// ============================================================================

/// One pull-based traversal of an asynchronous pipeline stage.
///
/// The asynchronous twin of the synchronous cursor: each pull may suspend
/// while the upstream produces, but a traversal never has more than one
/// pull in flight.
pub(crate) trait AsyncPull<T>: Send {
    /// Produce the next element, or `None` when exhausted.
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>>;
}

/// A boxed suspending cursor, as handed between stages.
pub(crate) type AsyncCursor<T> = Box<dyn AsyncPull<T>>;

/// An asynchronous pipeline node.
///
/// Same contract as the synchronous node: immutable after construction,
/// never caches, opens a fresh cursor chain per traversal. Opening itself
/// is synchronous; only pulling suspends.
pub(crate) trait AsyncNode<T>: Send + Sync {
    /// Open a fresh cursor for one traversal.
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>>;

    /// Whether fresh traversals restart from the first element.
    fn repeatable(&self) -> bool;
}

/// A cursor that is already exhausted.
pub(crate) struct Exhausted;

impl<T: Send + 'static> AsyncPull<T> for Exhausted {
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(std::future::ready(Ok(None)))
    }
}

/// Drain a cursor, counting the elements it yields.
pub(crate) async fn drain_count<T>(mut cursor: AsyncCursor<T>) -> Result<usize> {
    let mut count = 0usize;
    while cursor.pull().await?.is_some() {
        count += 1;
    }
    Ok(count)
}

// ============================================================================
// Sources
// ============================================================================

/// Repeatable source backed by a shared vector.
pub(crate) struct VecSource<T> {
    items: Arc<Vec<T>>,
}

impl<T> VecSource<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(items),
        }
    }
}

impl<T> AsyncNode<T> for VecSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, _config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(VecCursor {
            items: Arc::clone(&self.items),
            position: 0,
        }))
    }

    fn repeatable(&self) -> bool {
        true
    }
}

struct VecCursor<T> {
    items: Arc<Vec<T>>,
    position: usize,
}

impl<T> AsyncPull<T> for VecCursor<T>
where
    T: Clone + Send + Sync,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        let item = self.items.get(self.position).cloned();
        if item.is_some() {
            self.position += 1;
        }
        Box::pin(std::future::ready(Ok(item)))
    }
}

/// Single-use source backed by an arbitrary stream.
pub(crate) struct StreamSource<T> {
    inner: Mutex<Option<BoxStream<'static, T>>>,
}

impl<T> StreamSource<T> {
    pub(crate) fn new(stream: BoxStream<'static, T>) -> Self {
        Self {
            inner: Mutex::new(Some(stream)),
        }
    }
}

impl<T> AsyncNode<T> for StreamSource<T>
where
    T: Send + Sync + 'static,
{
    fn open(&self, _config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        let taken = self
            .inner
            .lock()
            .map_err(|_| Error::unexpected("stream source mutex poisoned"))?
            .take();
        match taken {
            Some(stream) => Ok(Box::new(StreamCursor { stream })),
            None => {
                tracing::trace!("single-use stream already consumed, traversal is empty");
                Ok(Box::new(Exhausted))
            }
        }
    }

    fn repeatable(&self) -> bool {
        false
    }
}

struct StreamCursor<T> {
    stream: BoxStream<'static, T>,
}

impl<T> AsyncPull<T> for StreamCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move { Ok(self.stream.next().await) })
    }
}

/// Single-use source backed by a tokio mpsc receiver.
pub(crate) struct ChannelSource<T> {
    inner: Mutex<Option<tokio::sync::mpsc::Receiver<T>>>,
}

impl<T> ChannelSource<T> {
    pub(crate) fn new(receiver: tokio::sync::mpsc::Receiver<T>) -> Self {
        Self {
            inner: Mutex::new(Some(receiver)),
        }
    }
}

impl<T> AsyncNode<T> for ChannelSource<T>
where
    T: Send + Sync + 'static,
{
    fn open(&self, _config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        let taken = self
            .inner
            .lock()
            .map_err(|_| Error::unexpected("channel source mutex poisoned"))?
            .take();
        match taken {
            Some(receiver) => Ok(Box::new(ChannelCursor { receiver })),
            None => {
                tracing::trace!("channel source already consumed, traversal is empty");
                Ok(Box::new(Exhausted))
            }
        }
    }

    fn repeatable(&self) -> bool {
        false
    }
}

struct ChannelCursor<T> {
    receiver: tokio::sync::mpsc::Receiver<T>,
}

impl<T> AsyncPull<T> for ChannelCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(async move { Ok(self.receiver.recv().await) })
    }
}

// ============================================================================
// Sync Bridge
// ============================================================================

/// Adapter lifting a synchronous pipeline into the asynchronous protocol.
///
/// Pulls complete immediately; the value of the bridge is feeding a fully
/// built synchronous chain into async composition.
pub(crate) struct SyncBridgeNode<T> {
    inner: Arc<dyn seq::Node<T>>,
}

impl<T> SyncBridgeNode<T> {
    pub(crate) fn new(inner: Arc<dyn seq::Node<T>>) -> Self {
        Self { inner }
    }
}

impl<T> AsyncNode<T> for SyncBridgeNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open(&self, config: &PipelineConfig) -> Result<AsyncCursor<T>> {
        Ok(Box::new(SyncBridgeCursor {
            inner: self.inner.open(config)?,
        }))
    }

    fn repeatable(&self) -> bool {
        self.inner.repeatable()
    }
}

struct SyncBridgeCursor<T> {
    inner: seq::Cursor<T>,
}

impl<T> AsyncPull<T> for SyncBridgeCursor<T>
where
    T: Send,
{
    fn pull(&mut self) -> BoxFuture<'_, Result<Option<T>>> {
        Box::pin(std::future::ready(self.inner.pull()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_vec_source_is_repeatable() {
        let source = VecSource::new(vec![1, 2]);
        let config = PipelineConfig::new();
        for _ in 0..2 {
            let mut cursor = source.open(&config).unwrap();
            assert_eq!(cursor.pull().await.unwrap(), Some(1));
            assert_eq!(cursor.pull().await.unwrap(), Some(2));
            assert_eq!(cursor.pull().await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_stream_source_is_single_use() {
        let source = StreamSource::new(futures::stream::iter(vec![1, 2]).boxed());
        let config = PipelineConfig::new();

        let mut first = source.open(&config).unwrap();
        assert_eq!(first.pull().await.unwrap(), Some(1));
        assert_eq!(first.pull().await.unwrap(), Some(2));
        assert_eq!(first.pull().await.unwrap(), None);

        let mut second = source.open(&config).unwrap();
        assert_eq!(second.pull().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_channel_source_yields_until_closed() {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tx.send(10).await.unwrap();
        tx.send(20).await.unwrap();
        drop(tx);

        let source = ChannelSource::new(rx);
        let cursor = source.open(&PipelineConfig::new()).unwrap();
        assert_eq!(drain_count(cursor).await.unwrap(), 2);
    }
}

//! Streaming flow output.
//!
//! A flow runs as a spawned task that publishes items through a
//! [`StreamSink`]; the caller reads them from the [`TurnStream`]. The stream
//! ends once the task drops its sink, whether it finished or failed.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::{FlowError, Result};

/// Receiving half: a finite, non-restartable stream of flow items.
#[derive(Debug)]
pub struct TurnStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Stream for TurnStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Publishing half. Cheap to clone; one clone per concurrent worker.
#[derive(Debug)]
pub struct StreamSink<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for StreamSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> StreamSink<T> {
    /// Send an item. A dropped stream is not an error for the producer.
    pub fn publish(&self, item: T) {
        if self.tx.send(item).is_err() {
            tracing::trace!("stream closed, item dropped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Connected sink/stream pair.
pub fn channel<T>() -> (StreamSink<T>, TurnStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StreamSink { tx }, TurnStream { rx })
}

/// A running flow: its item stream and the task computing the aggregate.
pub struct FlowHandle<T, R> {
    stream: TurnStream<T>,
    task: JoinHandle<Result<R>>,
}

impl<T, R> FlowHandle<T, R> {
    pub fn stream(&mut self) -> &mut TurnStream<T> {
        &mut self.stream
    }

    /// Split into the stream and the task, e.g. to drain them separately.
    pub fn into_parts(self) -> (TurnStream<T>, JoinHandle<Result<R>>) {
        (self.stream, self.task)
    }

    /// Wait for the aggregate result. Unread items are discarded.
    pub async fn finish(self) -> Result<R> {
        drop(self.stream);
        join(self.task).await
    }

    /// Cancel the flow. The stream ends after any already-published items.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Map a join failure onto the flow error space.
pub async fn join<R>(task: JoinHandle<Result<R>>) -> Result<R> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(FlowError::Cancelled),
        Err(e) => Err(FlowError::Panicked(e.to_string())),
    }
}

/// Run `body` on the tokio runtime with a fresh sink.
pub fn spawn_flow<T, R, F, Fut>(body: F) -> FlowHandle<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(StreamSink<T>) -> Fut,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let (sink, stream) = channel();
    let task = tokio::spawn(body(sink));
    FlowHandle { stream, task }
}

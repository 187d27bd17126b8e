//! Background prefetching of batch streams for async training loops

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::{debug, error, instrument};

use super::batching::Batch;
use super::loaders::BatchStream;
use super::Dataset;
use crate::error::Result;

/// Async view of a [`BatchStream`], filled ahead of consumption by a blocking task.
///
/// Dropping it closes the channel; the producer notices on its next send and
/// stops, so abandoning an epoch needs no explicit shutdown.
pub struct PrefetchStream<T> {
    /// Channel receiver for batches
    receiver: mpsc::Receiver<Result<Batch<T>>>,
    /// Number of batches received
    batches_received: usize,
    /// Total number of batches
    total_batches: usize,
    /// Current epoch number
    epoch: usize,
}

/// Move `stream` onto a blocking task that keeps up to `buffer_size` batches ready.
///
/// Must be called from within a tokio runtime.
#[instrument(skip(stream), fields(epoch = stream.epoch(), rank = stream.rank()))]
pub fn prefetch<D>(stream: BatchStream<D>, buffer_size: usize) -> PrefetchStream<D::Item>
where
    D: Dataset + ?Sized + 'static,
    D::Item: Send + 'static,
{
    let total_batches = stream.total_batches();
    let epoch = stream.epoch();
    let (sender, receiver) = mpsc::channel(buffer_size.max(1));

    debug!(
        "Prefetching {} batches with a buffer of {}",
        total_batches, buffer_size
    );

    tokio::task::spawn_blocking(move || {
        for batch in stream {
            let failed = batch.is_err();
            if sender.blocking_send(batch).is_err() {
                debug!("Prefetch channel closed, stopping");
                break;
            }
            if failed {
                error!("Prefetch stopped after a failed batch");
                break;
            }
        }
    });

    PrefetchStream {
        receiver,
        batches_received: 0,
        total_batches,
        epoch,
    }
}

impl<T> PrefetchStream<T> {
    /// Get the number of batches received
    pub fn batches_received(&self) -> usize {
        self.batches_received
    }

    /// Get the total number of batches
    pub fn total_batches(&self) -> usize {
        self.total_batches
    }

    /// Get the current epoch
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl<T> Stream for PrefetchStream<T> {
    type Item = Result<Batch<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(batch)) => {
                self.batches_received += 1;
                Poll::Ready(Some(batch))
            }
            Poll::Ready(None) => {
                debug!(
                    "Epoch {} prefetch drained: {}/{} batches",
                    self.epoch, self.batches_received, self.total_batches
                );
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_batches.saturating_sub(self.batches_received);
        (0, Some(remaining))
    }
}

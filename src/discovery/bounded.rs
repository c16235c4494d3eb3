use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(15);

/// An item of a [`BoundedWaitStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick<T> {
    Event(T),
    /// Nothing arrived within the timeout.
    Idle,
}

/// Wakes its consumer at least once per timeout, event or not.
///
/// A background task drains the source into an unbounded channel. The
/// channel has no backpressure: a consumer that stops receiving lets it grow
/// without limit. An error from the source is forwarded in order and ends the
/// background task.
#[derive(Debug)]
pub struct BoundedWaitStream<T, E> {
    rx: mpsc::UnboundedReceiver<Result<T, E>>,
    timeout: Duration,
    producer: JoinHandle<()>,
}

impl<T, E> BoundedWaitStream<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Starts pulling from `source` on a background task.
    pub fn spawn<S>(source: S, timeout: Duration) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let producer = tokio::spawn(async move {
            let mut source = std::pin::pin!(source);
            while let Some(item) = source.next().await {
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
            }
            log::debug!("Event source finished");
        });
        Self {
            rx,
            timeout,
            producer,
        }
    }

    /// Waits up to the timeout for the next event.
    ///
    /// Returns [`Tick::Idle`] on timeout, the source's error if it failed, and
    /// `None` once the source is exhausted.
    pub async fn next(&mut self) -> Option<Result<Tick<T>, E>> {
        match tokio::time::timeout(self.timeout, self.rx.recv()).await {
            Ok(Some(Ok(event))) => Some(Ok(Tick::Event(event))),
            Ok(Some(Err(err))) => Some(Err(err)),
            Ok(None) => None,
            Err(_) => Some(Ok(Tick::Idle)),
        }
    }
}

impl<T, E> Drop for BoundedWaitStream<T, E> {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

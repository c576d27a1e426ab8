use core::{fmt, pin::pin};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::{runtime::Handle, sync::Notify};

use crate::flow::{Publisher, Subscriber, Subscription, add_demand, consume_demand};

/// A page backed by an async [`Stream`], driven on a Tokio runtime.
///
/// Every subscription calls the factory to obtain a fresh stream and spawns a
/// task that polls it only while the subscriber has outstanding demand. The
/// stream's `Ok` items are emitted with `on_next`, the first `Err` terminates
/// the page with `on_error`, and the end of the stream completes it.
///
/// Cancelling the subscription stops the task the next time it checks for
/// demand. A poll that is already in progress is allowed to finish and its
/// item is discarded.
///
/// # Example
///
/// ```no_run
/// use pagestream::{PublisherStreamExt, StreamPage};
/// use futures::{StreamExt, TryStreamExt, stream};
///
/// # async fn query_after(_last: Option<u64>) -> Result<Vec<u64>, String> { Ok(vec![]) }
/// # async fn run() {
/// let publisher = pagestream::create(
///     || Ok(None),
///     |last: Option<u64>| {
///         Ok::<_, String>(Some(StreamPage::new(move || {
///             stream::once(query_after(last))
///                 .map(|rows| rows.map(|rows| stream::iter(rows.into_iter().map(Ok::<_, String>))))
///                 .try_flatten()
///         })))
///     },
/// );
///
/// let rows: Vec<_> = publisher.stream().collect().await;
/// # }
/// ```
pub struct StreamPage<F> {
    factory: F,
    handle: Handle,
}

impl<F> StreamPage<F> {
    /// Creates a page whose task runs on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside the context of a Tokio runtime.
    pub fn new(factory: F) -> Self {
        Self::with_handle(Handle::current(), factory)
    }

    /// Creates a page whose task runs on the runtime behind `handle`.
    pub fn with_handle(handle: Handle, factory: F) -> Self {
        Self { factory, handle }
    }
}

impl<F> fmt::Debug for StreamPage<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPage").finish_non_exhaustive()
    }
}

impl<F, S, T, E> Publisher<T, E> for StreamPage<F>
where
    F: Fn() -> S,
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        let demand = Arc::new(StreamDemand {
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        });
        subscriber.on_subscribe(demand.clone());

        let stream = (self.factory)();
        self.handle.spawn(drive(stream, subscriber, demand));
    }
}

async fn drive<S, T, E>(
    stream: S,
    subscriber: Arc<dyn Subscriber<T, E>>,
    demand: Arc<StreamDemand>,
) where
    S: Stream<Item = Result<T, E>>,
{
    let mut stream = pin!(stream);

    loop {
        while demand.requested.load(Ordering::Acquire) == 0 {
            if demand.is_cancelled() {
                return;
            }
            demand.notify.notified().await;
        }
        if demand.is_cancelled() {
            return;
        }

        let next = stream.next().await;
        if demand.is_cancelled() {
            return;
        }

        match next {
            Some(Ok(item)) => {
                consume_demand(&demand.requested);
                subscriber.on_next(item);
            }
            Some(Err(e)) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("stream page failed");
                subscriber.on_error(e);
                return;
            }
            None => {
                subscriber.on_complete();
                return;
            }
        }
    }
}

/// Demand shared between a [`StreamPage`] subscriber and its driving task.
struct StreamDemand {
    requested: AtomicU64,
    cancelled: AtomicBool,
    notify: Notify,
}

impl StreamDemand {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Subscription for StreamDemand {
    fn request(&self, n: u64) {
        if n == 0 || self.is_cancelled() {
            return;
        }
        add_demand(&self.requested, n);
        self.notify.notify_one();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

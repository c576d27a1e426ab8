use core::{
    pin::Pin,
    task::{Context, Poll},
};
use std::{collections::VecDeque, sync::Arc};

use futures::{Stream, task::AtomicWaker};
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};

use crate::flow::{Publisher, Subscriber, Subscription, consume_demand};

/// Default number of items a [`SubscriberStream`] requests at a time.
pub const DEFAULT_BATCH_SIZE: u64 = 64;

/// Configuration for [`SubscriberStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    batch_size: u64,
}

impl StreamConfig {
    /// Creates a configuration with [`DEFAULT_BATCH_SIZE`].
    pub const fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets how many items are requested each time the buffer runs dry.
    /// Values below `1` are raised to `1`.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = if batch_size == 0 { 1 } else { batch_size };
        self
    }

    pub const fn batch_size(&self) -> u64 {
        self.batch_size
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension trait for consuming any [`Publisher`] as a [`Stream`].
pub trait PublisherStreamExt<T, E>: Publisher<T, E> {
    /// Subscribes and returns a stream requesting [`DEFAULT_BATCH_SIZE`] items
    /// at a time.
    fn stream(&self) -> SubscriberStream<T, E> {
        self.stream_with(StreamConfig::default())
    }

    /// Subscribes and returns a stream configured by `config`.
    fn stream_with(&self, config: StreamConfig) -> SubscriberStream<T, E>;
}

impl<P, T, E> PublisherStreamExt<T, E> for P
where
    P: Publisher<T, E> + ?Sized,
    T: Send + 'static,
    E: Send + 'static,
{
    fn stream_with(&self, config: StreamConfig) -> SubscriberStream<T, E> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            terminal: Mutex::new(None),
            subscription: Mutex::new(None),
            outstanding: AtomicU64::new(0),
            waker: AtomicWaker::new(),
        });
        self.subscribe(shared.clone());

        SubscriberStream {
            shared,
            batch_size: config.batch_size(),
            finished: false,
        }
    }
}

enum Terminal<E> {
    Complete,
    Error(E),
}

struct Shared<T, E> {
    queue: Mutex<VecDeque<T>>,
    terminal: Mutex<Option<Terminal<E>>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    outstanding: AtomicU64,
    waker: AtomicWaker,
}

impl<T: Send, E: Send> Subscriber<T, E> for Shared<T, E> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *self.subscription.lock() = Some(subscription);
        self.waker.wake();
    }

    fn on_next(&self, item: T) {
        consume_demand(&self.outstanding);
        self.queue.lock().push_back(item);
        self.waker.wake();
    }

    fn on_error(&self, error: E) {
        *self.terminal.lock() = Some(Terminal::Error(error));
        self.subscription.lock().take();
        self.waker.wake();
    }

    fn on_complete(&self) {
        *self.terminal.lock() = Some(Terminal::Complete);
        self.subscription.lock().take();
        self.waker.wake();
    }
}

/// A [`Stream`] over the items of a [`Publisher`].
///
/// Demand is requested in batches when the internal buffer is empty and the
/// previous batch has been delivered. A terminal error is yielded as the last
/// `Err` item; completion ends the stream. Dropping the stream cancels the
/// subscription.
///
/// Created by [`PublisherStreamExt::stream`].
#[must_use = "streams do nothing unless polled"]
pub struct SubscriberStream<T, E> {
    shared: Arc<Shared<T, E>>,
    batch_size: u64,
    finished: bool,
}

impl<T, E> Stream for SubscriberStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        let mut requested_now = false;
        loop {
            this.shared.waker.register(cx.waker());

            if let Some(item) = this.shared.queue.lock().pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if let Some(terminal) = this.shared.terminal.lock().take() {
                this.finished = true;
                return Poll::Ready(match terminal {
                    Terminal::Complete => None,
                    Terminal::Error(e) => Some(Err(e)),
                });
            }

            if requested_now || this.shared.outstanding.load(Ordering::Acquire) > 0 {
                return Poll::Pending;
            }

            let Some(subscription) = this.shared.subscription.lock().clone() else {
                return Poll::Pending;
            };
            this.shared
                .outstanding
                .store(this.batch_size, Ordering::Release);
            subscription.request(this.batch_size);
            requested_now = true;
        }
    }
}

impl<T, E> Drop for SubscriberStream<T, E> {
    fn drop(&mut self) {
        let subscription = self.shared.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }
}

use std::sync::Arc;

/// The demand-control handle a [`Publisher`] hands to its [`Subscriber`].
///
/// A subscriber signals how many more items it is willing to accept with
/// [`Subscription::request`] and stops the sequence with
/// [`Subscription::cancel`]. Both methods may be called from any thread,
/// including re-entrantly from inside [`Subscriber::on_next`].
pub trait Subscription: Send + Sync {
    /// Adds `n` to the number of items the subscriber is willing to receive.
    ///
    /// A request of `0` is a protocol violation and terminates the sequence
    /// with an error. `u64::MAX` means unbounded demand.
    fn request(&self, n: u64);

    /// Stops the sequence. Idempotent.
    ///
    /// After `cancel` returns no further signals reach the subscriber.
    fn cancel(&self);
}

/// The receiving side of the signal protocol.
///
/// A subscriber sees `on_subscribe` once, then zero or more `on_next` calls
/// (never more than it requested), then at most one of `on_error` or
/// `on_complete`. Signals to a single subscriber are never concurrent.
pub trait Subscriber<T, E>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    fn on_next(&self, item: T);

    fn on_error(&self, error: E);

    fn on_complete(&self);
}

/// A source of items that delivers them to subscribers under demand.
///
/// Each call to [`Publisher::subscribe`] starts an independent sequence.
pub trait Publisher<T, E> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>);
}

impl<T, E, P> Publisher<T, E> for Arc<P>
where
    P: Publisher<T, E> + ?Sized,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        (**self).subscribe(subscriber);
    }
}

impl<T, E, P> Publisher<T, E> for Box<P>
where
    P: Publisher<T, E> + ?Sized,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        (**self).subscribe(subscriber);
    }
}

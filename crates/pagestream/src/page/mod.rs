//! Ready-made page sources.
//!
//! A page is any [`Publisher`]; these cover the common cases of a page that is
//! already in memory, a page that is known to be empty, and a page that failed
//! before producing anything. Async sources can use [`StreamPage`] (feature
//! `async-tokio`).
//!
//! [`StreamPage`]: crate::StreamPage
mod iter;

use std::sync::Arc;

pub use iter::*;

use crate::flow::{Publisher, Subscriber, Subscription};

/// A subscription with nothing behind it, handed out by pages that terminate
/// during `subscribe`.
struct Noop;

impl Subscription for Noop {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}

/// A page that completes immediately. Returned by [`empty`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

/// Creates a page with no items. A generator returning it ends the sequence.
pub fn empty() -> Empty {
    Empty
}

impl<T, E> Publisher<T, E> for Empty {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        subscriber.on_subscribe(Arc::new(Noop));
        subscriber.on_complete();
    }
}

/// A page that fails immediately with a clone of its error. Returned by
/// [`fail`].
#[derive(Debug, Clone)]
pub struct Fail<E> {
    error: E,
}

/// Creates a page that signals `error` as soon as it is subscribed to.
pub fn fail<E: Clone>(error: E) -> Fail<E> {
    Fail { error }
}

impl<T, E: Clone> Publisher<T, E> for Fail<E> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        subscriber.on_subscribe(Arc::new(Noop));
        subscriber.on_error(self.error.clone());
    }
}

use core::{fmt, iter::Peekable, marker::PhantomData};
use std::sync::Arc;

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use super::Noop;
use crate::flow::{Publisher, Subscriber, Subscription, UNBOUNDED, add_demand};

/// A page backed by an in-memory collection or iterator.
///
/// Each subscription iterates over its own clone of the source, emitting items
/// only as they are requested. The page completes as soon as the last item has
/// been emitted, without waiting for further demand, and an empty source
/// completes right after `on_subscribe`.
///
/// Requesting `0` items is ignored.
#[derive(Clone)]
pub struct IterPage<It> {
    items: It,
}

/// Creates an [`IterPage`] over `items`.
pub fn from_iter<It>(items: It) -> IterPage<It>
where
    It: IntoIterator + Clone,
{
    IterPage { items }
}

impl<It> fmt::Debug for IterPage<It> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterPage").finish_non_exhaustive()
    }
}

impl<It, E> Publisher<It::Item, E> for IterPage<It>
where
    It: IntoIterator + Clone,
    It::IntoIter: Send + 'static,
    It::Item: Send + 'static,
    E: 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<It::Item, E>>) {
        let mut items = self.items.clone().into_iter().peekable();
        if items.peek().is_none() {
            subscriber.on_subscribe(Arc::new(Noop));
            subscriber.on_complete();
            return;
        }

        let subscription = Arc::new(IterSubscription {
            items: Mutex::new(items),
            subscriber: Mutex::new(Some(subscriber.clone())),
            requested: AtomicU64::new(0),
            done: AtomicBool::new(false),
            _error: PhantomData,
        });
        subscriber.on_subscribe(subscription);
    }
}

struct IterSubscription<It: Iterator, E> {
    items: Mutex<Peekable<It>>,
    subscriber: Mutex<Option<Arc<dyn Subscriber<It::Item, E>>>>,
    requested: AtomicU64,
    done: AtomicBool,
    _error: PhantomData<fn(E)>,
}

impl<It, E> IterSubscription<It, E>
where
    It: Iterator + Send,
    It::Item: Send,
{
    /// Emits items while demand lasts. Only the caller that raised demand from
    /// zero gets here, so emission is never concurrent.
    fn emit(&self) {
        let Some(subscriber) = self.subscriber.lock().clone() else {
            return;
        };

        let mut emitted = 0_u64;
        loop {
            let requested = self.requested.load(Ordering::Acquire);
            while requested == UNBOUNDED || emitted < requested {
                if self.done.load(Ordering::Acquire) {
                    return;
                }

                let (item, last) = {
                    let mut items = self.items.lock();
                    let item = items.next();
                    (item, items.peek().is_none())
                };
                let Some(item) = item else {
                    if self.finish() {
                        subscriber.on_complete();
                    }
                    return;
                };

                subscriber.on_next(item);
                emitted += 1;

                if last {
                    if self.finish() {
                        subscriber.on_complete();
                    }
                    return;
                }
            }

            if self.done.load(Ordering::Acquire) {
                return;
            }

            let remaining = self
                .requested
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current != UNBOUNDED).then(|| current - emitted)
                })
                .map_or(UNBOUNDED, |previous| previous - emitted);
            if remaining == 0 {
                return;
            }
            emitted = 0;
        }
    }

    /// Marks the page as finished. Returns `true` for the first caller.
    fn finish(&self) -> bool {
        let first = !self.done.swap(true, Ordering::AcqRel);
        self.subscriber.lock().take();
        first
    }
}

impl<It, E> Subscription for IterSubscription<It, E>
where
    It: Iterator + Send,
    It::Item: Send,
{
    fn request(&self, n: u64) {
        if n == 0 || self.done.load(Ordering::Acquire) {
            return;
        }
        if add_demand(&self.requested, n) == 0 {
            self.emit();
        }
    }

    fn cancel(&self) {
        self.finish();
    }
}

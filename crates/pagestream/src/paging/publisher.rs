use core::{fmt, marker::PhantomData};
use std::sync::Arc;

use super::{PageGenerator, PagingCoordinator};
use crate::{
    error::PagingError,
    flow::{Publisher, Subscriber},
};

/// A lazy sequence stitched together from cursor-addressed pages.
///
/// Nothing happens until a subscriber attaches. Each subscription then:
///
/// 1. Calls the initial-cursor supplier once, synchronously. If it fails the
///    subscriber receives [`PagingError::Init`] straight away and never gets a
///    subscription.
/// 2. Builds a fresh [`PagingCoordinator`] and hands it to the subscriber as
///    its [`Subscription`].
/// 3. Fetches pages from the generator as the subscriber requests items,
///    passing the last delivered item as the cursor, until a page comes back
///    empty (or the generator returns no page).
///
/// Subscriptions never share state.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use pagestream::{Publisher, Subscriber, Subscription, PagingError, UNBOUNDED, page};
///
/// struct Collect(Mutex<Vec<u32>>);
///
/// impl Subscriber<u32, PagingError<String>> for Collect {
///     fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
///         subscription.request(UNBOUNDED);
///     }
///     fn on_next(&self, item: u32) {
///         self.0.lock().unwrap().push(item);
///     }
///     fn on_error(&self, _: PagingError<String>) {}
///     fn on_complete(&self) {}
/// }
///
/// // Keyset paging over 1..=7, three rows per page.
/// let publisher = pagestream::create(
///     || Ok(None),
///     |last: Option<u32>| {
///         let start = last.map_or(1, |id| id + 1);
///         Ok::<_, String>(Some(page::from_iter(start..(start + 3).min(8))))
///     },
/// );
///
/// let collect = Arc::new(Collect(Mutex::new(Vec::new())));
/// publisher.subscribe(collect.clone());
/// assert_eq!(*collect.0.lock().unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
/// ```
///
/// [`Subscription`]: crate::Subscription
pub struct PagingPublisher<T, I, S, G> {
    init: S,
    generator: Arc<G>,
    _marker: PhantomData<fn() -> (T, I)>,
}

impl<T, I, S, G> PagingPublisher<T, I, S, G>
where
    S: Fn() -> Result<Option<T>, G::Error>,
    G: PageGenerator<T, I>,
{
    /// Creates a publisher from an initial-cursor supplier and a page
    /// generator.
    ///
    /// The supplier may return `Ok(None)` when there is no starting cursor;
    /// the generator then receives `None` for the first page.
    pub fn new(init: S, generator: G) -> Self {
        Self {
            init,
            generator: Arc::new(generator),
            _marker: PhantomData,
        }
    }
}

/// Creates a [`PagingPublisher`]. See [`PagingPublisher::new`].
pub fn create<T, I, S, G>(init: S, generator: G) -> PagingPublisher<T, I, S, G>
where
    S: Fn() -> Result<Option<T>, G::Error>,
    G: PageGenerator<T, I>,
{
    PagingPublisher::new(init, generator)
}

/// Creates a [`PagingPublisher`] whose initial cursor is a fixed value.
pub fn from_cursor<T, I, G>(
    cursor: Option<T>,
    generator: G,
) -> PagingPublisher<T, I, impl Fn() -> Result<Option<T>, G::Error>, G>
where
    T: Clone,
    G: PageGenerator<T, I>,
{
    PagingPublisher::new(move || Ok(cursor.clone()), generator)
}

impl<T, I, S, G> Publisher<T, PagingError<G::Error>> for PagingPublisher<T, I, S, G>
where
    T: Clone + Send + 'static,
    I: Into<Option<T>> + 'static,
    S: Fn() -> Result<Option<T>, G::Error>,
    G: PageGenerator<T, I> + 'static,
    G::Error: 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, PagingError<G::Error>>>) {
        let cursor = match (self.init)() {
            Ok(cursor) => cursor,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("initial cursor supplier failed");
                subscriber.on_error(PagingError::Init(e));
                return;
            }
        };

        let coordinator =
            PagingCoordinator::new(Arc::clone(&subscriber), Arc::clone(&self.generator), cursor);
        subscriber.on_subscribe(coordinator);
    }
}

impl<T, I, S, G> fmt::Debug for PagingPublisher<T, I, S, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagingPublisher").finish_non_exhaustive()
    }
}

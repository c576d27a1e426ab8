use crate::flow::Publisher;

/// Produces the page that follows a cursor.
///
/// A generator is invoked once per page with the last item delivered
/// downstream (or the initial cursor before anything was delivered). It
/// returns:
///
/// - `Ok(Some(page))`: the next page, a finite [`Publisher`] of items.
/// - `Ok(None)`: there is no next page; the sequence completes.
/// - `Err(e)`: fetching failed; the sequence terminates with
///   [`PagingError::Fetch`].
///
/// A page that completes without emitting anything is also treated as the end
/// of the data.
///
/// `I` is the item type the page emits. It defaults to `T`, but any type
/// convertible into `Option<T>` works, so a page may also emit `Option<T>`
/// where `None` marks a missing item (rejected with
/// [`PagingError::MissingItem`]).
///
/// Closures of the form `Fn(Option<T>) -> Result<Option<P>, E>` implement this
/// trait.
///
/// [`PagingError::Fetch`]: crate::PagingError::Fetch
/// [`PagingError::MissingItem`]: crate::PagingError::MissingItem
pub trait PageGenerator<T, I = T>: Send + Sync {
    type Error;
    type Page: Publisher<I, Self::Error>;

    /// Returns the page following `cursor`.
    ///
    /// # Errors
    ///
    /// Returns the caller's error when the page cannot be produced.
    fn next_page(&self, cursor: Option<T>) -> Result<Option<Self::Page>, Self::Error>;
}

impl<F, T, I, P, E> PageGenerator<T, I> for F
where
    F: Fn(Option<T>) -> Result<Option<P>, E> + Send + Sync,
    P: Publisher<I, E>,
{
    type Error = E;
    type Page = P;

    fn next_page(&self, cursor: Option<T>) -> Result<Option<P>, E> {
        self(cursor)
    }
}

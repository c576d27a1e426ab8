//! Terminal errors of a paged sequence.
//!
//! Every variant is terminal: it is delivered to the downstream subscriber at
//! most once and nothing follows it. The generic parameter `E` is the caller's
//! own error type, shared by the initial-cursor supplier, the page generator and
//! the pages themselves, and is always passed through untouched.
//!
//! ## Error Cases
//! - `Init`: the initial-cursor supplier failed before the subscriber was
//!   activated.
//! - `InvalidDemand`: the subscriber requested zero items.
//! - `MissingItem`: a page emitted an empty (`None`) item.
//! - `Overflow`: a page emitted more items than the subscriber requested.
//! - `Fetch`: the page generator failed while producing the next page.
//! - `Page`: a page signalled an error.

/// A result whose error is a [`PagingError`] wrapping the caller's error `E`.
pub type Result<T, E> = core::result::Result<T, PagingError<E>>;

/// All terminal errors a [`PagingPublisher`] can deliver.
///
/// [`PagingPublisher`]: crate::PagingPublisher
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PagingError<E> {
    /// The initial-cursor supplier failed. The subscriber never received a
    /// subscription.
    #[error("initial cursor error: {0}")]
    Init(E),

    /// A subscriber requested a non-positive number of items.
    #[error("demand must be positive")]
    InvalidDemand,

    /// A page produced an empty item.
    #[error("generator produced an empty item")]
    MissingItem,

    /// A page emitted an item while no demand was outstanding.
    #[error("page emitted more items than were requested")]
    Overflow,

    /// The generator failed to produce the next page.
    #[error("page fetch error: {0}")]
    Fetch(E),

    /// The active page signalled an error.
    #[error("page error: {0}")]
    Page(E),
}

impl<E> PagingError<E> {
    /// Returns the caller's error, if this error carries one.
    pub fn source_error(&self) -> Option<&E> {
        match self {
            Self::Init(e) | Self::Fetch(e) | Self::Page(e) => Some(e),
            Self::InvalidDemand | Self::MissingItem | Self::Overflow => None,
        }
    }

    /// Returns `true` for errors caused by misuse of the signal protocol rather
    /// than by the data source.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDemand | Self::MissingItem | Self::Overflow
        )
    }
}

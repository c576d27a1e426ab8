/// Lifecycle state of a [`PagingCoordinator`].
///
/// `Idle` and `PageActive` alternate while pages are consumed. The three
/// terminal states are mutually exclusive and the first one reached wins.
///
/// [`PagingCoordinator`]: crate::PagingCoordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagingState {
    /// No page is attached. The next request fetches one.
    Idle,
    /// A page is attached and has not finished yet.
    PageActive,
    /// A completion signal was delivered downstream.
    Completed,
    /// An error signal was delivered downstream.
    Errored,
    /// The downstream subscriber cancelled.
    Cancelled,
}

impl PagingState {
    /// Returns `true` once no further signal will ever be delivered.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }
}

use core::{fmt, marker::PhantomData};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use portable_atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{PageGenerator, PagingState};
use crate::{
    error::PagingError,
    flow::{Publisher, Subscriber, Subscription, UNBOUNDED, add_demand, consume_demand},
};

const RUNNING: u8 = 0;
const COMPLETED: u8 = 1;
const ERRORED: u8 = 2;
const CANCELLED: u8 = 3;

type Downstream<T, E> = Arc<dyn Subscriber<T, PagingError<E>>>;

/// The per-subscription paging state machine.
///
/// A coordinator is the [`Subscription`] handed to the downstream subscriber
/// and, at the same time, the subscriber of whichever page is currently
/// attached. It turns downstream demand into page fetches and page signals into
/// downstream deliveries:
///
/// - Demand is additive. Requests that arrive while no page is attached fetch
///   the next page from the generator using the cursor (the last delivered
///   item).
/// - A page that completes after emitting at least one item makes the
///   coordinator fetch the next one as long as demand remains.
/// - A page that completes without emitting anything ends the sequence.
/// - Any failure is terminal. Nothing is retried.
///
/// ## Concurrency
///
/// `request` and `cancel` may be called from any thread, concurrently with
/// page signals. Page fetches and demand forwarding only ever run on the
/// thread that owns the drain loop, so two threads can never fetch a page at
/// the same time, and chains of synchronous pages are processed iteratively.
/// Downstream signals are serialised by a re-entrant lock. The terminal
/// transition happens under that lock, so at most one terminal signal is
/// delivered and nothing is delivered once `cancel` has returned.
///
/// Coordinators are created by [`PagingPublisher`] and never reused.
///
/// [`PagingPublisher`]: crate::PagingPublisher
pub struct PagingCoordinator<T, I, G>
where
    G: PageGenerator<T, I>,
{
    this: Weak<Self>,
    generator: Arc<G>,
    downstream: Mutex<Option<Downstream<T, G::Error>>>,
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
    cursor: Mutex<Option<T>>,
    // Serialises every downstream signal. Re-entrant so a subscriber can call
    // `request`/`cancel` from inside `on_next`.
    emitting: ReentrantMutex<()>,
    // Outstanding downstream demand.
    requested: AtomicU64,
    // Demand already granted to the attached page and not yet fulfilled.
    in_flight: AtomicU64,
    wip: AtomicUsize,
    generation: AtomicU64,
    status: AtomicU8,
    page_active: AtomicBool,
    fresh_page: AtomicBool,
    _item: PhantomData<fn(I)>,
}

impl<T, I, G> PagingCoordinator<T, I, G>
where
    T: Clone + Send + 'static,
    I: Into<Option<T>> + 'static,
    G: PageGenerator<T, I> + 'static,
    G::Error: 'static,
{
    pub(crate) fn new(
        downstream: Downstream<T, G::Error>,
        generator: Arc<G>,
        cursor: Option<T>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            generator,
            downstream: Mutex::new(Some(downstream)),
            upstream: Mutex::new(None),
            cursor: Mutex::new(cursor),
            emitting: ReentrantMutex::new(()),
            requested: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            status: AtomicU8::new(RUNNING),
            page_active: AtomicBool::new(false),
            fresh_page: AtomicBool::new(false),
            _item: PhantomData,
        })
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> PagingState {
        match self.status.load(Ordering::Acquire) {
            COMPLETED => PagingState::Completed,
            ERRORED => PagingState::Errored,
            CANCELLED => PagingState::Cancelled,
            _ if self.page_active.load(Ordering::Acquire) => PagingState::PageActive,
            _ => PagingState::Idle,
        }
    }

    /// Returns the downstream demand that has not been fulfilled yet.
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Returns the value the next page will be fetched with.
    pub fn cursor(&self) -> Option<T> {
        self.cursor.lock().clone()
    }

    /// Returns the number of pages fetched so far.
    pub fn pages_fetched(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn is_terminated(&self) -> bool {
        self.status.load(Ordering::Acquire) != RUNNING
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Runs pending fetch/forward work. Only the caller that moves `wip` off
    /// zero does the work; everyone else just records that another pass is
    /// needed.
    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }

        let mut missed = 1;
        loop {
            if self.is_terminated() {
                return;
            }

            if !self.page_active.load(Ordering::Acquire) && self.requested() > 0 {
                self.fetch_page();
            }

            if self.page_active.load(Ordering::Acquire) && !self.is_terminated() {
                self.forward_demand();
            }

            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    fn fetch_page(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let cursor = self.cursor();

        match self.generator.next_page(cursor) {
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("page generator failed");
                self.fail(PagingError::Fetch(e));
            }
            Ok(None) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("generator returned no page, completing");
                self.complete();
            }
            Ok(Some(page)) => {
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                #[cfg(feature = "tracing")]
                tracing::trace!(generation, "attaching page");

                // The previous page has completed, so nothing it was granted
                // can arrive anymore.
                *self.upstream.lock() = None;
                self.in_flight.store(0, Ordering::Release);
                self.fresh_page.store(true, Ordering::Release);
                self.page_active.store(true, Ordering::Release);

                page.subscribe(Arc::new(PageSubscriber {
                    coordinator: this,
                    generation,
                }));
            }
        }
    }

    /// Grants the attached page whatever downstream demand it has not been
    /// granted yet.
    fn forward_demand(&self) {
        let Some(upstream) = self.upstream.lock().clone() else {
            return;
        };

        // `in_flight` is read before `requested`; `on_next` decrements them in
        // the opposite order, so a racing delivery can only make `n` smaller.
        let in_flight = self.in_flight.load(Ordering::Acquire);
        let requested = self.requested();

        let n = if requested == UNBOUNDED {
            if in_flight == UNBOUNDED {
                return;
            }
            self.in_flight.store(UNBOUNDED, Ordering::Release);
            UNBOUNDED
        } else if requested > in_flight {
            let n = requested - in_flight;
            add_demand(&self.in_flight, n);
            n
        } else {
            return;
        };

        upstream.request(n);
    }

    fn on_page_subscribe(&self, generation: u64, subscription: Arc<dyn Subscription>) {
        if !self.is_current(generation) || self.is_terminated() {
            subscription.cancel();
            return;
        }

        *self.upstream.lock() = Some(subscription);

        // A racing `cancel` may have missed the handle we just stored.
        if self.is_terminated() {
            self.cancel_upstream();
            return;
        }

        self.drain();
    }

    fn on_page_next(&self, generation: u64, item: I) {
        if !self.is_current(generation) || self.is_terminated() {
            return;
        }

        let Some(item) = item.into() else {
            self.fail(PagingError::MissingItem);
            return;
        };

        // Pages are never granted more than `requested`, so a delivery with
        // no outstanding demand is a page ignoring backpressure.
        if consume_demand(&self.requested) == 0 {
            self.fail(PagingError::Overflow);
            return;
        }
        consume_demand(&self.in_flight);
        self.emit_next(item);

        // A drain pass that overlapped this delivery may have under-granted.
        if self.requested() > self.in_flight.load(Ordering::Acquire) {
            self.drain();
        }
    }

    fn on_page_complete(&self, generation: u64) {
        if !self.is_current(generation) || self.is_terminated() {
            return;
        }

        if self.fresh_page.load(Ordering::Acquire) {
            #[cfg(feature = "tracing")]
            tracing::debug!(generation, "page ended without items, completing");
            self.complete();
            return;
        }

        self.page_active.store(false, Ordering::Release);
        self.drain();
    }

    fn on_page_error(&self, generation: u64, error: G::Error) {
        if !self.is_current(generation) {
            return;
        }
        self.fail(PagingError::Page(error));
    }

    fn emit_next(&self, item: T) {
        let _emitting = self.emitting.lock();
        if self.is_terminated() {
            return;
        }
        let Some(downstream) = self.downstream.lock().clone() else {
            return;
        };

        self.fresh_page.store(false, Ordering::Release);
        *self.cursor.lock() = Some(item.clone());
        downstream.on_next(item);
    }

    /// Moves to the terminal `status` and hands back the downstream subscriber
    /// if this call won the transition. Must be called while `emitting` is
    /// held.
    fn terminate(&self, status: u8) -> Option<Downstream<T, G::Error>> {
        self.status
            .compare_exchange(RUNNING, status, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.downstream.lock().take()
    }

    fn complete(&self) {
        {
            let _emitting = self.emitting.lock();
            if let Some(downstream) = self.terminate(COMPLETED) {
                #[cfg(feature = "tracing")]
                tracing::debug!(pages = self.pages_fetched(), "paging completed");
                downstream.on_complete();
            }
        }
        self.upstream.lock().take();
    }

    fn fail(&self, error: PagingError<G::Error>) {
        {
            let _emitting = self.emitting.lock();
            if let Some(downstream) = self.terminate(ERRORED) {
                #[cfg(feature = "tracing")]
                tracing::debug!(pages = self.pages_fetched(), "paging failed");
                downstream.on_error(error);
            }
        }
        self.cancel_upstream();
    }

    fn cancel_upstream(&self) {
        let upstream = self.upstream.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}

impl<T, I, G> Subscription for PagingCoordinator<T, I, G>
where
    T: Clone + Send + 'static,
    I: Into<Option<T>> + 'static,
    G: PageGenerator<T, I> + 'static,
    G::Error: 'static,
{
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn request(&self, n: u64) {
        if self.is_terminated() {
            return;
        }
        if n == 0 {
            self.fail(PagingError::InvalidDemand);
            return;
        }

        add_demand(&self.requested, n);
        self.drain();
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn cancel(&self) {
        {
            let _emitting = self.emitting.lock();
            if self.terminate(CANCELLED).is_none() {
                return;
            }
        }
        self.cancel_upstream();
    }
}

impl<T, I, G> fmt::Debug for PagingCoordinator<T, I, G>
where
    T: Clone + Send + 'static,
    I: Into<Option<T>> + 'static,
    G: PageGenerator<T, I> + 'static,
    G::Error: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagingCoordinator")
            .field("state", &self.state())
            .field("requested", &self.requested())
            .field("pages_fetched", &self.pages_fetched())
            .finish_non_exhaustive()
    }
}

/// The subscriber attached to one page. Signals from a page that has been
/// superseded are dropped by comparing `generation`.
struct PageSubscriber<T, I, G>
where
    G: PageGenerator<T, I>,
{
    coordinator: Arc<PagingCoordinator<T, I, G>>,
    generation: u64,
}

impl<T, I, G> Subscriber<I, G::Error> for PageSubscriber<T, I, G>
where
    T: Clone + Send + 'static,
    I: Into<Option<T>> + 'static,
    G: PageGenerator<T, I> + 'static,
    G::Error: 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.coordinator
            .on_page_subscribe(self.generation, subscription);
    }

    fn on_next(&self, item: I) {
        self.coordinator.on_page_next(self.generation, item);
    }

    fn on_error(&self, error: G::Error) {
        self.coordinator.on_page_error(self.generation, error);
    }

    fn on_complete(&self) {
        self.coordinator.on_page_complete(self.generation);
    }
}

use crate::{
    PageGenerator, PagingCoordinator, PagingError, PagingState, Publisher, Subscriber,
    Subscription, UNBOUNDED,
    page::{self, IterPage},
};
use std::{
    collections::VecDeque,
    ops::Range,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::scope,
};

type Error = &'static str;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Signal<T> {
    Subscribe,
    Next(T),
    Error(PagingError<Error>),
    Complete,
}

/// Records every signal it receives. Requests `initial` items from inside
/// `on_subscribe` and optionally cancels after `cancel_after` items.
struct Recorder<T> {
    signals: Mutex<Vec<Signal<T>>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    initial: u64,
    cancel_after: Option<usize>,
}

impl<T: Clone + Send> Recorder<T> {
    fn new(initial: u64) -> Arc<Self> {
        Arc::new(Self {
            signals: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            initial,
            cancel_after: None,
        })
    }

    fn cancelling_after(initial: u64, items: usize) -> Arc<Self> {
        Arc::new(Self {
            signals: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            initial,
            cancel_after: Some(items),
        })
    }

    fn request(&self, n: u64) {
        let subscription = self.subscription.lock().unwrap().clone();
        subscription.expect("not subscribed").request(n);
    }

    fn cancel(&self) {
        let subscription = self.subscription.lock().unwrap().clone();
        subscription.expect("not subscribed").cancel();
    }

    fn signals(&self) -> Vec<Signal<T>> {
        self.signals.lock().unwrap().clone()
    }

    fn items(&self) -> Vec<T> {
        self.signals()
            .into_iter()
            .filter_map(|signal| match signal {
                Signal::Next(item) => Some(item),
                _ => None,
            })
            .collect()
    }

    fn terminals(&self) -> Vec<Signal<T>> {
        self.signals()
            .into_iter()
            .filter(|signal| matches!(signal, Signal::Error(_) | Signal::Complete))
            .collect()
    }
}

impl<T: Clone + Send> Subscriber<T, PagingError<Error>> for Recorder<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.signals.lock().unwrap().push(Signal::Subscribe);
        *self.subscription.lock().unwrap() = Some(Arc::clone(&subscription));
        if self.initial > 0 {
            subscription.request(self.initial);
        }
    }

    fn on_next(&self, item: T) {
        let delivered = {
            let mut signals = self.signals.lock().unwrap();
            signals.push(Signal::Next(item));
            signals
                .iter()
                .filter(|signal| matches!(signal, Signal::Next(_)))
                .count()
        };
        if self.cancel_after == Some(delivered) {
            self.cancel();
        }
    }

    fn on_error(&self, error: PagingError<Error>) {
        self.signals.lock().unwrap().push(Signal::Error(error));
    }

    fn on_complete(&self) {
        self.signals.lock().unwrap().push(Signal::Complete);
    }
}

/// A page driven by hand from the test body.
struct ManualPage<I> {
    inner: Arc<ManualInner<I>>,
}

struct ManualInner<I> {
    subscriber: Mutex<Option<Arc<dyn Subscriber<I, Error>>>>,
    requests: Mutex<Vec<u64>>,
    cancelled: AtomicBool,
}

impl<I> Clone for ManualPage<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: Send + 'static> ManualPage<I> {
    fn new() -> Self {
        Self {
            inner: Arc::new(ManualInner {
                subscriber: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    fn subscriber(&self) -> Arc<dyn Subscriber<I, Error>> {
        self.inner
            .subscriber
            .lock()
            .unwrap()
            .clone()
            .expect("page was never subscribed")
    }

    fn emit(&self, item: I) {
        self.subscriber().on_next(item);
    }

    fn complete(&self) {
        self.subscriber().on_complete();
    }

    fn fail(&self, error: Error) {
        self.subscriber().on_error(error);
    }

    fn requests(&self) -> Vec<u64> {
        self.inner.requests.lock().unwrap().clone()
    }

    fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

impl<I: Send + 'static> Publisher<I, Error> for ManualPage<I> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<I, Error>>) {
        *self.inner.subscriber.lock().unwrap() = Some(Arc::clone(&subscriber));
        subscriber.on_subscribe(Arc::clone(&self.inner) as Arc<dyn Subscription>);
    }
}

impl<I: Send> Subscription for ManualInner<I> {
    fn request(&self, n: u64) {
        self.requests.lock().unwrap().push(n);
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Hands out the given pages in order, then reports that there are no more.
/// Records the cursor of every call.
fn scripted<I: Send + 'static>(
    pages: Vec<ManualPage<I>>,
    cursors: Arc<Mutex<Vec<Option<i32>>>>,
) -> impl PageGenerator<i32, I, Error = Error, Page = ManualPage<I>> + 'static {
    let pages = Mutex::new(VecDeque::from(pages));
    move |cursor: Option<i32>| {
        cursors.lock().unwrap().push(cursor);
        Ok::<_, Error>(pages.lock().unwrap().pop_front())
    }
}

/// Numbers after `last` in pages of `batch`, up to `max`.
fn numbers(last: Option<i32>, max: i32, batch: i32) -> IterPage<Range<i32>> {
    let start = last.map_or(0, |last| last + 1);
    if start >= max {
        return page::from_iter(0..0);
    }
    let count = batch.min(max - start + 1);
    page::from_iter(start..start + count)
}

fn attach<T, I, G>(
    cursor: Option<T>,
    generator: G,
    recorder: &Arc<Recorder<T>>,
) -> Arc<PagingCoordinator<T, I, G>>
where
    T: Clone + Send + 'static,
    I: Into<Option<T>> + 'static,
    G: PageGenerator<T, I, Error = Error> + 'static,
{
    let coordinator = PagingCoordinator::new(recorder.clone(), Arc::new(generator), cursor);
    recorder.on_subscribe(coordinator.clone());
    coordinator
}

#[test]
fn pages_then_completes_when_more_is_requested() {
    let cursors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&cursors);
    let recorder = Recorder::new(3);
    let coordinator = attach(
        Some(0),
        move |cursor: Option<i32>| {
            seen.lock().unwrap().push(cursor);
            Ok::<_, Error>(match cursor {
                Some(0) => Some(page::from_iter(vec![1, 2, 3])),
                _ => None,
            })
        },
        &recorder,
    );

    assert_eq!(
        recorder.signals(),
        vec![
            Signal::Subscribe,
            Signal::Next(1),
            Signal::Next(2),
            Signal::Next(3)
        ]
    );
    assert_eq!(coordinator.state(), PagingState::Idle);

    recorder.request(10);
    assert_eq!(recorder.terminals(), vec![Signal::Complete]);
    assert_eq!(*cursors.lock().unwrap(), vec![Some(0), Some(3)]);
    assert_eq!(coordinator.state(), PagingState::Completed);
}

#[test]
fn concatenates_pages_until_demand_is_met() {
    let cursors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&cursors);
    let recorder = Recorder::new(8);
    let coordinator = attach(
        Some(2),
        move |last: Option<i32>| {
            seen.lock().unwrap().push(last);
            Ok::<_, Error>(Some(numbers(last, 10, 3)))
        },
        &recorder,
    );

    assert_eq!(recorder.items(), (3..=10).collect::<Vec<_>>());
    assert!(recorder.terminals().is_empty());
    assert_eq!(*cursors.lock().unwrap(), vec![Some(2), Some(5), Some(8)]);
    assert_eq!(coordinator.requested(), 0);
    assert_eq!(coordinator.cursor(), Some(10));

    recorder.request(1);
    assert_eq!(recorder.terminals(), vec![Signal::Complete]);
    assert_eq!(recorder.items(), (3..=10).collect::<Vec<_>>());
    assert_eq!(coordinator.pages_fetched(), 4);
}

#[test]
fn init_failure_errors_without_subscribing() {
    let publisher = crate::create(
        || {
            let divisor = 0;
            10_i32
                .checked_div(divisor)
                .map(Some)
                .ok_or("division by zero")
        },
        |last: Option<i32>| Ok::<_, Error>(Some(numbers(last, 2, 1))),
    );

    let recorder = Recorder::new(8);
    publisher.subscribe(recorder.clone());

    assert_eq!(
        recorder.signals(),
        vec![Signal::Error(PagingError::Init("division by zero"))]
    );
}

#[test]
fn cursor_starts_absent_and_follows_the_last_item() {
    let cursors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&cursors);
    let recorder = Recorder::new(UNBOUNDED);
    attach(
        None,
        move |last: Option<i32>| {
            seen.lock().unwrap().push(last);
            Ok::<_, Error>(Some(match last {
                None => page::from_iter(vec![1, 2]),
                Some(2) => page::from_iter(vec![3]),
                Some(_) => page::from_iter(vec![]),
            }))
        },
        &recorder,
    );

    assert_eq!(recorder.items(), vec![1, 2, 3]);
    assert_eq!(recorder.terminals(), vec![Signal::Complete]);
    assert_eq!(*cursors.lock().unwrap(), vec![None, Some(2), Some(3)]);
}

#[test]
fn empty_first_page_completes_without_items() {
    let recorder = Recorder::new(5);
    let coordinator = attach(
        Some(100),
        |last: Option<i32>| Ok::<_, Error>(Some(numbers(last, 10, 3))),
        &recorder,
    );

    assert_eq!(recorder.signals(), vec![Signal::Subscribe, Signal::Complete]);
    assert_eq!(coordinator.cursor(), Some(100));
    assert_eq!(coordinator.state(), PagingState::Completed);
}

#[test]
fn nothing_happens_before_demand() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let recorder = Recorder::new(0);
    let coordinator = attach(
        None,
        move |last: Option<i32>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(Some(numbers(last, 10, 3)))
        },
        &recorder,
    );

    assert_eq!(recorder.signals(), vec![Signal::Subscribe]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(coordinator.state(), PagingState::Idle);
}

#[test]
fn demand_is_additive() {
    let recorder = Recorder::new(0);
    attach(
        None,
        |last: Option<i32>| Ok::<_, Error>(Some(numbers(last, 100, 4))),
        &recorder,
    );

    recorder.request(2);
    recorder.request(3);
    assert_eq!(recorder.items(), vec![0, 1, 2, 3, 4]);

    recorder.request(6);
    assert_eq!(recorder.items(), (0..11).collect::<Vec<_>>());
    assert!(recorder.terminals().is_empty());
}

#[test]
fn demand_is_forwarded_to_the_active_page() {
    let first = ManualPage::<i32>::new();
    let second = ManualPage::<i32>::new();
    let cursors = Arc::new(Mutex::new(Vec::new()));
    let recorder = Recorder::new(0);
    let coordinator = attach(
        Some(0),
        scripted(vec![first.clone(), second.clone()], Arc::clone(&cursors)),
        &recorder,
    );

    recorder.request(2);
    assert_eq!(coordinator.state(), PagingState::PageActive);
    assert_eq!(first.requests(), vec![2]);

    recorder.request(3);
    assert_eq!(first.requests(), vec![2, 3]);

    first.emit(1);
    first.emit(2);
    first.emit(3);
    assert_eq!(coordinator.requested(), 2);
    assert!(second.requests().is_empty());

    first.complete();
    assert_eq!(second.requests(), vec![2]);
    assert_eq!(*cursors.lock().unwrap(), vec![Some(0), Some(3)]);

    second.emit(4);
    second.emit(5);
    second.complete();
    assert_eq!(coordinator.state(), PagingState::Idle);
    assert_eq!(recorder.items(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn page_completing_without_demand_waits_for_the_next_request() {
    let first = ManualPage::<i32>::new();
    let second = ManualPage::<i32>::new();
    let cursors = Arc::new(Mutex::new(Vec::new()));
    let recorder = Recorder::new(1);
    let coordinator = attach(
        None,
        scripted(vec![first.clone(), second.clone()], Arc::clone(&cursors)),
        &recorder,
    );

    first.emit(7);
    first.complete();
    assert_eq!(coordinator.state(), PagingState::Idle);
    assert_eq!(cursors.lock().unwrap().len(), 1);

    recorder.request(1);
    assert_eq!(*cursors.lock().unwrap(), vec![None, Some(7)]);
    second.complete();
    assert_eq!(recorder.terminals(), vec![Signal::Complete]);
}

#[test]
fn zero_demand_is_rejected_and_cancels_the_page() {
    let first = ManualPage::<i32>::new();
    let recorder = Recorder::new(1);
    let coordinator = attach(
        None,
        scripted(vec![first.clone()], Arc::default()),
        &recorder,
    );

    recorder.request(0);
    assert_eq!(
        recorder.terminals(),
        vec![Signal::Error(PagingError::InvalidDemand)]
    );
    assert!(first.is_cancelled());
    assert_eq!(coordinator.requested(), 1);
    assert_eq!(coordinator.state(), PagingState::Errored);

    first.emit(1);
    recorder.request(1);
    assert!(recorder.items().is_empty());
}

#[test]
fn missing_item_is_rejected() {
    let first = ManualPage::<Option<i32>>::new();
    let recorder = Recorder::new(5);
    let coordinator = attach(
        None,
        scripted(vec![first.clone()], Arc::default()),
        &recorder,
    );

    first.emit(Some(1));
    first.emit(None);
    first.emit(Some(2));
    first.complete();

    assert_eq!(
        recorder.signals(),
        vec![
            Signal::Subscribe,
            Signal::Next(1),
            Signal::Error(PagingError::MissingItem)
        ]
    );
    assert!(first.is_cancelled());
    assert_eq!(coordinator.cursor(), Some(1));
}

#[test]
fn page_ignoring_backpressure_is_rejected() {
    let first = ManualPage::<i32>::new();
    let recorder = Recorder::new(1);
    let coordinator = attach(
        None,
        scripted(vec![first.clone()], Arc::default()),
        &recorder,
    );
    assert_eq!(first.requests(), vec![1]);

    first.emit(1);
    first.emit(2);
    first.emit(3);

    assert_eq!(
        recorder.signals(),
        vec![
            Signal::Subscribe,
            Signal::Next(1),
            Signal::Error(PagingError::Overflow)
        ]
    );
    assert!(first.is_cancelled());
    assert_eq!(coordinator.state(), PagingState::Errored);
    assert_eq!(coordinator.cursor(), Some(1));
    assert!(PagingError::<Error>::Overflow.is_protocol_violation());
}

#[test]
fn page_error_is_the_only_terminal_signal() {
    let first = ManualPage::<i32>::new();
    let recorder = Recorder::new(5);
    attach(
        None,
        scripted(vec![first.clone()], Arc::default()),
        &recorder,
    );

    first.emit(1);
    first.fail("connection reset");
    first.complete();
    first.fail("again");

    assert_eq!(
        recorder.signals(),
        vec![
            Signal::Subscribe,
            Signal::Next(1),
            Signal::Error(PagingError::Page("connection reset"))
        ]
    );
}

#[test]
fn generator_failure_is_a_fetch_error() {
    let recorder = Recorder::new(4);
    let coordinator = attach(
        None,
        |last: Option<i32>| match last {
            None => Ok(Some(page::from_iter(vec![1, 2]))),
            Some(_) => Err("query timed out"),
        },
        &recorder,
    );

    assert_eq!(
        recorder.signals(),
        vec![
            Signal::Subscribe,
            Signal::Next(1),
            Signal::Next(2),
            Signal::Error(PagingError::Fetch("query timed out"))
        ]
    );
    assert_eq!(coordinator.state(), PagingState::Errored);
}

#[test]
fn failing_page_after_items() {
    let recorder = Recorder::new(UNBOUNDED);
    attach(
        None,
        |last: Option<i32>| {
            let page: Box<dyn Publisher<i32, Error>> = match last {
                None => Box::new(page::from_iter(vec![1, 2])),
                Some(_) => Box::new(page::fail("disk on fire")),
            };
            Ok::<_, Error>(Some(page))
        },
        &recorder,
    );

    assert_eq!(
        recorder.signals(),
        vec![
            Signal::Subscribe,
            Signal::Next(1),
            Signal::Next(2),
            Signal::Error(PagingError::Page("disk on fire"))
        ]
    );
}

#[test]
fn cancel_stops_delivery_and_cancels_the_page() {
    let first = ManualPage::<i32>::new();
    let recorder = Recorder::new(5);
    let coordinator = attach(
        None,
        scripted(vec![first.clone()], Arc::default()),
        &recorder,
    );

    first.emit(1);
    recorder.cancel();
    assert!(first.is_cancelled());
    assert_eq!(coordinator.state(), PagingState::Cancelled);

    first.emit(2);
    first.complete();
    recorder.cancel();
    recorder.request(3);

    assert_eq!(recorder.signals(), vec![Signal::Subscribe, Signal::Next(1)]);
    assert_eq!(first.requests(), vec![5]);
}

#[test]
fn cancel_from_inside_on_next() {
    let recorder = Recorder::cancelling_after(UNBOUNDED, 3);
    let coordinator = attach(
        None,
        |last: Option<i32>| Ok::<_, Error>(Some(numbers(last, 100, 10))),
        &recorder,
    );

    assert_eq!(recorder.items(), vec![0, 1, 2]);
    assert!(recorder.terminals().is_empty());
    assert_eq!(coordinator.state(), PagingState::Cancelled);
}

#[test]
fn signals_from_a_superseded_page_are_ignored() {
    let first = ManualPage::<i32>::new();
    let second = ManualPage::<i32>::new();
    let recorder = Recorder::new(5);
    attach(
        None,
        scripted(vec![first.clone(), second.clone()], Arc::default()),
        &recorder,
    );

    first.emit(1);
    first.complete();
    first.emit(99);
    first.complete();
    first.fail("stale");
    second.emit(2);

    assert_eq!(recorder.items(), vec![1, 2]);
    assert!(recorder.terminals().is_empty());
}

#[test]
fn no_fetch_after_exhaustion() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let recorder = Recorder::new(UNBOUNDED);
    attach(
        None,
        move |last: Option<i32>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(Some(numbers(last, 6, 3)))
        },
        &recorder,
    );

    assert_eq!(recorder.items(), (0..6).collect::<Vec<_>>());
    assert_eq!(recorder.terminals(), vec![Signal::Complete]);
    let fetched = calls.load(Ordering::SeqCst);

    recorder.request(10);
    recorder.cancel();
    assert_eq!(calls.load(Ordering::SeqCst), fetched);
    assert_eq!(recorder.terminals(), vec![Signal::Complete]);
}

#[test]
fn long_chains_of_small_pages_do_not_recurse() {
    const PAGES: i32 = 50_000;

    let recorder = Recorder::new(UNBOUNDED);
    attach(
        None,
        |last: Option<i32>| {
            let start = last.map_or(0, |last| last + 1);
            Ok::<_, Error>(Some(page::from_iter(start..(start + 1).min(PAGES))))
        },
        &recorder,
    );

    let items = recorder.items();
    assert_eq!(items.len(), PAGES as usize);
    assert_eq!(items.last(), Some(&(PAGES - 1)));
    assert_eq!(recorder.terminals(), vec![Signal::Complete]);
}

#[test]
fn concurrent_requests_never_fetch_twice_or_over_deliver() {
    const THREADS: usize = 8;
    const REQUESTS_PER_THREAD: usize = 500;
    const TOTAL: usize = THREADS * REQUESTS_PER_THREAD;

    let fetching = Arc::new(AtomicUsize::new(0));
    let guard = Arc::clone(&fetching);
    let recorder = Recorder::new(0);
    let coordinator = attach(
        None,
        move |last: Option<i32>| {
            assert_eq!(guard.fetch_add(1, Ordering::SeqCst), 0, "overlapping fetch");
            let page = numbers(last, 1_000_000, 7);
            guard.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, Error>(Some(page))
        },
        &recorder,
    );

    scope(|s| {
        for _ in 0..THREADS {
            let coordinator = Arc::clone(&coordinator);
            s.spawn(move || {
                for _ in 0..REQUESTS_PER_THREAD {
                    coordinator.request(1);
                }
            });
        }
    });

    let expected: Vec<i32> = (0..TOTAL as i32).collect();
    assert_eq!(recorder.items(), expected);
    assert!(recorder.terminals().is_empty());
    assert_eq!(coordinator.requested(), 0);
}

#[test]
fn concurrent_cancel_and_completion_deliver_at_most_one_terminal() {
    for _ in 0..200 {
        let first = ManualPage::<i32>::new();
        let recorder = Recorder::new(1);
        let coordinator = attach(
            None,
            scripted(vec![first.clone()], Arc::default()),
            &recorder,
        );

        scope(|s| {
            s.spawn(|| first.complete());
            s.spawn(|| coordinator.cancel());
        });

        match coordinator.state() {
            PagingState::Completed => assert_eq!(recorder.terminals(), vec![Signal::Complete]),
            PagingState::Cancelled => assert!(recorder.terminals().is_empty()),
            other => panic!("unexpected state {other:?}"),
        }
    }
}

#[test]
fn every_subscription_is_independent() {
    let inits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&inits);
    let publisher = crate::create(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(-1))
        },
        |last: Option<i32>| Ok::<_, Error>(Some(numbers(last, 9, 4))),
    );

    let first = Recorder::new(UNBOUNDED);
    let second = Recorder::new(3);
    publisher.subscribe(first.clone());
    publisher.subscribe(second.clone());

    assert_eq!(inits.load(Ordering::SeqCst), 2);
    assert_eq!(first.items(), (0..=9).collect::<Vec<_>>());
    assert_eq!(first.terminals(), vec![Signal::Complete]);
    assert_eq!(second.items(), vec![0, 1, 2]);
    assert!(second.terminals().is_empty());
}

#[test]
fn fixed_cursor_publisher() {
    let publisher = crate::from_cursor(Some(4), |last: Option<i32>| {
        Ok::<_, Error>(Some(numbers(last, 8, 2)))
    });

    let recorder = Recorder::new(UNBOUNDED);
    publisher.subscribe(recorder.clone());
    assert_eq!(recorder.items(), vec![5, 6, 7, 8]);
    assert_eq!(recorder.terminals(), vec![Signal::Complete]);
}

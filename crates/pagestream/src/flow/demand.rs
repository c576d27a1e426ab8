use portable_atomic::{AtomicU64, Ordering};

/// Demand value meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

/// Adds `n` to `counter`, saturating at [`UNBOUNDED`].
///
/// Returns the value the counter held before the addition.
pub fn add_demand(counter: &AtomicU64, n: u64) -> u64 {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            if current == UNBOUNDED {
                None
            } else {
                Some(current.saturating_add(n))
            }
        })
        .unwrap_or(UNBOUNDED)
}

/// Takes one unit of demand from `counter`. Unbounded demand is never
/// consumed and an empty counter stays at zero.
///
/// Returns the value the counter held before the call.
pub fn consume_demand(counter: &AtomicU64) -> u64 {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            match current {
                0 | UNBOUNDED => None,
                n => Some(n - 1),
            }
        })
        .unwrap_or_else(|current| current)
}

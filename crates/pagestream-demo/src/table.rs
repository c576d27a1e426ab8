use core::time::Duration;
use portable_atomic::{AtomicU64, Ordering};

/// A row of the simulated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u64,
    pub name: String,
}

impl Row {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            name: format!("row-{id:06}"),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("row {0} is unavailable")]
    Unavailable(u64),
}

/// An in-memory table that only supports keyset queries, with a fixed
/// latency per query.
#[derive(Debug)]
pub struct Table {
    rows: u64,
    latency: Duration,
    fail_at: Option<u64>,
    queries: AtomicU64,
}

impl Table {
    pub fn new(rows: u64, latency: Duration, fail_at: Option<u64>) -> Self {
        Self {
            rows,
            latency,
            fail_at,
            queries: AtomicU64::new(0),
        }
    }

    /// Returns up to `limit` rows with ids greater than `after`, in id order.
    /// An absent `after` starts from the first row.
    pub async fn rows_after(
        &self,
        after: Option<u64>,
        limit: u64,
    ) -> Result<Vec<Row>, TableError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let start = after.map_or(0, |id| id.saturating_add(1));
        let end = start.saturating_add(limit).min(self.rows);
        if let Some(fail_at) = self.fail_at.filter(|id| (start..end).contains(id)) {
            return Err(TableError::Unavailable(fail_at));
        }

        tracing::trace!(?after, start, end, "query");
        Ok((start..end).map(Row::new).collect())
    }

    /// Number of queries served so far.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

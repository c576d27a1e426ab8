use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `pagestream-demo` binary.
///
/// The demo pages through a simulated table whose rows are only reachable
/// by keyset queries ("the next `PAGE_SIZE` rows after id X"). All values are
/// parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pagestream-demo",
    version,
    about = "Page through a simulated keyset-paginated table"
)]
pub struct CliArgs {
    /// Number of rows in the simulated table. Row ids run from `0` to
    /// `TABLE_ROWS - 1`.
    ///
    /// Environment variable: `TABLE_ROWS`
    #[arg(long, env = "TABLE_ROWS", default_value_t = 10_000)]
    pub table_rows: u64,

    /// Maximum number of rows returned by each page query.
    ///
    /// Environment variable: `PAGE_SIZE`
    #[arg(long, env = "PAGE_SIZE", default_value_t = 500)]
    pub page_size: u64,

    /// Number of rows the consumer requests each time its buffer runs dry.
    /// Smaller values apply backpressure earlier; larger values pipeline more.
    ///
    /// Environment variable: `BATCH_SIZE`
    #[arg(long, env = "BATCH_SIZE", default_value_t = 64)]
    pub batch_size: u64,

    /// Resume after this row id instead of starting from the beginning.
    ///
    /// Environment variable: `START_AFTER`
    #[arg(long, env = "START_AFTER")]
    pub start_after: Option<u64>,

    /// Stop after consuming this many rows. Pages past the limit are never
    /// fetched.
    ///
    /// Environment variable: `LIMIT`
    #[arg(long, env = "LIMIT")]
    pub limit: Option<usize>,

    /// Simulated latency of each page query, in milliseconds.
    ///
    /// Environment variable: `PAGE_LATENCY_MS`
    #[arg(long, env = "PAGE_LATENCY_MS", default_value_t = 5)]
    pub page_latency_ms: u64,

    /// Make the query covering this row id fail, to exercise error
    /// propagation.
    ///
    /// Environment variable: `FAIL_AT`
    #[arg(long, env = "FAIL_AT")]
    pub fail_at: Option<u64>,

    /// Log progress every this many rows.
    ///
    /// Environment variable: `REPORT_EVERY`
    #[arg(long, env = "REPORT_EVERY", default_value_t = 1000)]
    pub report_every: u64,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub table_rows: u64,
    pub page_size: u64,
    pub batch_size: u64,
    pub start_after: Option<u64>,
    pub limit: Option<usize>,
    pub page_latency: Duration,
    pub fail_at: Option<u64>,
    pub report_every: u64,
}

impl TryFrom<CliArgs> for DemoConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.page_size == 0 {
            bail!("PAGE_SIZE must be greater than 0");
        }

        if args.batch_size == 0 {
            bail!("BATCH_SIZE must be greater than 0");
        }

        if args.report_every == 0 {
            bail!("REPORT_EVERY must be greater than 0");
        }

        if let Some(start_after) = args.start_after {
            if start_after >= args.table_rows {
                bail!(
                    "START_AFTER ({}) is past the last row id ({})",
                    start_after,
                    args.table_rows.saturating_sub(1)
                );
            }
        }

        Ok(Self {
            table_rows: args.table_rows,
            page_size: args.page_size,
            batch_size: args.batch_size,
            start_after: args.start_after,
            limit: args.limit,
            page_latency: Duration::from_millis(args.page_latency_ms),
            fail_at: args.fail_at,
            report_every: args.report_every,
        })
    }
}

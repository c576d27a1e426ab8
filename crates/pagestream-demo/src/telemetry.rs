//! Console logging for the demo.
//!
//! Events are filtered with `RUST_LOG` (default `info`). Set
//! `RUST_LOG=pagestream=trace` to see every page fetch and terminal signal
//! emitted by the library.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(true),
        )
        .try_init()?;

    Ok(())
}

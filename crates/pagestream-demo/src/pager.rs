use crate::{
    config::DemoConfig,
    table::{Row, Table, TableError},
};
use futures::{StreamExt, TryStreamExt, stream};
use pagestream::{PagingError, PublisherStreamExt, StreamConfig, StreamPage};
use std::sync::Arc;

/// Outcome of a completed paging run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub rows: u64,
    pub last_id: Option<u64>,
    pub queries: u64,
}

/// Streams the table configured by `config`, one keyset query per page, and
/// reports what was consumed.
pub async fn run(config: &DemoConfig) -> Result<Summary, PagingError<TableError>> {
    let table = Arc::new(Table::new(
        config.table_rows,
        config.page_latency,
        config.fail_at,
    ));
    let page_size = config.page_size;
    let start_after = config.start_after;

    let source = Arc::clone(&table);
    let publisher = pagestream::create(
        move || Ok(start_after.map(Row::new)),
        move |last: Option<Row>| {
            let table = Arc::clone(&source);
            let after = last.map(|row| row.id);
            Ok::<_, TableError>(Some(StreamPage::new(move || {
                let table = Arc::clone(&table);
                stream::once(async move { table.rows_after(after, page_size).await })
                    .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<_, TableError>)))
                    .try_flatten()
            })))
        },
    );

    let stream_config = StreamConfig::new().with_batch_size(config.batch_size);
    let mut rows = publisher
        .stream_with(stream_config)
        .take(config.limit.unwrap_or(usize::MAX));

    let mut summary = Summary {
        rows: 0,
        last_id: None,
        queries: 0,
    };
    while let Some(row) = rows.next().await {
        let row = row?;
        summary.rows += 1;
        summary.last_id = Some(row.id);
        if summary.rows % config.report_every == 0 {
            tracing::info!(rows = summary.rows, last = %row.name, "progress");
        }
    }
    drop(rows);

    summary.queries = table.queries();
    Ok(summary)
}

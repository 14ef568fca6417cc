//! Partitioned pagination: disjoint offset ranges drained concurrently.

use crate::{execution::builder::PaginatorBuilder, source::PageSource};
use engine_core::{context::SessionContext, error::PageError, metrics::MetricsSummary};
use futures::{StreamExt, stream::FuturesUnordered};
use model::pagination::page::Page;
use planner::query::template::QueryTemplate;
use std::num::NonZeroUsize;
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, info_span};

/// Half-open row range `[start, end)` owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRange {
    pub start: usize,
    pub end: usize,
}

impl OffsetRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of page fetches needed to cover the range.
    pub fn pages(&self, page_size: NonZeroUsize) -> usize {
        self.len().div_ceil(page_size.get())
    }
}

/// A page tagged with the range that produced it.
#[derive(Debug)]
pub struct RangePage {
    pub range: OffsetRange,
    pub page: Page,
}

#[derive(Debug)]
pub struct RangeOutcome {
    pub range: OffsetRange,
    pub result: Result<MetricsSummary, PageError>,
}

/// Splits `[0, total_rows)` into at most `workers` page-aligned ranges.
///
/// Pages are spread as evenly as possible; no range is empty, so fewer
/// ranges than workers come back for small inputs.
pub fn partition(total_rows: usize, page_size: NonZeroUsize, workers: usize) -> Vec<OffsetRange> {
    let size = page_size.get();
    let total_pages = total_rows.div_ceil(size);
    if total_pages == 0 {
        return Vec::new();
    }

    let workers = workers.clamp(1, total_pages);
    let base = total_pages / workers;
    let extra = total_pages % workers;

    let mut ranges = Vec::with_capacity(workers);
    let mut first_page = 0;
    for idx in 0..workers {
        let pages = base + usize::from(idx < extra);
        let start = first_page * size;
        let end = ((first_page + pages) * size).min(total_rows);
        ranges.push(OffsetRange { start, end });
        first_page += pages;
    }

    ranges
}

/// Drains every range on its own task, each with its own handle, retry
/// budget and metrics.
///
/// Pages are sent to `tx` as they arrive; order across ranges is not
/// preserved. Outcomes are returned in completion order and a failed range
/// does not cancel the others. Dropping the returned future aborts every
/// worker still running.
pub async fn run_partitioned(
    ctx: &SessionContext,
    template: &QueryTemplate,
    ranges: Vec<OffsetRange>,
    tx: mpsc::Sender<RangePage>,
) -> Vec<RangeOutcome> {
    info!(parent: ctx.span(), ranges = ranges.len(), "Launching range workers");

    let mut workers = FuturesUnordered::new();
    for range in ranges {
        let span = info_span!(parent: ctx.span(), "range", start = range.start, end = range.end);
        let mut paginator = PaginatorBuilder::new(ctx.clone().with_span(span))
            .with_metrics(true)
            .build_range(template, range);
        let tx = tx.clone();

        let handle = AbortOnDropHandle::new(tokio::spawn(async move {
            while let Some(page) = paginator.next_page().await? {
                if tx.send(RangePage { range, page }).await.is_err() {
                    debug!(start = range.start, "Page receiver closed, stopping worker");
                    break;
                }
            }
            Ok::<_, PageError>(paginator.summary().unwrap_or_default())
        }));

        workers.push(async move { (range, handle.await) });
    }
    drop(tx);

    let mut outcomes = Vec::with_capacity(workers.len());
    while let Some((range, joined)) = workers.next().await {
        let result = joined.unwrap_or_else(|err| Err(PageError::Worker(err.to_string())));

        match &result {
            Ok(summary) => info!(
                parent: ctx.span(),
                start = range.start,
                end = range.end,
                pages = summary.total_pages_processed,
                records = summary.total_records_processed,
                "Range complete"
            ),
            Err(err) => error!(
                parent: ctx.span(),
                start = range.start,
                end = range.end,
                error = %err,
                "Range failed"
            ),
        }

        outcomes.push(RangeOutcome { range, result });
    }

    outcomes
}

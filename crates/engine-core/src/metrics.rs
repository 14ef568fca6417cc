use serde::Serialize;
use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Clock {
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

impl Clock {
    fn elapsed(&self) -> Duration {
        match (self.elapsed, self.started) {
            (Some(done), _) => done,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct InnerMetrics {
    pages: AtomicU64,
    records: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    clock: Mutex<Clock>,
    errors: Mutex<Vec<String>>,
}

/// Accumulator for one pagination session.
///
/// Cloning yields another handle to the same counters, which is how the
/// cache layer of a session reports into the session's metrics. Separate
/// sessions (and parallel workers) each get their own instance.
#[derive(Debug, Clone, Default)]
pub struct PaginationMetrics {
    inner: Arc<InnerMetrics>,
}

/// Point-in-time view of a session's metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_pages_processed: u64,
    pub total_records_processed: u64,
    pub total_execution_time_seconds: f64,
    pub average_page_execution_time: f64,
    pub records_per_second: f64,
    pub error_count: usize,
    pub errors: Vec<String>,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl PaginationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the session clock. Later calls keep the first start.
    pub fn start(&self) {
        let mut clock = self.clock();
        if clock.started.is_none() {
            clock.started = Some(Instant::now());
        }
    }

    /// Freezes the elapsed time. Called on normal and abnormal completion.
    pub fn finish(&self) {
        let mut clock = self.clock();
        if clock.elapsed.is_none() {
            clock.elapsed = Some(clock.started.map(|s| s.elapsed()).unwrap_or_default());
        }
    }

    pub fn record_page(&self, record_count: usize) {
        self.inner.pages.fetch_add(1, Ordering::Relaxed);
        self.inner
            .records
            .fetch_add(record_count as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self, error: impl fmt::Display) {
        self.inner
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.to_string());
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        self.clock().elapsed()
    }

    /// Callable at any time; mid-session summaries use the time elapsed so far.
    pub fn summary(&self) -> MetricsSummary {
        let pages = self.inner.pages.load(Ordering::Relaxed);
        let records = self.inner.records.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        let errors = self
            .inner
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        MetricsSummary {
            total_pages_processed: pages,
            total_records_processed: records,
            total_execution_time_seconds: elapsed,
            average_page_execution_time: if pages == 0 {
                0.0
            } else {
                elapsed / pages as f64
            },
            records_per_second: if elapsed > 0.0 {
                records as f64 / elapsed
            } else {
                0.0
            },
            error_count: errors.len(),
            errors,
            cache_hits: self.inner.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.inner.cache_misses.load(Ordering::Relaxed),
        }
    }

    fn clock(&self) -> std::sync::MutexGuard<'_, Clock> {
        self.inner
            .clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pages processed:     {}", self.total_pages_processed)?;
        writeln!(f, "Records processed:   {}", self.total_records_processed)?;
        writeln!(
            f,
            "Execution time:      {:.3}s",
            self.total_execution_time_seconds
        )?;
        writeln!(
            f,
            "Avg page time:       {:.3}s",
            self.average_page_execution_time
        )?;
        writeln!(f, "Records per second:  {:.1}", self.records_per_second)?;
        if self.cache_hits + self.cache_misses > 0 {
            writeln!(
                f,
                "Cache hits/misses:   {}/{}",
                self.cache_hits, self.cache_misses
            )?;
        }
        write!(f, "Errors:              {}", self.error_count)?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

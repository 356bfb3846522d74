//! Benchmark workloads: bulk insert and full-cursor query traversal, plus
//! the driver that runs them across every soup and page size.
//!
//! Everything here is strictly sequential — each store call completes before
//! the next is issued — so every timing sample is attributable to a single
//! operation at a time.

use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use serde::Serialize;
use tracing::{info, warn};

use crate::generate::{EntryGen, EntryShape};
use crate::soups::benchmark_soups;
use crate::store::{QuerySpec, SoupStore, StoreConfig, StoreError};
use crate::timing::TimingRegistry;
use crate::{BenchError, BenchResult};

// ────────────────────────────────────────────────────────────────────────────────
// Bulk insert
// ────────────────────────────────────────────────────────────────────────────────

/// Outcome of one bulk-insert workload.
#[derive(Debug)]
pub struct InsertReport {
    pub attempted: usize,
    /// Attempt index and cause of every absorbed failure.
    pub failures: Vec<(usize, StoreError)>,
    /// Wall time of the whole sequence, failed attempts included.
    pub elapsed: Duration,
    pub p50_us: f64,
    pub p99_us: f64,
}

impl InsertReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    /// Successful inserts per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.succeeded() as f64 / secs
        } else {
            0.0
        }
    }
}

/// Insert `n` generated entries into `soup`, one single-entry upsert per
/// attempt, each awaited before the next. No batching, no pipelining.
///
/// An individual failure is recorded and logged, never raised; the loop
/// always runs to `n` attempts. The registry event `insert_<soup>` spans the
/// whole sequence.
pub fn insert_n(
    store: &mut dyn SoupStore,
    config: &StoreConfig,
    soup: &str,
    gen: &mut EntryGen,
    shape: &EntryShape,
    n: usize,
    registry: &mut TimingRegistry,
) -> BenchResult<InsertReport> {
    // fail on bad parameters before the first store call
    shape.validate()?;
    let mut latencies = Histogram::<u64>::new_with_bounds(1, 60_000_000_000, 3)
        .map_err(|e| BenchError::Config(format!("histogram bounds: {e:?}")))?;
    let mut failures = Vec::new();

    let event = format!("insert_{soup}");
    registry.start(event.clone());
    for i in 0..n {
        let entry = gen.gen_entry(shape)?;
        let t = Instant::now();
        if let Err(cause) = store.upsert_entries(config, soup, &[entry]) {
            warn!(soup, attempt = i, %cause, "insert failed, continuing");
            failures.push((i, cause));
        }
        let nanos = t.elapsed().as_nanos() as u64;
        let _ = latencies.record(nanos.max(1));
    }
    let elapsed = registry.end(&event)?;

    let report = InsertReport {
        attempted: n,
        failures,
        elapsed,
        p50_us: latencies.value_at_percentile(50.0) as f64 / 1_000.0,
        p99_us: latencies.value_at_percentile(99.0) as f64 / 1_000.0,
    };
    info!(
        soup,
        attempted = report.attempted,
        succeeded = report.succeeded(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "bulk insert done"
    );
    Ok(report)
}

// ────────────────────────────────────────────────────────────────────────────────
// Paginated query traversal
// ────────────────────────────────────────────────────────────────────────────────

/// Outcome of one full-cursor traversal.
#[derive(Debug)]
pub struct QueryReport {
    pub total_counted: usize,
    pub pages: usize,
    pub elapsed: Duration,
}

/// Run `query` against `soup` and walk every page to the end, counting
/// entries as they appear.
///
/// Pages are fetched strictly one at a time; the cursor returned by each
/// fetch is the only valid input to the next. An empty result set
/// (`total_pages == 0`) terminates immediately with a zero count. Any fetch
/// failure aborts the traversal and discards the partial count. The registry
/// event `query_<soup>_p<page_size>` spans the initial query and every
/// advance.
pub fn query_all(
    store: &mut dyn SoupStore,
    config: &StoreConfig,
    soup: &str,
    query: &QuerySpec,
    registry: &mut TimingRegistry,
) -> BenchResult<QueryReport> {
    let event = format!("query_{soup}_p{}", query.page_size);
    registry.start(event.clone());

    let traversal_err = |page_index, cause| BenchError::QueryTraversalFailed {
        soup: soup.to_string(),
        page_index,
        cause,
    };

    let mut cursor = store
        .run_query(config, query)
        .map_err(|e| traversal_err(0, e))?;
    let mut total = cursor.current_page_entries.len();
    let mut pages = usize::from(cursor.total_pages > 0);

    while cursor.current_page_index + 1 < cursor.total_pages {
        let next_index = cursor.current_page_index + 1;
        cursor = store
            .advance_cursor(config, cursor)
            .map_err(|e| traversal_err(next_index, e))?;
        total += cursor.current_page_entries.len();
        pages += 1;
    }
    let elapsed = registry.end(&event)?;

    info!(
        soup,
        page_size = query.page_size,
        total,
        elapsed_ms = elapsed.as_millis() as u64,
        "query traversal done"
    );
    Ok(QueryReport {
        total_counted: total,
        pages,
        elapsed,
    })
}

// ────────────────────────────────────────────────────────────────────────────────
// The run driver
// ────────────────────────────────────────────────────────────────────────────────

/// Full benchmark-run parameters.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Total payload budget in bytes, split across [`Self::entry_count`]
    /// entries.
    pub total_size: u64,
    /// Target leaf-payload bytes per entry.
    pub entry_size: u64,
    pub depth: u32,
    pub children: u32,
    pub key_length: u32,
    pub min_code_point: u32,
    pub max_code_point: u32,
    /// Page sizes to traverse with.
    pub page_sizes: Vec<usize>,
    /// Drop and re-register soups before inserting.
    pub drop_existing: bool,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_size: 1 << 20,
            entry_size: 1024,
            depth: 0,
            children: 1,
            key_length: 100,
            min_code_point: crate::generate::DEFAULT_MIN_CODE_POINT,
            max_code_point: crate::generate::DEFAULT_MAX_CODE_POINT,
            page_sizes: vec![1, 4, 16],
            drop_existing: true,
            seed: 42,
        }
    }
}

impl RunConfig {
    /// Entries per soup: total budget over per-entry target.
    pub fn entry_count(&self) -> usize {
        if self.entry_size == 0 {
            return 0;
        }
        (self.total_size / self.entry_size) as usize
    }

    pub fn shape(&self) -> BenchResult<EntryShape> {
        EntryShape::for_budget(self.entry_size, self.depth, self.children, self.key_length)
    }
}

/// One named timing sample, as exposed to reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TimingSample {
    pub event: String,
    pub elapsed_ms: f64,
    /// Entries inserted or counted under this event.
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuerySummary {
    pub page_size: usize,
    pub counted: usize,
    pub pages: usize,
    pub elapsed_ms: f64,
    /// Populated when the traversal aborted instead of completing.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SoupSummary {
    pub soup: String,
    pub attempted: usize,
    pub inserted: usize,
    pub insert_ms: f64,
    pub insert_p50_us: f64,
    pub insert_p99_us: f64,
    pub queries: Vec<QuerySummary>,
}

/// Everything one run reports: the raw timing-sample stream plus per-soup
/// summaries, ready for display or structured export.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub store: String,
    pub entry_count: usize,
    pub entry_size: u64,
    pub timings: Vec<TimingSample>,
    pub soups: Vec<SoupSummary>,
}

/// Drive the whole benchmark: soup setup, bulk inserts, then the same
/// all-entries query at every configured page size, against each soup in
/// declared order.
///
/// Generator and setup errors abort the run. A failed traversal is recorded
/// in its soup's summary and the remaining traversals proceed.
pub fn run_benchmark(
    store: &mut dyn SoupStore,
    store_config: &StoreConfig,
    run: &RunConfig,
    registry: &mut TimingRegistry,
) -> BenchResult<RunReport> {
    if run.total_size == 0 || run.entry_size == 0 {
        return Err(BenchError::Config(
            "total size and entry size must be positive".into(),
        ));
    }
    let shape = run.shape()?;
    let n = run.entry_count();
    let mut gen = EntryGen::with_code_points(run.seed, run.min_code_point, run.max_code_point)?;
    let soups = benchmark_soups();

    crate::soups::ensure_soups(store, store_config, &soups, run.drop_existing)?;

    let mut report = RunReport {
        store: store.name().to_string(),
        entry_count: n,
        entry_size: run.entry_size,
        timings: Vec::new(),
        soups: Vec::new(),
    };

    for soup in &soups {
        let name = soup.name();
        let ins = insert_n(store, store_config, name, &mut gen, &shape, n, registry)?;
        report.timings.push(TimingSample {
            event: format!("insert_{name}"),
            elapsed_ms: ins.elapsed.as_secs_f64() * 1e3,
            count: ins.succeeded(),
        });
        let mut summary = SoupSummary {
            soup: name.to_string(),
            attempted: ins.attempted,
            inserted: ins.succeeded(),
            insert_ms: ins.elapsed.as_secs_f64() * 1e3,
            insert_p50_us: ins.p50_us,
            insert_p99_us: ins.p99_us,
            queries: Vec::new(),
        };

        for &page_size in &run.page_sizes {
            let query = QuerySpec::all_entries(name, page_size);
            match query_all(store, store_config, name, &query, registry) {
                Ok(q) => {
                    report.timings.push(TimingSample {
                        event: format!("query_{name}_p{page_size}"),
                        elapsed_ms: q.elapsed.as_secs_f64() * 1e3,
                        count: q.total_counted,
                    });
                    summary.queries.push(QuerySummary {
                        page_size,
                        counted: q.total_counted,
                        pages: q.pages,
                        elapsed_ms: q.elapsed.as_secs_f64() * 1e3,
                        error: None,
                    });
                }
                Err(err @ BenchError::QueryTraversalFailed { .. }) => {
                    warn!(%err, "traversal aborted, continuing with remaining queries");
                    summary.queries.push(QuerySummary {
                        page_size,
                        counted: 0,
                        pages: 0,
                        elapsed_ms: 0.0,
                        error: Some(err.to_string()),
                    });
                }
                Err(other) => return Err(other),
            }
        }
        report.soups.push(summary);
    }
    Ok(report)
}

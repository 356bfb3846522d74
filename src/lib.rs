//! soupbench — synthetic-workload benchmark harness for soup stores.
//!
//! A "soup" is a named, schema-declared collection of JSON documents in an
//! external store. The harness generates size-controlled synthetic entries,
//! bulk-inserts them into three soups that differ in indexing strategy and
//! payload locality (in-row string index, in-row JSON1 index, externally
//! stored payload), then walks the full result set of each soup at several
//! page sizes, timing everything under named events.
//!
//! The store itself is a collaborator behind the [`store::SoupStore`] trait;
//! adapters live in [`adapters`].

pub mod adapters;
pub mod generate;
pub mod report;
pub mod soups;
pub mod store;
pub mod timing;
pub mod workloads;

pub use generate::{EntryGen, EntryShape};
pub use soups::{benchmark_soups, ensure_soup, ensure_soups, SoupConfig};
pub use store::{
    Cursor, IndexKind, IndexSpec, QueryKind, QuerySpec, SoupEntry, SoupFeature, SoupSpec,
    SoupStore, StoreConfig, StoreError,
};
pub use timing::TimingRegistry;
pub use workloads::{insert_n, query_all, run_benchmark, RunConfig, RunReport};

pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Harness-level error taxonomy.
///
/// Per-entry insert failures are deliberately absent: the bulk inserter
/// absorbs them one attempt at a time and reports them in its
/// [`workloads::InsertReport`], so they never surface here.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Generator parameters that cannot produce a document. Raised before
    /// any store call is made.
    #[error("invalid entry shape: {0}")]
    InvalidShape(String),

    /// Registration or removal failed during soup setup. The remaining
    /// soups in the sequence are not touched and partial setup is left
    /// as-is; there is no rollback.
    #[error("setup of soup `{name}` failed: {cause}")]
    CollectionSetupFailed {
        name: String,
        #[source]
        cause: store::StoreError,
    },

    /// A page fetch failed mid-traversal. Counts accumulated before the
    /// failure are discarded, not partially reported.
    #[error("query traversal of `{soup}` failed at page {page_index}: {cause}")]
    QueryTraversalFailed {
        soup: String,
        page_index: usize,
        #[source]
        cause: store::StoreError,
    },

    /// [`timing::TimingRegistry::end`] without a matching `start`.
    #[error("timing end without matching start: `{name}`")]
    UnmatchedTimingEnd { name: String },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

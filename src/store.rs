//! Store collaborator contract.
//!
//! The harness never talks to a concrete database directly; every operation
//! goes through [`SoupStore`]. Each call blocks until the store reports a
//! result or a failure — no timeouts, no cancellation — and the harness
//! never has two calls in flight at once.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by store adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no such soup: `{0}`")]
    NoSuchSoup(String),

    /// `advance_cursor` past the last page.
    #[error("cursor exhausted")]
    CursorExhausted,

    #[error("malformed query: {0}")]
    BadQuery(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store-level configuration passed to every operation.
///
/// `global` selects the process-global store rather than a scoped one; the
/// benchmark always drives the global store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreConfig {
    pub global: bool,
}

// ────────────────────────────────────────────────────────────────────────────────
// Soup schema declarations
// ────────────────────────────────────────────────────────────────────────────────

/// Per-soup storage features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoupFeature {
    /// Entry payloads live outside the primary row, one file per entry.
    ExternalStorage,
}

/// Identity and features of one soup. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoupSpec {
    pub name: String,
    pub features: Vec<SoupFeature>,
}

impl SoupSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
        }
    }

    pub fn with_feature(mut self, feature: SoupFeature) -> Self {
        self.features.push(feature);
        self
    }

    pub fn external_storage(&self) -> bool {
        self.features.contains(&SoupFeature::ExternalStorage)
    }
}

/// Declared value type of an indexed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Materialized in-row string column.
    String,
    /// JSON1 path expression over the in-row payload.
    Json1,
}

/// A path within an entry that the store should index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub path: String,
    pub kind: IndexKind,
}

impl IndexSpec {
    pub fn string(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: IndexKind::String,
        }
    }

    pub fn json1(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: IndexKind::Json1,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Entries, queries, cursors
// ────────────────────────────────────────────────────────────────────────────────

/// One generated document. Fire-and-forget: ownership transfers to the store
/// on upsert; the harness retains nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoupEntry {
    pub key: String,
    pub value: Value,
}

impl SoupEntry {
    /// The serialized form handed to the store: `{"key": …, "value": …}`.
    pub fn to_json(&self) -> Value {
        serde_json::json!({ "key": self.key, "value": self.value })
    }
}

/// Query kinds understood by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryKind {
    /// Free-form query text with `{soup}` references.
    Smart,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuerySpec {
    pub kind: QueryKind,
    pub text: String,
    pub page_size: usize,
}

impl QuerySpec {
    /// Query selecting every entry of `soup`, in store order.
    pub fn all_entries(soup: &str, page_size: usize) -> Self {
        Self {
            kind: QueryKind::Smart,
            text: format!("SELECT {{{soup}:_soup}} FROM {{{soup}}}"),
            page_size,
        }
    }

    /// Soup addressed by the first `{…}` reference in the query text.
    pub fn target_soup(&self) -> StoreResult<&str> {
        let start = self
            .text
            .find('{')
            .ok_or_else(|| StoreError::BadQuery(format!("no soup reference in `{}`", self.text)))?;
        let rest = &self.text[start + 1..];
        let end = rest
            .find(|c| c == '}' || c == ':')
            .ok_or_else(|| StoreError::BadQuery(format!("unterminated soup reference in `{}`", self.text)))?;
        if end == 0 {
            return Err(StoreError::BadQuery(format!(
                "empty soup reference in `{}`",
                self.text
            )));
        }
        Ok(&rest[..end])
    }
}

/// Handle over one paginated result set.
///
/// The store mutates paging state with each fetch: the cursor returned by
/// one call is the only valid input to the next.
#[derive(Debug, Clone)]
pub struct Cursor {
    pub soup: String,
    pub page_size: usize,
    pub current_page_index: usize,
    pub total_pages: usize,
    pub current_page_entries: Vec<Value>,
}

// ────────────────────────────────────────────────────────────────────────────────
// The operation contract
// ────────────────────────────────────────────────────────────────────────────────

/// Operations the harness drives. Implemented by every adapter.
///
/// Registration is not idempotent on the store side; callers check
/// existence first (see [`crate::soups::ensure_soup`]).
pub trait SoupStore {
    fn name(&self) -> &str;

    fn collection_exists(&mut self, config: &StoreConfig, name: &str) -> StoreResult<bool>;

    fn register_collection(
        &mut self,
        config: &StoreConfig,
        spec: &SoupSpec,
        index_specs: &[IndexSpec],
    ) -> StoreResult<()>;

    fn remove_collection(&mut self, config: &StoreConfig, name: &str) -> StoreResult<()>;

    fn upsert_entries(
        &mut self,
        config: &StoreConfig,
        name: &str,
        entries: &[SoupEntry],
    ) -> StoreResult<()>;

    /// Issue a query, returning the cursor positioned on the first page.
    fn run_query(&mut self, config: &StoreConfig, query: &QuerySpec) -> StoreResult<Cursor>;

    /// Advance to the next page. Fails with [`StoreError::CursorExhausted`]
    /// on the last page.
    fn advance_cursor(&mut self, config: &StoreConfig, cursor: Cursor) -> StoreResult<Cursor>;
}

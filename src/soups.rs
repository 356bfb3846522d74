//! Soup lifecycle management and the benchmark fixtures.

use tracing::info;

use crate::store::{IndexSpec, SoupFeature, SoupSpec, SoupStore, StoreConfig};
use crate::{BenchError, BenchResult};

/// A soup together with its index declarations. Built at configuration time,
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct SoupConfig {
    pub spec: SoupSpec,
    pub index_specs: Vec<IndexSpec>,
}

impl SoupConfig {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// The three storage configurations under test: in-row string index, in-row
/// JSON1 index, externally stored payload.
pub fn benchmark_soups() -> Vec<SoupConfig> {
    vec![
        SoupConfig {
            spec: SoupSpec::new("i_str"),
            index_specs: vec![IndexSpec::string("key")],
        },
        SoupConfig {
            spec: SoupSpec::new("i_json1"),
            index_specs: vec![IndexSpec::json1("key")],
        },
        SoupConfig {
            spec: SoupSpec::new("e_str").with_feature(SoupFeature::ExternalStorage),
            index_specs: vec![IndexSpec::string("key")],
        },
    ]
}

/// Create `soup` if needed.
///
/// Existing soup with `drop_if_exists` → removed, then re-registered.
/// Existing soup without it → left untouched; registration is skipped
/// entirely, so a schema from an earlier run persists. Absent soup →
/// registered unconditionally.
pub fn ensure_soup(
    store: &mut dyn SoupStore,
    config: &StoreConfig,
    soup: &SoupConfig,
    drop_if_exists: bool,
) -> BenchResult<()> {
    let name = soup.name();
    let setup_err = |cause| BenchError::CollectionSetupFailed {
        name: name.to_string(),
        cause,
    };

    let exists = store.collection_exists(config, name).map_err(setup_err)?;
    if exists {
        if !drop_if_exists {
            info!(soup = name, "soup exists, leaving untouched");
            return Ok(());
        }
        info!(soup = name, "removing soup");
        store.remove_collection(config, name).map_err(setup_err)?;
    }
    info!(soup = name, "registering soup");
    store
        .register_collection(config, &soup.spec, &soup.index_specs)
        .map_err(setup_err)?;
    Ok(())
}

/// Apply [`ensure_soup`] to each config in declared order, completing one
/// soup fully before starting the next. The first failure aborts the
/// remainder; soups already set up stay as they are (no rollback).
pub fn ensure_soups(
    store: &mut dyn SoupStore,
    config: &StoreConfig,
    soups: &[SoupConfig],
    drop_if_exists: bool,
) -> BenchResult<()> {
    for soup in soups {
        ensure_soup(store, config, soup, drop_if_exists)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::store::{Cursor, QuerySpec, SoupEntry, StoreError, StoreResult};

    fn entry(key: &str) -> SoupEntry {
        SoupEntry {
            key: key.into(),
            value: serde_json::json!("payload"),
        }
    }

    fn count(store: &mut MemoryStore, soup: &str) -> usize {
        let cfg = StoreConfig::default();
        let cursor = store
            .run_query(&cfg, &QuerySpec::all_entries(soup, 100))
            .unwrap();
        cursor.current_page_entries.len()
    }

    #[test]
    fn absent_soup_is_registered() {
        let mut store = MemoryStore::new();
        let cfg = StoreConfig::default();
        let soups = benchmark_soups();
        ensure_soups(&mut store, &cfg, &soups, false).unwrap();
        for soup in &soups {
            assert!(store.collection_exists(&cfg, soup.name()).unwrap());
        }
    }

    #[test]
    fn drop_if_exists_recreates_and_clears() {
        let mut store = MemoryStore::new();
        let cfg = StoreConfig::default();
        let soups = benchmark_soups();
        ensure_soups(&mut store, &cfg, &soups, true).unwrap();
        store.upsert_entries(&cfg, "i_str", &[entry("a"), entry("b")]).unwrap();
        assert_eq!(count(&mut store, "i_str"), 2);

        ensure_soups(&mut store, &cfg, &soups, true).unwrap();
        assert_eq!(count(&mut store, "i_str"), 0);
    }

    #[test]
    fn existing_soup_without_drop_is_a_no_op() {
        let mut store = MemoryStore::new();
        let cfg = StoreConfig::default();
        let original = SoupConfig {
            spec: SoupSpec::new("i_str"),
            index_specs: vec![IndexSpec::string("key")],
        };
        ensure_soup(&mut store, &cfg, &original, true).unwrap();
        store.upsert_entries(&cfg, "i_str", &[entry("a")]).unwrap();

        // same name, different schema: must not be applied
        let changed = SoupConfig {
            spec: SoupSpec::new("i_str"),
            index_specs: vec![IndexSpec::json1("key"), IndexSpec::string("other")],
        };
        ensure_soup(&mut store, &cfg, &changed, false).unwrap();

        assert!(store.collection_exists(&cfg, "i_str").unwrap());
        assert_eq!(count(&mut store, "i_str"), 1);
        assert_eq!(
            store.index_specs("i_str").unwrap(),
            &[IndexSpec::string("key")][..]
        );
    }

    /// Fails every removal of one named soup; everything else delegates.
    struct FailingRemove {
        inner: MemoryStore,
        poison: &'static str,
    }

    impl SoupStore for FailingRemove {
        fn name(&self) -> &str {
            "failing-remove"
        }
        fn collection_exists(&mut self, c: &StoreConfig, n: &str) -> StoreResult<bool> {
            self.inner.collection_exists(c, n)
        }
        fn register_collection(
            &mut self,
            c: &StoreConfig,
            s: &SoupSpec,
            ix: &[IndexSpec],
        ) -> StoreResult<()> {
            self.inner.register_collection(c, s, ix)
        }
        fn remove_collection(&mut self, c: &StoreConfig, n: &str) -> StoreResult<()> {
            if n == self.poison {
                return Err(StoreError::Database("injected removal failure".into()));
            }
            self.inner.remove_collection(c, n)
        }
        fn upsert_entries(
            &mut self,
            c: &StoreConfig,
            n: &str,
            e: &[SoupEntry],
        ) -> StoreResult<()> {
            self.inner.upsert_entries(c, n, e)
        }
        fn run_query(&mut self, c: &StoreConfig, q: &QuerySpec) -> StoreResult<Cursor> {
            self.inner.run_query(c, q)
        }
        fn advance_cursor(&mut self, c: &StoreConfig, cur: Cursor) -> StoreResult<Cursor> {
            self.inner.advance_cursor(c, cur)
        }
    }

    #[test]
    fn setup_failure_aborts_the_sequence_without_rollback() {
        let mut store = FailingRemove {
            inner: MemoryStore::new(),
            poison: "i_str",
        };
        let cfg = StoreConfig::default();
        let soups = benchmark_soups();
        // first pass populates all three soups
        ensure_soups(&mut store, &cfg, &soups, false).unwrap();
        store.upsert_entries(&cfg, "i_json1", &[entry("kept")]).unwrap();

        let err = ensure_soups(&mut store, &cfg, &soups, true).unwrap_err();
        match err {
            BenchError::CollectionSetupFailed { name, .. } => assert_eq!(name, "i_str"),
            other => panic!("unexpected error: {other}"),
        }
        // later soups were never reached: i_json1 still holds its entry
        assert_eq!(count(&mut store.inner, "i_json1"), 1);
    }
}

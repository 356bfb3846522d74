//! In-memory soup store.
//!
//! Reference collaborator for tests and dry runs: entries live in insertion
//! order per soup, pagination slices that order. Index declarations are
//! recorded but never consulted — there is nothing to accelerate here.

use std::collections::HashMap;

use serde_json::Value;

use crate::store::{
    Cursor, IndexSpec, QuerySpec, SoupEntry, SoupSpec, SoupStore, StoreConfig, StoreError,
    StoreResult,
};

#[derive(Debug)]
struct MemorySoup {
    index_specs: Vec<IndexSpec>,
    entries: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    soups: HashMap<String, MemorySoup>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index declarations a soup was registered with, if it exists.
    pub fn index_specs(&self, name: &str) -> Option<&[IndexSpec]> {
        self.soups.get(name).map(|s| s.index_specs.as_slice())
    }

    fn soup(&self, name: &str) -> StoreResult<&MemorySoup> {
        self.soups
            .get(name)
            .ok_or_else(|| StoreError::NoSuchSoup(name.to_string()))
    }

    fn page(entries: &[Value], page_size: usize, page_index: usize) -> Vec<Value> {
        entries
            .iter()
            .skip(page_index * page_size)
            .take(page_size)
            .cloned()
            .collect()
    }
}

impl SoupStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn collection_exists(&mut self, _config: &StoreConfig, name: &str) -> StoreResult<bool> {
        Ok(self.soups.contains_key(name))
    }

    // re-registering an existing soup replaces it; callers check existence
    // first
    fn register_collection(
        &mut self,
        _config: &StoreConfig,
        spec: &SoupSpec,
        index_specs: &[IndexSpec],
    ) -> StoreResult<()> {
        self.soups.insert(
            spec.name.clone(),
            MemorySoup {
                index_specs: index_specs.to_vec(),
                entries: Vec::new(),
            },
        );
        Ok(())
    }

    fn remove_collection(&mut self, _config: &StoreConfig, name: &str) -> StoreResult<()> {
        self.soups
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NoSuchSoup(name.to_string()))
    }

    fn upsert_entries(
        &mut self,
        _config: &StoreConfig,
        name: &str,
        entries: &[SoupEntry],
    ) -> StoreResult<()> {
        let soup = self
            .soups
            .get_mut(name)
            .ok_or_else(|| StoreError::NoSuchSoup(name.to_string()))?;
        soup.entries.extend(entries.iter().map(SoupEntry::to_json));
        Ok(())
    }

    fn run_query(&mut self, _config: &StoreConfig, query: &QuerySpec) -> StoreResult<Cursor> {
        if query.page_size == 0 {
            return Err(StoreError::BadQuery("page size must be >= 1".into()));
        }
        let soup_name = query.target_soup()?.to_string();
        let soup = self.soup(&soup_name)?;
        let total_pages = (soup.entries.len() + query.page_size - 1) / query.page_size;
        Ok(Cursor {
            current_page_entries: Self::page(&soup.entries, query.page_size, 0),
            soup: soup_name,
            page_size: query.page_size,
            current_page_index: 0,
            total_pages,
        })
    }

    fn advance_cursor(&mut self, _config: &StoreConfig, cursor: Cursor) -> StoreResult<Cursor> {
        if cursor.current_page_index + 1 >= cursor.total_pages {
            return Err(StoreError::CursorExhausted);
        }
        let soup = self.soup(&cursor.soup)?;
        let next = cursor.current_page_index + 1;
        Ok(Cursor {
            current_page_index: next,
            current_page_entries: Self::page(&soup.entries, cursor.page_size, next),
            ..cursor
        })
    }
}

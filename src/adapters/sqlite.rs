//! SQLite-backed soup store (via rusqlite).
//!
//! Layout: one table per soup holding a rowid, the serialized entry in a
//! `soup` column, and one materialized `idx_<n>` column per string index.
//! JSON1 index paths become `json_extract` expression indexes over the
//! serialized entry. Soups with the external-storage feature keep the row
//! payload NULL and write each entry to its own `soupelt_<id>.json` file
//! next to the database. A `soup_attrs` table records every registered soup
//! with its features and index declarations.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::store::{
    Cursor, IndexKind, IndexSpec, QuerySpec, SoupEntry, SoupFeature, SoupSpec, SoupStore,
    StoreConfig, StoreError, StoreResult,
};

pub struct SqliteStore {
    conn: Connection,
    dir: PathBuf,
}

struct SoupMeta {
    features: Vec<SoupFeature>,
    index_specs: Vec<IndexSpec>,
}

impl SoupMeta {
    fn external(&self) -> bool {
        self.features.contains(&SoupFeature::ExternalStorage)
    }
}

impl SqliteStore {
    /// Open (or create) the store under `dir`.
    pub fn new(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join("soup.sqlite3"))
            .map_err(|e| StoreError::Database(format!("open: {e}")))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| StoreError::Database(format!("pragma: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS soup_attrs (
                soup_name   TEXT PRIMARY KEY,
                features    TEXT NOT NULL,
                index_specs TEXT NOT NULL
            );",
        )
        .map_err(|e| StoreError::Database(format!("create soup_attrs: {e}")))?;
        Ok(Self {
            conn,
            dir: dir.to_path_buf(),
        })
    }

    fn table_name(soup: &str) -> String {
        let safe: String = soup
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("soup_{safe}")
    }

    fn soup_dir(&self, soup: &str) -> PathBuf {
        self.dir.join(Self::table_name(soup))
    }

    fn soup_meta(&self, soup: &str) -> StoreResult<SoupMeta> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT features, index_specs FROM soup_attrs WHERE soup_name = ?1")
            .map_err(|e| StoreError::Database(format!("prepare meta: {e}")))?;
        let row: Result<(String, String), _> =
            stmt.query_row(params![soup], |r| Ok((r.get(0)?, r.get(1)?)));
        match row {
            Ok((features, specs)) => Ok(SoupMeta {
                features: serde_json::from_str(&features)
                    .map_err(|e| StoreError::Database(format!("decode features: {e}")))?,
                index_specs: serde_json::from_str(&specs)
                    .map_err(|e| StoreError::Database(format!("decode index specs: {e}")))?,
            }),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::NoSuchSoup(soup.to_string()))
            }
            Err(e) => Err(StoreError::Database(format!("meta: {e}"))),
        }
    }

    fn count_entries(&self, soup: &str) -> StoreResult<usize> {
        let table = Self::table_name(soup);
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT COUNT(*) FROM {table}"))
            .map_err(|e| StoreError::Database(format!("prepare count: {e}")))?;
        let count: i64 = stmt
            .query_row([], |r| r.get(0))
            .map_err(|e| StoreError::Database(format!("count: {e}")))?;
        Ok(count as usize)
    }

    fn fetch_page(
        &self,
        soup: &str,
        external: bool,
        page_size: usize,
        page_index: usize,
    ) -> StoreResult<Vec<Value>> {
        let table = Self::table_name(soup);
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "SELECT id, soup FROM {table} ORDER BY id LIMIT ?1 OFFSET ?2"
            ))
            .map_err(|e| StoreError::Database(format!("prepare page: {e}")))?;
        let rows = stmt
            .query_map(
                params![page_size as i64, (page_size * page_index) as i64],
                |r| {
                    let id: i64 = r.get(0)?;
                    let payload: Option<String> = r.get(1)?;
                    Ok((id, payload))
                },
            )
            .map_err(|e| StoreError::Database(format!("page: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, payload) = row.map_err(|e| StoreError::Database(format!("row: {e}")))?;
            let text = match payload {
                Some(text) => text,
                None if external => fs::read_to_string(self.entry_path(soup, id))?,
                None => {
                    return Err(StoreError::Database(format!(
                        "row {id} of `{soup}` has no payload"
                    )))
                }
            };
            entries.push(
                serde_json::from_str(&text)
                    .map_err(|e| StoreError::Database(format!("decode row {id}: {e}")))?,
            );
        }
        Ok(entries)
    }

    fn entry_path(&self, soup: &str, id: i64) -> PathBuf {
        self.soup_dir(soup).join(format!("soupelt_{id}.json"))
    }
}

impl SoupStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn collection_exists(&mut self, _config: &StoreConfig, name: &str) -> StoreResult<bool> {
        match self.soup_meta(name) {
            Ok(_) => Ok(true),
            Err(StoreError::NoSuchSoup(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn register_collection(
        &mut self,
        _config: &StoreConfig,
        spec: &SoupSpec,
        index_specs: &[IndexSpec],
    ) -> StoreResult<()> {
        let external = spec.external_storage();
        if external && index_specs.iter().any(|s| s.kind == IndexKind::Json1) {
            return Err(StoreError::Database(
                "json1 index requires an in-row payload".into(),
            ));
        }
        let table = Self::table_name(&spec.name);
        let mut columns = vec![
            "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            "soup TEXT".to_string(),
            "created INTEGER NOT NULL".to_string(),
        ];
        for (i, ix) in index_specs.iter().enumerate() {
            if ix.kind == IndexKind::String {
                columns.push(format!("idx_{i} TEXT"));
            }
        }

        let features = serde_json::to_string(&spec.features)
            .map_err(|e| StoreError::Database(format!("encode features: {e}")))?;
        let specs = serde_json::to_string(index_specs)
            .map_err(|e| StoreError::Database(format!("encode index specs: {e}")))?;

        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError::Database(format!("begin: {e}")))?;
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} ({});",
            columns.join(", ")
        ))
        .map_err(|e| StoreError::Database(format!("create {table}: {e}")))?;
        for (i, ix) in index_specs.iter().enumerate() {
            let ddl = match ix.kind {
                IndexKind::String => format!(
                    "CREATE INDEX IF NOT EXISTS {table}_idx_{i} ON {table} (idx_{i});"
                ),
                IndexKind::Json1 => format!(
                    "CREATE INDEX IF NOT EXISTS {table}_idx_{i} ON {table} (json_extract(soup, '$.{}'));",
                    ix.path.replace('\'', "''")
                ),
            };
            tx.execute_batch(&ddl)
                .map_err(|e| StoreError::Database(format!("index {table}_idx_{i}: {e}")))?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO soup_attrs (soup_name, features, index_specs)
             VALUES (?1, ?2, ?3)",
            params![spec.name, features, specs],
        )
        .map_err(|e| StoreError::Database(format!("record soup: {e}")))?;
        tx.commit()
            .map_err(|e| StoreError::Database(format!("commit: {e}")))?;

        if external {
            fs::create_dir_all(self.soup_dir(&spec.name))?;
        }
        Ok(())
    }

    fn remove_collection(&mut self, _config: &StoreConfig, name: &str) -> StoreResult<()> {
        let meta = self.soup_meta(name)?;
        let table = Self::table_name(name);
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError::Database(format!("begin: {e}")))?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))
            .map_err(|e| StoreError::Database(format!("drop {table}: {e}")))?;
        tx.execute("DELETE FROM soup_attrs WHERE soup_name = ?1", params![name])
            .map_err(|e| StoreError::Database(format!("unrecord soup: {e}")))?;
        tx.commit()
            .map_err(|e| StoreError::Database(format!("commit: {e}")))?;

        if meta.external() {
            let dir = self.soup_dir(name);
            if dir.exists() {
                fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    fn upsert_entries(
        &mut self,
        _config: &StoreConfig,
        name: &str,
        entries: &[SoupEntry],
    ) -> StoreResult<()> {
        let meta = self.soup_meta(name)?;
        let external = meta.external();
        let table = Self::table_name(name);
        let created = now_millis() as i64;

        let string_cols: Vec<(usize, &IndexSpec)> = meta
            .index_specs
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == IndexKind::String)
            .collect();
        let mut cols = vec!["soup".to_string(), "created".to_string()];
        for (i, _) in &string_cols {
            cols.push(format!("idx_{i}"));
        }
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
        let insert_sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            cols.join(", "),
            placeholders.join(", ")
        );

        let dir = self.soup_dir(name);
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError::Database(format!("begin: {e}")))?;
        for entry in entries {
            let json = entry.to_json();
            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(cols.len());
            values.push(if external {
                rusqlite::types::Value::Null
            } else {
                json.to_string().into()
            });
            values.push(created.into());
            for (_, ix) in &string_cols {
                values.push(match index_value(&json, &ix.path) {
                    Some(Value::String(s)) => s.clone().into(),
                    Some(other) => other.to_string().into(),
                    None => rusqlite::types::Value::Null,
                });
            }
            tx.execute(&insert_sql, rusqlite::params_from_iter(values))
                .map_err(|e| StoreError::Database(format!("insert into {table}: {e}")))?;
            if external {
                let id = tx.last_insert_rowid();
                fs::write(dir.join(format!("soupelt_{id}.json")), json.to_string())?;
            }
        }
        tx.commit()
            .map_err(|e| StoreError::Database(format!("commit: {e}")))?;
        Ok(())
    }

    fn run_query(&mut self, _config: &StoreConfig, query: &QuerySpec) -> StoreResult<Cursor> {
        if query.page_size == 0 {
            return Err(StoreError::BadQuery("page size must be >= 1".into()));
        }
        let soup = query.target_soup()?.to_string();
        let meta = self.soup_meta(&soup)?;
        let total = self.count_entries(&soup)?;
        let total_pages = (total + query.page_size - 1) / query.page_size;
        let entries = if total_pages == 0 {
            Vec::new()
        } else {
            self.fetch_page(&soup, meta.external(), query.page_size, 0)?
        };
        Ok(Cursor {
            soup,
            page_size: query.page_size,
            current_page_index: 0,
            total_pages,
            current_page_entries: entries,
        })
    }

    fn advance_cursor(&mut self, _config: &StoreConfig, cursor: Cursor) -> StoreResult<Cursor> {
        if cursor.current_page_index + 1 >= cursor.total_pages {
            return Err(StoreError::CursorExhausted);
        }
        let meta = self.soup_meta(&cursor.soup)?;
        let next = cursor.current_page_index + 1;
        let entries = self.fetch_page(&cursor.soup, meta.external(), cursor.page_size, next)?;
        Ok(Cursor {
            current_page_index: next,
            current_page_entries: entries,
            ..cursor
        })
    }
}

/// Entry value at a dot-separated path, for materialized index columns.
fn index_value<'v>(entry: &'v Value, path: &str) -> Option<&'v Value> {
    let mut cur = entry;
    for part in path.split('.') {
        cur = cur.get(part)?;
    }
    Some(cur)
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(key: &str) -> SoupEntry {
        SoupEntry {
            key: key.into(),
            value: serde_json::json!({ "n": key }),
        }
    }

    fn open() -> (TempDir, SqliteStore, StoreConfig) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();
        (tmp, store, StoreConfig::default())
    }

    #[test]
    fn register_exists_remove_roundtrip() {
        let (_tmp, mut store, cfg) = open();
        let spec = SoupSpec::new("i_str");
        assert!(!store.collection_exists(&cfg, "i_str").unwrap());
        store
            .register_collection(&cfg, &spec, &[IndexSpec::string("key")])
            .unwrap();
        assert!(store.collection_exists(&cfg, "i_str").unwrap());
        store.remove_collection(&cfg, "i_str").unwrap();
        assert!(!store.collection_exists(&cfg, "i_str").unwrap());
    }

    #[test]
    fn removal_of_missing_soup_fails() {
        let (_tmp, mut store, cfg) = open();
        assert!(matches!(
            store.remove_collection(&cfg, "nope"),
            Err(StoreError::NoSuchSoup(_))
        ));
    }

    #[test]
    fn recreate_drops_previous_rows() {
        let (_tmp, mut store, cfg) = open();
        let spec = SoupSpec::new("s");
        let ix = [IndexSpec::string("key")];
        store.register_collection(&cfg, &spec, &ix).unwrap();
        store
            .upsert_entries(&cfg, "s", &[entry("a"), entry("b")])
            .unwrap();
        store.remove_collection(&cfg, "s").unwrap();
        store.register_collection(&cfg, &spec, &ix).unwrap();

        let cursor = store
            .run_query(&cfg, &QuerySpec::all_entries("s", 10))
            .unwrap();
        assert_eq!(cursor.total_pages, 0);
    }

    #[test]
    fn pagination_preserves_entries_and_order() {
        let (_tmp, mut store, cfg) = open();
        store
            .register_collection(&cfg, &SoupSpec::new("s"), &[IndexSpec::string("key")])
            .unwrap();
        let entries: Vec<SoupEntry> = (0..7).map(|i| entry(&format!("k{i}"))).collect();
        store.upsert_entries(&cfg, "s", &entries).unwrap();

        let mut cursor = store
            .run_query(&cfg, &QuerySpec::all_entries("s", 3))
            .unwrap();
        assert_eq!(cursor.total_pages, 3);
        let mut seen = Vec::new();
        loop {
            for e in &cursor.current_page_entries {
                seen.push(e["key"].as_str().unwrap().to_string());
            }
            if cursor.current_page_index + 1 >= cursor.total_pages {
                break;
            }
            cursor = store.advance_cursor(&cfg, cursor).unwrap();
        }
        let expected: Vec<String> = (0..7).map(|i| format!("k{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn json1_soup_accepts_entries() {
        let (_tmp, mut store, cfg) = open();
        store
            .register_collection(&cfg, &SoupSpec::new("i_json1"), &[IndexSpec::json1("key")])
            .unwrap();
        store
            .upsert_entries(&cfg, "i_json1", &[entry("a"), entry("b")])
            .unwrap();
        let cursor = store
            .run_query(&cfg, &QuerySpec::all_entries("i_json1", 10))
            .unwrap();
        assert_eq!(cursor.current_page_entries.len(), 2);
    }

    #[test]
    fn external_storage_writes_one_file_per_entry() {
        let (tmp, mut store, cfg) = open();
        let spec = SoupSpec::new("e_str").with_feature(SoupFeature::ExternalStorage);
        store
            .register_collection(&cfg, &spec, &[IndexSpec::string("key")])
            .unwrap();
        store
            .upsert_entries(&cfg, "e_str", &[entry("a"), entry("b")])
            .unwrap();

        let soup_dir = tmp.path().join("soup_e_str");
        let files = fs::read_dir(&soup_dir).unwrap().count();
        assert_eq!(files, 2);

        // entries come back intact from the files
        let cursor = store
            .run_query(&cfg, &QuerySpec::all_entries("e_str", 10))
            .unwrap();
        assert_eq!(cursor.current_page_entries.len(), 2);
        assert_eq!(cursor.current_page_entries[0]["key"], "a");

        // removal cleans the payload directory up
        store.remove_collection(&cfg, "e_str").unwrap();
        assert!(!soup_dir.exists());
    }

    #[test]
    fn external_storage_rejects_json1_indexes() {
        let (_tmp, mut store, cfg) = open();
        let spec = SoupSpec::new("bad").with_feature(SoupFeature::ExternalStorage);
        assert!(store
            .register_collection(&cfg, &spec, &[IndexSpec::json1("key")])
            .is_err());
    }

    #[test]
    fn cursor_exhaustion_fails() {
        let (_tmp, mut store, cfg) = open();
        store
            .register_collection(&cfg, &SoupSpec::new("s"), &[IndexSpec::string("key")])
            .unwrap();
        store.upsert_entries(&cfg, "s", &[entry("a")]).unwrap();
        let cursor = store
            .run_query(&cfg, &QuerySpec::all_entries("s", 4))
            .unwrap();
        assert!(matches!(
            store.advance_cursor(&cfg, cursor),
            Err(StoreError::CursorExhausted)
        ));
    }

    #[test]
    fn store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let cfg = StoreConfig::default();
        {
            let mut store = SqliteStore::new(tmp.path()).unwrap();
            store
                .register_collection(&cfg, &SoupSpec::new("s"), &[IndexSpec::string("key")])
                .unwrap();
            store.upsert_entries(&cfg, "s", &[entry("a")]).unwrap();
        }
        let mut store = SqliteStore::new(tmp.path()).unwrap();
        assert!(store.collection_exists(&cfg, "s").unwrap());
        let cursor = store
            .run_query(&cfg, &QuerySpec::all_entries("s", 4))
            .unwrap();
        assert_eq!(cursor.current_page_entries.len(), 1);
    }
}

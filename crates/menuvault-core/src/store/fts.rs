//! FTS5-backed text indexes.
//!
//! A text index over a collection is an FTS5 virtual table kept in sync with
//! the `documents` table by triggers scoped to that collection.

use super::types::{IndexKey, IndexSpec};
use crate::Result;
use rusqlite::Connection;
use tracing::{debug, info};

const TOKENIZER: &str = "unicode61 remove_diacritics 1";

/// Text index setup for one validated `IndexSpec`. Only `IndexKey::Text`
/// fields become FTS5 columns.
pub(crate) struct TextIndex<'a> {
    spec: &'a IndexSpec,
    table_name: String,
}

impl<'a> TextIndex<'a> {
    /// The spec must have passed `IndexSpec::validate`.
    pub fn new(spec: &'a IndexSpec) -> Self {
        Self {
            table_name: format!("fts_{}_{}", spec.collection, spec.name()),
            spec,
        }
    }

    fn text_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.spec
            .fields
            .iter()
            .filter(|f| f.key == IndexKey::Text)
            .map(|f| f.field.as_str())
    }

    fn columns(&self) -> Vec<String> {
        self.text_fields().map(|f| f.replace('.', "_")).collect()
    }

    fn extracts(&self, row: &str) -> Vec<String> {
        self.text_fields()
            .map(|f| format!("json_extract({}.body, '$.{}')", row, f))
            .collect()
    }

    pub fn table_exists(&self, conn: &Connection) -> Result<bool> {
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [&self.table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create the table and triggers, then index the current documents.
    pub fn ensure_setup(&self, conn: &Connection) -> Result<()> {
        if !self.table_exists(conn)? {
            self.create_table(conn)?;
            self.populate(conn)?;
        }
        self.create_triggers(conn)?;
        Ok(())
    }

    fn create_table(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(doc_id UNINDEXED, {}, tokenize='{}')",
            self.table_name,
            self.columns().join(", "),
            TOKENIZER
        );
        conn.execute(&sql, [])?;
        info!("Created text index table {}", self.table_name);
        Ok(())
    }

    fn create_triggers(&self, conn: &Connection) -> Result<()> {
        let table = &self.table_name;
        let collection = &self.spec.collection;
        let columns = self.columns().join(", ");

        let insert_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_ai AFTER INSERT ON documents
             WHEN NEW.collection = '{collection}' BEGIN
                INSERT INTO {table} (doc_id, {columns}) VALUES (NEW.id, {values});
             END",
            values = self.extracts("NEW").join(", ")
        );
        conn.execute(&insert_trigger, [])?;

        let update_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_au AFTER UPDATE ON documents
             WHEN NEW.collection = '{collection}' BEGIN
                DELETE FROM {table} WHERE doc_id = OLD.id;
                INSERT INTO {table} (doc_id, {columns}) VALUES (NEW.id, {values});
             END",
            values = self.extracts("NEW").join(", ")
        );
        conn.execute(&update_trigger, [])?;

        let delete_trigger = format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_ad AFTER DELETE ON documents
             WHEN OLD.collection = '{collection}' BEGIN
                DELETE FROM {table} WHERE doc_id = OLD.id;
             END"
        );
        conn.execute(&delete_trigger, [])?;

        debug!("Created text index triggers for {}", table);
        Ok(())
    }

    fn populate(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!("DELETE FROM {};", self.table_name))?;
        let sql = format!(
            "INSERT INTO {} (doc_id, {}) SELECT d.id, {} FROM documents d WHERE d.collection = ?1",
            self.table_name,
            self.columns().join(", "),
            self.extracts("d").join(", ")
        );
        let rows = conn.execute(&sql, [&self.spec.collection])?;
        debug!("Indexed {} documents into {}", rows, self.table_name);
        Ok(())
    }

    /// Approximate bytes held by the index.
    pub fn size_bytes(&self, conn: &Connection) -> Result<u64> {
        let concat = self
            .columns()
            .iter()
            .map(|c| format!("COALESCE(length({}), 0)", c))
            .collect::<Vec<_>>()
            .join(" + ");
        let sql = format!(
            "SELECT COALESCE(SUM({} + length(doc_id)), 0) FROM {}",
            concat, self.table_name
        );
        let size: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(size.max(0) as u64)
    }
}

//! SQLite-backed JSON document store.
//!
//! Documents live in a single `documents` table keyed by `(collection, id)`
//! with a JSON body. Secondary indexes are partial expression indexes over
//! `json_extract`, text indexes are FTS5 tables, and every index definition
//! is recorded in `index_catalog` so repeated requests can be compared.

use super::fts::TextIndex;
use super::traits::DocumentStore;
use super::types::{
    validate_field_path, validate_identifier, Aggregation, CollectionStats, Document, Filter,
    GroupCount, IndexCreation, IndexKey, IndexSpec, SettingResult, ID_FIELD,
};
use crate::config::OptimizerConfig;
use crate::error::{MenuvaultError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Document store over one SQLite database file.
#[derive(Debug)]
pub struct SqliteDocumentStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Connect to an existing database.
    ///
    /// A missing or unreadable database is a `Connection` error.
    pub async fn connect(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(db_path.into(), false).await
    }

    /// Open a database, creating the file and schema if needed.
    pub async fn create(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(db_path.into(), true).await
    }

    /// Private in-memory store, used by tests and dry experiments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(connection_error)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn open_with(db_path: PathBuf, create: bool) -> Result<Self> {
        let path = db_path.clone();
        let conn = tokio::task::spawn_blocking(move || Self::open_connection(&path, create))
            .await
            .map_err(|e| MenuvaultError::Connection {
                message: format!("Connection task failed: {}", e),
                source: None,
            })??;

        info!("Connected to document store at {}", db_path.display());
        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn open_connection(path: &Path, create: bool) -> Result<Connection> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        if create {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| MenuvaultError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            MenuvaultError::Connection {
                message: format!("Failed to open {}: {}", path.display(), e),
                source: Some(e),
            }
        })?;

        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;
        Ok(conn)
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.busy_timeout(OptimizerConfig::BUSY_TIMEOUT)
            .map_err(connection_error)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )
        .map_err(connection_error)?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE TABLE IF NOT EXISTS index_catalog (
                collection TEXT NOT NULL,
                name TEXT NOT NULL,
                definition TEXT NOT NULL,
                ttl_field TEXT,
                ttl_seconds INTEGER,
                created_at TEXT NOT NULL,
                PRIMARY KEY (collection, name)
            );
            "#,
        )
        .map_err(connection_error)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    pub async fn close(self) -> Result<()> {
        let path = self.db_path;
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex
                    .into_inner()
                    .map_err(|_| MenuvaultError::database("Connection lock poisoned"))?;
                conn.close().map_err(|(_, e)| MenuvaultError::Database {
                    message: format!("Failed to close {}: {}", path.display(), e),
                    source: Some(e),
                })?;
                info!("Closed document store at {}", path.display());
            }
            Err(_) => {
                // A blocking task still holds a handle; it drops the connection when done.
                warn!("Document store {} still in use at close", path.display());
            }
        }
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| MenuvaultError::database("Failed to acquire connection lock"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| MenuvaultError::database(format!("Store task failed: {}", e)))?
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut params = vec![SqlValue::Text(collection)];
            let predicate = filter_sql(&filter, &mut params)?;
            let sql = format!(
                "SELECT id, body FROM documents WHERE collection = ? AND ({}) ORDER BY id",
                predicate
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, body)| {
                    let fields: Map<String, Value> = serde_json::from_str(&body)?;
                    Ok(Document::new(id, fields))
                })
                .collect()
        })
        .await
    }

    async fn distinct(&self, collection: &str, field: &str) -> Result<BTreeSet<String>> {
        let collection = collection.to_string();
        let field = field.to_string();
        self.with_conn(move |conn| {
            let expr = field_expr(&field)?;
            let sql = format!(
                "SELECT DISTINCT {expr} FROM documents WHERE collection = ?1 AND {expr} IS NOT NULL"
            );
            let mut stmt = conn.prepare(&sql)?;
            let values = stmt
                .query_map([&collection], |row| row.get::<_, SqlValue>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(values.into_iter().filter_map(sql_to_key_string).collect())
        })
        .await
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<()> {
        validate_identifier("collection", collection)?;
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            let now = now_string();
            let body = serde_json::to_string(&document.fields)?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
                params![collection, now],
            )?;
            tx.execute(
                "INSERT INTO documents (collection, id, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET
                     body = excluded.body,
                     updated_at = excluded.updated_at",
                params![collection, document.id, body, now],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn update_fields(
        &self,
        collection: &str,
        id: &str,
        set: Map<String, Value>,
    ) -> Result<bool> {
        let collection = collection.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(body) = body else {
                return Ok(false);
            };

            let mut fields: Map<String, Value> = serde_json::from_str(&body)?;
            for (key, value) in set {
                fields.insert(key, value);
            }

            tx.execute(
                "UPDATE documents SET body = ?1, updated_at = ?2 WHERE collection = ?3 AND id = ?4",
                params![serde_json::to_string(&fields)?, now_string(), collection, id],
            )?;
            tx.commit()?;
            debug!("Updated {}/{}", collection, id);
            Ok(true)
        })
        .await
    }

    async fn aggregate(
        &self,
        collection: &str,
        aggregation: &Aggregation,
    ) -> Result<Vec<GroupCount>> {
        let collection = collection.to_string();
        let aggregation = aggregation.clone();
        self.with_conn(move |conn| match aggregation {
            Aggregation::GroupCount { group_by, limit } => {
                let expr = field_expr(&group_by)?;
                let sql = format!(
                    "SELECT {expr} AS group_key, COUNT(*) AS group_count FROM documents
                     WHERE collection = ?1
                     GROUP BY group_key
                     ORDER BY group_count DESC, group_key
                     LIMIT ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![collection, limit as i64], |row| {
                        Ok(GroupCount {
                            key: sql_to_json(row.get::<_, SqlValue>(0)?),
                            count: row.get::<_, i64>(1)?.max(0) as u64,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            }
        })
        .await
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexCreation> {
        spec.validate()?;
        let spec = spec.clone();
        self.with_conn(move |conn| {
            let definition = serde_json::to_string(&spec)?;

            if let Some(existing) = load_definition(conn, &spec.collection, spec.name())? {
                if existing == spec {
                    debug!("Index {} on {} already exists", spec.name(), spec.collection);
                    return Ok(IndexCreation::AlreadyExists);
                }
                return Err(index_error(
                    &spec,
                    "an index with this name already exists with a different definition",
                ));
            }

            let now = now_string();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
                params![spec.collection, now],
            )?;

            let built = if spec.is_text() {
                TextIndex::new(&spec).ensure_setup(&tx)
            } else {
                tx.execute(&expression_index_sql(&spec), [])
                    .map(|_| ())
                    .map_err(MenuvaultError::from)
            };
            built.map_err(|e| index_error(&spec, &e.to_string()))?;

            let (ttl_field, ttl_seconds) = match spec.options.ttl_seconds {
                Some(seconds) => (
                    spec.fields.first().map(|f| f.field.clone()),
                    Some(seconds as i64),
                ),
                None => (None, None),
            };
            tx.execute(
                "INSERT INTO index_catalog
                     (collection, name, definition, ttl_field, ttl_seconds, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    spec.collection,
                    spec.name(),
                    definition,
                    ttl_field,
                    ttl_seconds,
                    now
                ],
            )?;
            tx.commit()?;

            info!("Created index {} on {}", spec.name(), spec.collection);
            Ok(IndexCreation::Created)
        })
        .await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM collections WHERE name = ?1",
                [&collection],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats> {
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            let (count, storage_size, primary_size): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(length(body)), 0), COALESCE(SUM(length(id) + 8), 0)
                 FROM documents WHERE collection = ?1",
                [&collection],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let definitions = load_definitions(conn, &collection)?;
            let mut total_index_size = primary_size.max(0) as u64;
            for spec in &definitions {
                total_index_size += index_size(conn, spec)?;
            }

            let count = count.max(0) as u64;
            let storage_size = storage_size.max(0) as u64;
            Ok(CollectionStats {
                name: collection,
                count,
                avg_obj_size: if count == 0 {
                    0.0
                } else {
                    storage_size as f64 / count as f64
                },
                storage_size,
                // The primary key index always exists.
                index_count: 1 + definitions.len() as u64,
                total_index_size,
            })
        })
        .await
    }

    /// SQLite has no background expiry monitor, so expiry runs on demand.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let now = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        self.with_conn(move |conn| {
            let ttl_rows: Vec<(String, String, i64)> = {
                let mut stmt = conn.prepare(
                    "SELECT collection, ttl_field, ttl_seconds FROM index_catalog
                     WHERE ttl_field IS NOT NULL AND ttl_seconds IS NOT NULL",
                )?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };

            let mut removed = 0u64;
            for (collection, field, ttl_seconds) in ttl_rows {
                let expr = field_expr(&field)?;
                let sql = format!(
                    "DELETE FROM documents WHERE collection = ?1
                     AND {expr} IS NOT NULL
                     AND julianday({expr}) + (?2 / 86400.0) <= julianday(?3)"
                );
                let deleted = conn.execute(&sql, params![collection, ttl_seconds, now])?;
                if deleted > 0 {
                    debug!("Expired {} documents from {}", deleted, collection);
                }
                removed += deleted as u64;
            }
            Ok(removed)
        })
        .await
    }

    async fn apply_settings(&self) -> Result<Vec<SettingResult>> {
        self.with_conn(|conn| {
            let mut results = Vec::new();

            let journal = conn.query_row("PRAGMA journal_mode=WAL", [], |row| {
                row.get::<_, String>(0)
            });
            results.push(setting_result("journal_mode", journal));

            let steps: [(&str, &str, &str); 4] = [
                ("synchronous", "PRAGMA synchronous=NORMAL", "normal"),
                ("analysis_limit", "PRAGMA analysis_limit=1000", "1000"),
                ("analyze", "ANALYZE", "statistics refreshed"),
                ("optimize", "PRAGMA optimize", "planner hints refreshed"),
            ];
            for (name, sql, value) in steps {
                let outcome = conn.execute_batch(sql).map(|_| value.to_string());
                results.push(setting_result(name, outcome));
            }

            Ok(results)
        })
        .await
    }
}

fn setting_result(name: &str, outcome: rusqlite::Result<String>) -> SettingResult {
    match outcome {
        Ok(value) => SettingResult {
            name: name.to_string(),
            value,
            applied: true,
            error: None,
        },
        Err(e) => {
            warn!("Setting {} not applied: {}", name, e);
            SettingResult {
                name: name.to_string(),
                value: String::new(),
                applied: false,
                error: Some(e.to_string()),
            }
        }
    }
}

fn connection_error(err: rusqlite::Error) -> MenuvaultError {
    MenuvaultError::Connection {
        message: err.to_string(),
        source: Some(err),
    }
}

fn index_error(spec: &IndexSpec, message: &str) -> MenuvaultError {
    MenuvaultError::IndexCreation {
        collection: spec.collection.clone(),
        name: spec.name().to_string(),
        message: message.to_string(),
    }
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// SQL expression reading `field` from a document row.
fn field_expr(field: &str) -> Result<String> {
    validate_field_path(field)?;
    if field == ID_FIELD {
        Ok("id".to_string())
    } else {
        Ok(format!("json_extract(body, '$.{}')", field))
    }
}

fn filter_sql(filter: &Filter, params: &mut Vec<SqlValue>) -> Result<String> {
    match filter {
        Filter::All => Ok("1".to_string()),
        Filter::Eq(field, value) => {
            let expr = field_expr(field)?;
            match json_to_sql(value) {
                Some(param) => {
                    params.push(param);
                    Ok(format!("{} = ?", expr))
                }
                None => Ok(format!("{} IS NULL", expr)),
            }
        }
        Filter::NonEmpty(field) => {
            if field == ID_FIELD {
                return Ok("1".to_string());
            }
            validate_field_path(field)?;
            let path = format!("'$.{}'", field);
            Ok(format!(
                "(json_type(body, {p}) IS NOT NULL AND CASE json_type(body, {p})
                    WHEN 'null' THEN 0
                    WHEN 'text' THEN json_extract(body, {p}) <> ''
                    WHEN 'array' THEN json_array_length(body, {p}) > 0
                    ELSE 1 END)",
                p = path
            ))
        }
        Filter::AnyOf(filters) => {
            if filters.is_empty() {
                return Ok("0".to_string());
            }
            let parts = filters
                .iter()
                .map(|f| filter_sql(f, params))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", parts.join(" OR ")))
        }
    }
}

fn json_to_sql(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        }),
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        other => Some(SqlValue::Text(other.to_string())),
    }
}

fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Value::from(f),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(hex::encode(b)),
    }
}

fn sql_to_key_string(value: SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Integer(i) => Some(i.to_string()),
        SqlValue::Real(f) => Some(f.to_string()),
        SqlValue::Text(s) => Some(s),
        SqlValue::Blob(b) => Some(hex::encode(b)),
    }
}

/// Indexed expressions for one field. Geospatial keys index both coordinates.
fn key_expressions(field: &str, key: IndexKey) -> Vec<String> {
    match key {
        IndexKey::Geo2dsphere => vec![
            format!("json_extract(body, '$.{}.coordinates[0]')", field),
            format!("json_extract(body, '$.{}.coordinates[1]')", field),
        ],
        _ => vec![format!("json_extract(body, '$.{}')", field)],
    }
}

fn expression_index_sql(spec: &IndexSpec) -> String {
    let mut columns = Vec::new();
    let mut sparse_conditions = Vec::new();
    for field in &spec.fields {
        for expr in key_expressions(&field.field, field.key) {
            if spec.options.sparse {
                sparse_conditions.push(format!("{} IS NOT NULL", expr));
            }
            columns.push(match field.key {
                IndexKey::Descending => format!("{} DESC", expr),
                _ => expr,
            });
        }
    }

    let mut predicate = format!("collection = '{}'", spec.collection);
    for condition in sparse_conditions {
        predicate.push_str(" AND ");
        predicate.push_str(&condition);
    }

    format!(
        "CREATE {unique}INDEX IF NOT EXISTS ix_{collection}_{name} ON documents ({columns}) WHERE {predicate}",
        unique = if spec.options.unique { "UNIQUE " } else { "" },
        collection = spec.collection,
        name = spec.name(),
        columns = columns.join(", "),
    )
}

fn index_size(conn: &Connection, spec: &IndexSpec) -> Result<u64> {
    if spec.is_text() {
        let text = TextIndex::new(spec);
        if !text.table_exists(conn)? {
            return Ok(0);
        }
        return text.size_bytes(conn);
    }

    let key_bytes = spec
        .fields
        .iter()
        .flat_map(|f| key_expressions(&f.field, f.key))
        .map(|expr| format!("COALESCE(length(CAST({} AS TEXT)), 0)", expr))
        .collect::<Vec<_>>()
        .join(" + ");
    let sql = format!(
        "SELECT COALESCE(SUM({} + 8), 0) FROM documents WHERE collection = ?1",
        key_bytes
    );
    let size: i64 = conn.query_row(&sql, [&spec.collection], |row| row.get(0))?;
    Ok(size.max(0) as u64)
}

fn load_definition(conn: &Connection, collection: &str, name: &str) -> Result<Option<IndexSpec>> {
    let definition: Option<String> = conn
        .query_row(
            "SELECT definition FROM index_catalog WHERE collection = ?1 AND name = ?2",
            params![collection, name],
            |row| row.get(0),
        )
        .optional()?;
    match definition {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn load_definitions(conn: &Connection, collection: &str) -> Result<Vec<IndexSpec>> {
    let mut stmt =
        conn.prepare("SELECT definition FROM index_catalog WHERE collection = ?1 ORDER BY name")?;
    let rows = stmt
        .query_map([collection], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.iter()
        .map(|json| serde_json::from_str(json).map_err(MenuvaultError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> SqliteDocumentStore {
        SqliteDocumentStore::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_connect_missing_database_is_connection_error() {
        let temp = TempDir::new().unwrap();
        let result = SqliteDocumentStore::connect(temp.path().join("absent.db")).await;
        assert!(matches!(result, Err(MenuvaultError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_create_then_connect() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data").join("menuvault.db");
        let store = SqliteDocumentStore::create(&path).await.unwrap();
        store
            .insert("menus", Document::from_json("m1", json!({"name": "Lunch"})))
            .await
            .unwrap();
        store.close().await.unwrap();

        let store = SqliteDocumentStore::connect(&path).await.unwrap();
        assert_eq!(store.find("menus", &Filter::All).await.unwrap().len(), 1);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_find_non_empty_filter() {
        let store = store();
        store
            .insert("restaurants", Document::from_json("a", json!({"logo": "/uploads/a.png"})))
            .await
            .unwrap();
        store
            .insert("restaurants", Document::from_json("b", json!({"logo": "", "gallery": []})))
            .await
            .unwrap();
        store
            .insert("restaurants", Document::from_json("c", json!({"logo": null, "gallery": ["/x.png"]})))
            .await
            .unwrap();
        store
            .insert("restaurants", Document::from_json("d", json!({"name": "plain"})))
            .await
            .unwrap();

        let found = store
            .find("restaurants", &Filter::any_non_empty(["logo", "gallery"]))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_eq_filter_and_distinct() {
        let store = store();
        for (id, restaurant) in [("m1", "r1"), ("m2", "r1"), ("m3", "r2")] {
            store
                .insert(
                    "menus",
                    Document::from_json(id, json!({"restaurantId": restaurant, "isActive": true})),
                )
                .await
                .unwrap();
        }

        let r1 = store
            .find("menus", &Filter::eq("restaurantId", "r1"))
            .await
            .unwrap();
        assert_eq!(r1.len(), 2);
        let active = store
            .find("menus", &Filter::eq("isActive", true))
            .await
            .unwrap();
        assert_eq!(active.len(), 3);

        let restaurants = store.distinct("menus", "restaurantId").await.unwrap();
        assert_eq!(restaurants.into_iter().collect::<Vec<_>>(), vec!["r1", "r2"]);
        let ids = store.distinct("menus", "_id").await.unwrap();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_update_fields_merges() {
        let store = store();
        store
            .insert("menus", Document::from_json("m1", json!({"name": "Dinner", "image": "/a.jpg"})))
            .await
            .unwrap();

        let mut set = Map::new();
        set.insert("image".into(), json!({"url": "https://res.cloudinary.com/x.jpg"}));
        assert!(store.update_fields("menus", "m1", set.clone()).await.unwrap());
        assert!(!store.update_fields("menus", "missing", set).await.unwrap());

        let doc = &store.find("menus", &Filter::All).await.unwrap()[0];
        assert_eq!(doc.get_str("name"), Some("Dinner"));
        assert_eq!(doc.get("image").unwrap()["url"], json!("https://res.cloudinary.com/x.jpg"));
    }

    #[tokio::test]
    async fn test_group_count_aggregation() {
        let store = store();
        for (id, category) in [("i1", "pizza"), ("i2", "pizza"), ("i3", "salad"), ("i4", "pizza")] {
            store
                .insert("menuitems", Document::from_json(id, json!({"category": category})))
                .await
                .unwrap();
        }
        let rows = store
            .aggregate(
                "menuitems",
                &Aggregation::GroupCount {
                    group_by: "category".into(),
                    limit: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(rows, vec![GroupCount { key: json!("pizza"), count: 3 }]);
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let store = store();
        let spec = IndexSpec::new("users", "users_email").asc("email").unique();
        assert_eq!(store.create_index(&spec).await.unwrap(), IndexCreation::Created);
        assert_eq!(
            store.create_index(&spec).await.unwrap(),
            IndexCreation::AlreadyExists
        );

        let conflicting = IndexSpec::new("users", "users_email").asc("email");
        let err = store.create_index(&conflicting).await.unwrap_err();
        assert!(matches!(err, MenuvaultError::IndexCreation { .. }));
    }

    #[tokio::test]
    async fn test_unique_index_enforced() {
        let store = store();
        store
            .create_index(&IndexSpec::new("users", "users_email").asc("email").unique())
            .await
            .unwrap();
        store
            .insert("users", Document::from_json("u1", json!({"email": "a@b.co"})))
            .await
            .unwrap();
        let dup = store
            .insert("users", Document::from_json("u2", json!({"email": "a@b.co"})))
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_text_index_tracks_documents() {
        let store = store();
        store
            .insert("menuitems", Document::from_json("i1", json!({"name": "Margherita Pizza"})))
            .await
            .unwrap();
        store
            .create_index(&IndexSpec::new("menuitems", "items_text").text("name").text("description"))
            .await
            .unwrap();
        store
            .insert("menuitems", Document::from_json("i2", json!({"name": "Caesar", "description": "crisp salad"})))
            .await
            .unwrap();

        let matches = |query: &'static str| {
            store.with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT doc_id FROM fts_menuitems_items_text WHERE fts_menuitems_items_text MATCH ?1",
                )?;
                let ids = stmt
                    .query_map([query], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(ids)
            })
        };
        assert_eq!(matches("pizza").await.unwrap(), vec!["i1"]);
        assert_eq!(matches("salad").await.unwrap(), vec!["i2"]);
    }

    #[tokio::test]
    async fn test_purge_expired_documents() {
        let store = store();
        store
            .insert("sessions", Document::from_json("old", json!({"expiresAt": "2020-01-01T00:00:00Z"})))
            .await
            .unwrap();
        store
            .insert("sessions", Document::from_json("new", json!({"expiresAt": "2999-01-01T00:00:00Z"})))
            .await
            .unwrap();
        store
            .insert("resets", Document::from_json("r", json!({"createdAt": "2020-01-01T00:00:00Z"})))
            .await
            .unwrap();
        store
            .create_index(&IndexSpec::new("sessions", "sessions_ttl").asc("expiresAt").ttl(0))
            .await
            .unwrap();
        store
            .create_index(&IndexSpec::new("resets", "resets_ttl").asc("createdAt").ttl(3600))
            .await
            .unwrap();

        let removed = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 2);
        let left = store.distinct("sessions", "_id").await.unwrap();
        assert_eq!(left.into_iter().collect::<Vec<_>>(), vec!["new"]);
    }

    #[tokio::test]
    async fn test_collection_stats() {
        let store = store();
        store
            .insert("menus", Document::from_json("m1", json!({"name": "Brunch"})))
            .await
            .unwrap();
        store
            .create_index(&IndexSpec::new("menus", "menus_name").asc("name"))
            .await
            .unwrap();

        let stats = store.collection_stats("menus").await.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.index_count, 2);
        assert!(stats.storage_size > 0);
        assert!(stats.total_index_size > 0);
        assert_eq!(stats.avg_obj_size, stats.storage_size as f64);

        let empty = store.collection_stats("nothing").await.unwrap();
        assert_eq!(empty.count, 0);
        assert_eq!(empty.avg_obj_size, 0.0);
    }

    #[tokio::test]
    async fn test_collection_probe_does_not_create() {
        let store = store();
        assert!(!store.collection_exists("sessions").await.unwrap());
        let _ = store.find("sessions", &Filter::All).await.unwrap();
        assert!(!store.collection_exists("sessions").await.unwrap());
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_settings_reports_each_step() {
        let store = store();
        let results = store.apply_settings().await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.applied));
    }
}

//! SQLite document store - schema and connection management
//!
//! Every collection lives in the single `documents` table; bodies are stored
//! as JSON text and queried with `json_extract`. Declared index fields become
//! expression indices. Writes go straight to SQLite, so an acknowledged insert
//! survives a crash.

use super::store::{validate_identifier, Document, DocumentStore, Filter};
use crate::error::StoreError;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use std::path::Path;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and initialize the schema
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, id)",
            [],
        )?;

        Ok(())
    }

    /// Scalar clauses are pushed down to SQL; the caller re-checks every row
    /// with `Filter::matches` so both stores agree on type strictness.
    fn build_query(collection: &str, filter: &Filter) -> Result<(String, Vec<SqlValue>), StoreError> {
        let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?1");
        let mut args = vec![SqlValue::Text(collection.to_string())];

        for (field, expected) in filter.clauses() {
            validate_identifier(field)?;
            let bound = match expected {
                Value::Null => {
                    sql.push_str(&format!(" AND json_extract(body, '$.{}') IS NULL", field));
                    continue;
                }
                Value::Bool(b) => SqlValue::Integer(*b as i64),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => SqlValue::Integer(i),
                    None => SqlValue::Real(n.as_f64().unwrap_or_default()),
                },
                Value::String(s) => SqlValue::Text(s.clone()),
                Value::Array(_) | Value::Object(_) => continue,
            };
            args.push(bound);
            sql.push_str(&format!(
                " AND json_extract(body, '$.{}') = ?{}",
                field,
                args.len()
            ));
        }

        sql.push_str(" ORDER BY id");
        Ok((sql, args))
    }

    fn query(conn: &Connection, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let (sql, args) = Self::build_query(collection, filter)?;
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut docs = Vec::with_capacity(rows.len());
        for (id, raw) in rows {
            let body: Value = serde_json::from_str(&raw)?;
            if filter.matches(&body) {
                docs.push(Document { id, body });
            }
        }
        Ok(docs)
    }
}

impl DocumentStore for SqliteStore {
    fn ensure_collection(&self, name: &str, indices: &[&str]) -> Result<(), StoreError> {
        validate_identifier(name)?;
        let conn = self.conn.lock();
        for field in indices {
            validate_identifier(field)?;
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON documents(collection, json_extract(body, '$.{}'))",
                    name, field, field
                ),
                [],
            )?;
        }
        Ok(())
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn.lock();
        Self::query(&conn, collection, filter)
    }

    fn insert(&self, collection: &str, body: Value) -> Result<Document, StoreError> {
        validate_identifier(collection)?;
        if !body.is_object() {
            return Err(StoreError::NotAnObject(collection.to_string()));
        }
        let raw = serde_json::to_string(&body)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (collection, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![collection, raw, now],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Document { id, body })
    }

    fn update(&self, collection: &str, doc: &Document) -> Result<(), StoreError> {
        if !doc.body.is_object() {
            return Err(StoreError::NotAnObject(collection.to_string()));
        }
        let raw = serde_json::to_string(&doc.body)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE documents SET body = ?1, updated_at = ?2 WHERE id = ?3 AND collection = ?4",
            params![raw, now, doc.id, collection],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: doc.id,
            });
        }
        Ok(())
    }

    fn remove(&self, collection: &str, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM documents WHERE id = ?1 AND collection = ?2",
            params![id, collection],
        )?;
        Ok(changed > 0)
    }

    fn modify(
        &self,
        collection: &str,
        filter: &Filter,
        seed: Option<Value>,
        change: &mut dyn FnMut(&mut Value) -> Result<(), StoreError>,
    ) -> Result<Option<Document>, StoreError> {
        validate_identifier(collection)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing = Self::query(&tx, collection, filter)?.into_iter().next();
        let mut doc = match (existing, seed) {
            (Some(doc), _) => doc,
            (None, Some(body)) => Document { id: 0, body },
            (None, None) => return Ok(None),
        };

        change(&mut doc.body)?;
        if !doc.body.is_object() {
            return Err(StoreError::NotAnObject(collection.to_string()));
        }
        let raw = serde_json::to_string(&doc.body)?;
        let now = Utc::now().to_rfc3339();

        if doc.id == 0 {
            tx.execute(
                "INSERT INTO documents (collection, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![collection, raw, now],
            )?;
            doc.id = tx.last_insert_rowid();
        } else {
            tx.execute(
                "UPDATE documents SET body = ?1, updated_at = ?2 WHERE id = ?3",
                params![raw, now, doc.id],
            )?;
        }
        tx.commit()?;
        Ok(Some(doc))
    }
}

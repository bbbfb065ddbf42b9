//! SQLite-backed vector engine using the `sqlite-vec` extension.
//!
//! All collections share one `chunks` table keyed by `(collection, key)`;
//! embeddings are stored as JSON float arrays and ranked with
//! `vec_distance_cosine`. Zero vectors are stored as empty strings so the
//! similarity queries can exclude signal-free records in SQL.

use async_trait::async_trait;
use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;
use tokio_rusqlite::types::Value;
use tokio_rusqlite::{Connection, OptionalExtension, ffi, params_from_iter};

use crate::embeddings::is_zero_vector;
use crate::model::chunk::{Chunk, ChunkKind};
use crate::store::{ChunkFilter, ScoredChunk, VectorEngine, VectorField, VectorRecord};
use crate::types::{ChunkError, Result};

#[derive(Clone)]
pub struct SqliteVectorEngine {
    conn: Connection,
}

impl SqliteVectorEngine {
    /// Opens (or creates) the database at `path` and prepares the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| ChunkError::Storage(err.to_string()))?;
        Self::init(conn).await
    }

    /// Fresh in-memory database, handy for tests.
    pub async fn open_in_memory() -> Result<Self> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| ChunkError::Storage(err.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        // Probe the extension before touching the schema; a connection
        // without sqlite-vec loaded must never serve vector queries.
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                
        })
        .await
        .map_err(|err| {
            ChunkError::NotInitialized(format!("sqlite-vec extension unavailable: {err}"))
        })?;
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS collections (
                     name TEXT PRIMARY KEY
                 );
                 CREATE TABLE IF NOT EXISTS chunks (
                     collection TEXT NOT NULL,
                     key TEXT NOT NULL,
                     doc_id TEXT NOT NULL,
                     parent_key TEXT NOT NULL,
                     level INTEGER NOT NULL,
                     idx INTEGER NOT NULL,
                     title TEXT NOT NULL,
                     body TEXT NOT NULL,
                     summary TEXT NOT NULL,
                     has_child_node INTEGER NOT NULL,
                     kind TEXT NOT NULL,
                     text_embedding TEXT NOT NULL,
                     summary_embedding TEXT NOT NULL,
                     PRIMARY KEY (collection, key)
                 );
                 CREATE INDEX IF NOT EXISTS chunks_parent
                     ON chunks (collection, parent_key);",
            )
            ?;
            Ok(())
        })
        .await
        .map_err(|err: tokio_rusqlite::Error| ChunkError::Storage(err.to_string()))?;
        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<()> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<std::result::Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!("failed to register sqlite-vec extension (code {rc})"))
                } else {
                    Ok(())
                }
            };
            if let Ok(mut guard) = INIT_RESULT.lock() {
                *guard = Some(result);
            }
        });

        INIT_RESULT
            .lock()
            .map_err(|_| ChunkError::Storage("sqlite-vec init mutex poisoned".into()))?
            .clone()
            .unwrap_or(Ok(()))
            .map_err(ChunkError::Storage)
    }
}

/// Columns selected for every chunk read, in row-mapping order.
const CHUNK_COLUMNS: &str =
    "key, doc_id, parent_key, level, idx, title, body, summary, has_child_node, kind";

macro_rules! chunk_from_row {
    ($row:expr) => {
        Chunk {
            key: $row.get(0)?,
            doc_id: $row.get(1)?,
            parent_key: $row.get(2)?,
            level: $row.get::<_, i64>(3)? as u32,
            index: $row.get::<_, i64>(4)? as u32,
            title: $row.get(5)?,
            text: $row.get(6)?,
            summary: $row.get(7)?,
            has_child_node: $row.get::<_, i64>(8)? != 0,
            kind: ChunkKind::parse(&$row.get::<_, String>(9)?).unwrap_or(ChunkKind::Structural),
        }
    };
}

/// Builds the conjunctive filter tail (starting with `AND`) and its params.
fn filter_sql(filter: &ChunkFilter) -> (String, Vec<Value>) {
    let mut sql = String::new();
    let mut params = Vec::new();
    if let Some(kind) = filter.kind {
        sql.push_str(" AND kind = ?");
        params.push(Value::Text(kind.as_str().to_string()));
    }
    if let Some(level) = filter.level {
        sql.push_str(" AND level = ?");
        params.push(Value::Integer(i64::from(level)));
    }
    if let Some(parent_key) = &filter.parent_key {
        sql.push_str(" AND parent_key = ?");
        params.push(Value::Text(parent_key.clone()));
    }
    if let Some(key) = &filter.key {
        sql.push_str(" AND key = ?");
        params.push(Value::Text(key.clone()));
    }
    (sql, params)
}

fn encode_embedding(vector: &[f32]) -> Result<String> {
    if is_zero_vector(vector) {
        return Ok(String::new());
    }
    Ok(serde_json::to_string(vector)?)
}

fn as_limit(limit: usize) -> i64 {
    limit.min(i64::MAX as usize) as i64
}

#[async_trait]
impl VectorEngine for SqliteVectorEngine {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        let collection = collection.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO collections (name) VALUES (?)",
                    [&collection],
                )
                ?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| ChunkError::Storage(err.to_string()))
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let collection = collection.to_string();
        self.conn
            .call(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT 1 FROM collections WHERE name = ?",
                        [&collection],
                        |_| Ok(()),
                    )
                    .optional()
                    ?;
                Ok(found.is_some())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| ChunkError::Storage(err.to_string()))
    }

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let collection = collection.to_string();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let text_embedding = encode_embedding(&record.text_embedding)?;
            let summary_embedding = encode_embedding(&record.summary_embedding)?;
            rows.push((record.chunk, text_embedding, summary_embedding));
        }
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx
                        .prepare(
                            "INSERT OR REPLACE INTO chunks (
                                 collection, key, doc_id, parent_key, level, idx,
                                 title, body, summary, has_child_node, kind,
                                 text_embedding, summary_embedding
                             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        )
                        ?;
                    for (chunk, text_embedding, summary_embedding) in &rows {
                        stmt.execute(params_from_iter([
                            Value::Text(collection.clone()),
                            Value::Text(chunk.key.clone()),
                            Value::Text(chunk.doc_id.clone()),
                            Value::Text(chunk.parent_key.clone()),
                            Value::Integer(i64::from(chunk.level)),
                            Value::Integer(i64::from(chunk.index)),
                            Value::Text(chunk.title.clone()),
                            Value::Text(chunk.text.clone()),
                            Value::Text(chunk.summary.clone()),
                            Value::Integer(i64::from(chunk.has_child_node)),
                            Value::Text(chunk.kind.as_str().to_string()),
                            Value::Text(text_embedding.clone()),
                            Value::Text(summary_embedding.clone()),
                        ]))
                        ?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| ChunkError::Storage(err.to_string()))
    }

    async fn get(
        &self,
        collection: &str,
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let (filter_tail, filter_params) = filter_sql(filter);
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE collection = ?{filter_tail} LIMIT ?"
        );
        let mut params = vec![Value::Text(collection.to_string())];
        params.extend(filter_params);
        params.push(Value::Integer(as_limit(limit)));

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(params), |row| Ok(chunk_from_row!(row)))
                    ?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| ChunkError::Storage(err.to_string()))
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        field: VectorField,
        filter: &ChunkFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let column = match field {
            VectorField::Text => "text_embedding",
            VectorField::Summary => "summary_embedding",
        };
        let (filter_tail, filter_params) = filter_sql(filter);
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, \
             vec_distance_cosine(vec_f32({column}), vec_f32(?)) AS distance \
             FROM chunks \
             WHERE collection = ? AND {column} != ''{filter_tail} \
             ORDER BY distance ASC, idx ASC LIMIT ?"
        );
        let query_json = serde_json::to_string(vector)?;
        let mut params = vec![Value::Text(query_json), Value::Text(collection.to_string())];
        params.extend(filter_params);
        params.push(Value::Integer(as_limit(top_k)));

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(params), |row| {
                        let chunk = chunk_from_row!(row);
                        let distance: f64 = row.get(10)?;
                        Ok(ScoredChunk {
                            chunk,
                            score: 1.0 - distance as f32,
                        })
                    })
                    ?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| ChunkError::Storage(err.to_string()))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let collection = collection.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM chunks WHERE collection = ?", [&collection])
                    ?;
                conn.execute("DELETE FROM collections WHERE name = ?", [&collection])
                    ?;
                Ok(())
            })
            .await
            .map_err(|err: tokio_rusqlite::Error| ChunkError::Storage(err.to_string()))
    }
}

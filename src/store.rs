use anyhow::{Context, Result, anyhow};
use rand::{Rng, distributions::Alphanumeric};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::Millis;

/// Length of generated document ids.
const ID_LEN: usize = 20;

pub type WatchToken = u64;

type WatchCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

struct Watcher {
    token: WatchToken,
    collection: String,
    doc_id: String,
    callback: WatchCallback,
}

/// Document store client: collections of JSON documents keyed by opaque
/// string ids, with point reads/writes, equality queries, point
/// subscriptions, and an atomic multi-point delete.
///
/// Writes notify subscribers of the touched document after commit, on the
/// writer's thread.
pub struct Store {
    conn: Mutex<Connection>,
    watchers: Mutex<Vec<Watcher>>,
    next_token: AtomicU64,
}

/// Equality-predicate query with optional descending order and limit.
#[derive(Debug, Default, Clone)]
pub struct Query {
    filters: Vec<(String, Value)>,
    order_desc: Option<String>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_desc(mut self, field: &str) -> Self {
        self.order_desc = Some(field.to_string());
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

impl Store {
    /// Open the store at its default location.
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            watchers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        })
    }

    fn default_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobboard") {
            Ok(proj_dirs.data_dir().join("jobboard.db"))
        } else {
            Ok(PathBuf::from("jobboard.db"))
        }
    }

    /// Server-assigned timestamp, milliseconds since the epoch.
    pub fn server_now() -> Millis {
        chrono::Utc::now().timestamp_millis()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store connection poisoned")
    }

    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).with_context(|| {
                format!("Corrupt document {collection}/{id}")
            })?)),
            None => Ok(None),
        }
    }

    /// Full overwrite; creates the document if absent.
    pub fn set(&self, collection: &str, id: &str, doc: &Value) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO documents (collection, id, data) VALUES (?1, ?2, ?3)",
            params![collection, id, doc.to_string()],
        )?;
        self.notify(collection, id, Some(doc.clone()));
        Ok(())
    }

    /// Shallow-merge `patch` into an existing document. Errors if the
    /// document is absent.
    pub fn merge(&self, collection: &str, id: &str, patch: &Value) -> Result<()> {
        let merged = {
            let conn = self.conn();
            let raw: Option<String> = conn
                .query_row(
                    "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;
            let raw = raw.ok_or_else(|| anyhow!("No document {collection}/{id}"))?;
            let mut doc: Value = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt document {collection}/{id}"))?;
            let obj = doc
                .as_object_mut()
                .ok_or_else(|| anyhow!("Document {collection}/{id} is not an object"))?;
            let patch_obj = patch
                .as_object()
                .ok_or_else(|| anyhow!("Merge patch must be an object"))?;
            for (key, value) in patch_obj {
                obj.insert(key.clone(), value.clone());
            }
            conn.execute(
                "UPDATE documents SET data = ?3 WHERE collection = ?1 AND id = ?2",
                params![collection, id, doc.to_string()],
            )?;
            doc
        };
        self.notify(collection, id, Some(merged));
        Ok(())
    }

    /// Insert with a generated id; returns the new id.
    pub fn add(&self, collection: &str, doc: &Value) -> Result<String> {
        let id = generate_id();
        self.set(collection, &id, doc)?;
        Ok(id)
    }

    pub fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        self.notify(collection, id, None);
        Ok(())
    }

    /// Delete several documents in one atomic commit.
    pub fn delete_many(&self, collection: &str, ids: &[String]) -> Result<()> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            for id in ids {
                tx.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                )?;
            }
            tx.commit()?;
        }
        for id in ids {
            self.notify(collection, id, None);
        }
        Ok(())
    }

    /// Run an equality query, returning `(id, document)` pairs.
    pub fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Value)>> {
        let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?1");
        let mut bound: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Text(collection.to_string())];
        for (field, value) in &query.filters {
            bound.push(to_sql_value(value)?);
            sql.push_str(&format!(
                " AND json_extract(data, '$.{}') = ?{}",
                field,
                bound.len()
            ));
        }
        if let Some(field) = &query.order_desc {
            sql.push_str(&format!(" ORDER BY json_extract(data, '$.{field}') DESC"));
        }
        if let Some(n) = query.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bound.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            let doc = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt document {collection}/{id}"))?;
            out.push((id, doc));
        }
        Ok(out)
    }

    /// Watch a single document. The callback fires after every committed
    /// write to it, with the new value (`None` once deleted), until
    /// [`Store::unsubscribe`] is called with the returned token.
    pub fn subscribe(
        &self,
        collection: &str,
        id: &str,
        callback: impl Fn(Option<Value>) + Send + Sync + 'static,
    ) -> WatchToken {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.watchers
            .lock()
            .expect("store watchers poisoned")
            .push(Watcher {
                token,
                collection: collection.to_string(),
                doc_id: id.to_string(),
                callback: Arc::new(callback),
            });
        token
    }

    pub fn unsubscribe(&self, token: WatchToken) {
        self.watchers
            .lock()
            .expect("store watchers poisoned")
            .retain(|w| w.token != token);
    }

    fn notify(&self, collection: &str, id: &str, value: Option<Value>) {
        let targets: Vec<WatchCallback> = self
            .watchers
            .lock()
            .expect("store watchers poisoned")
            .iter()
            .filter(|w| w.collection == collection && w.doc_id == id)
            .map(|w| Arc::clone(&w.callback))
            .collect();
        for callback in targets {
            callback(value.clone());
        }
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

fn to_sql_value(value: &Value) -> Result<rusqlite::types::Value> {
    match value {
        Value::String(s) => Ok(rusqlite::types::Value::Text(s.clone())),
        Value::Bool(b) => Ok(rusqlite::types::Value::Integer(*b as i64)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(rusqlite::types::Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(rusqlite::types::Value::Real(f))
            } else {
                Err(anyhow!("Unsupported numeric filter value: {n}"))
            }
        }
        other => Err(anyhow!("Unsupported filter value: {other}")),
    }
}

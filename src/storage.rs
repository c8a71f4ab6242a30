use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

/// Schema steps, applied in order. A step's version is its index plus one.
const MIGRATIONS: &[&str] = &[r#"
CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#];

/// Client-local key/value storage, the on-disk counterpart of a browser's
/// `localStorage`.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

/// One entry of a batch: `Some` writes the value, `None` deletes the key.
pub type Change<'a> = (&'a str, Option<&'a str>);

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = match opts.path {
            Some(path) => path,
            None => default_path().context("storage: resolve default path")?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("storage: set busy timeout")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("storage: open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(mut conn: Connection) -> Result<Self> {
        migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Closes the database. Fails while another clone of the store is alive.
    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("storage: read key {key}"))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.apply(&[(key, Some(value))])
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        delete_key(&conn, key).map(|removed| removed > 0)
    }

    #[cfg(test)]
    pub(crate) fn conn_for_tests(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Applies every change or none of them.
    pub fn apply(&self, changes: &[Change<'_>]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("storage: begin write")?;
        let now = Utc::now().timestamp();
        for (key, value) in changes {
            match value {
                Some(value) => write_key(&tx, key, value, now)?,
                None => {
                    delete_key(&tx, key)?;
                }
            }
        }
        tx.commit().context("storage: commit write")
    }
}

fn write_key(conn: &Connection, key: &str, value: &str, now: i64) -> Result<()> {
    if key.is_empty() {
        bail!("storage: key required");
    }
    conn.execute(
        r#"
INSERT INTO kv (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
        params![key, value, now],
    )
    .with_context(|| format!("storage: write key {key}"))?;
    Ok(())
}

fn delete_key(conn: &Connection, key: &str) -> Result<usize> {
    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
        .with_context(|| format!("storage: remove key {key}"))
}

/// Brings the schema up to the latest version. Each pending step and its
/// bookkeeping row commit together.
fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
);
"#,
    )
    .context("storage: create schema_migrations")?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .context("storage: read schema version")?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = idx as i64 + 1;
        if version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("storage: apply migration {version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().timestamp()],
        )?;
        tx.commit()?;
        tracing::debug!(version, "applied storage migration");
    }
    Ok(())
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("toxiq").join("state.db"))
}

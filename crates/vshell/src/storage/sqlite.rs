//! SQLite-backed storage provider.
//!
//! Every node is one row of a `nodes` table keyed by its absolute path, with
//! file content stored inline. Structural checks and the mutation they guard
//! run under the same connection lock.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{
    CleanupStats, NodeInfo, StorageError, StorageProvider, StorageResult, StorageStats, TEMP_DIR,
    now_millis,
};
use crate::path;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS nodes (
    path TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parent_path TEXT NOT NULL,
    is_dir INTEGER NOT NULL,
    size INTEGER,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,
    content TEXT
);
CREATE INDEX IF NOT EXISTS nodes_parent ON nodes (parent_path);";

const NODE_COLUMNS: &str = "name, parent_path, is_dir, size, created_at, modified_at";

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<NodeInfo> {
    Ok(NodeInfo {
        name: row.get(0)?,
        parent_path: row.get(1)?,
        is_dir: row.get(2)?,
        size: row.get::<_, Option<i64>>(3)?.map(|s| s.max(0) as u64),
        created_at: row.get::<_, i64>(4)?.max(0) as u64,
        modified_at: row.get::<_, i64>(5)?.max(0) as u64,
    })
}

fn lookup(conn: &Connection, path: &str) -> StorageResult<Option<NodeInfo>> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE path = ?1");
    Ok(conn.query_row(&sql, [path], node_from_row).optional()?)
}

/// Storage provider persisting the tree in a SQLite database.
#[derive(Debug)]
pub struct SqliteStorageProvider {
    conn: Mutex<Connection>,
    db_path: String,
}

impl SqliteStorageProvider {
    /// Open (or create) a database at `db_path`. `":memory:"` opens a
    /// private in-memory database.
    pub fn open(db_path: impl Into<String>) -> StorageResult<Self> {
        let db_path = db_path.into();
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&db_path)?
        };
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> StorageResult<Self> {
        Self::open(":memory:")
    }

    /// Location of the backing database.
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl StorageProvider for SqliteStorageProvider {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn initialize(&self) -> StorageResult<bool> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        let root = NodeInfo::root();
        conn.execute(
            "INSERT OR IGNORE INTO nodes
                (path, name, parent_path, is_dir, size, created_at, modified_at, content)
             VALUES ('/', '', '', 1, NULL, ?1, ?2, NULL)",
            params![root.created_at as i64, root.modified_at as i64],
        )?;
        tracing::debug!(db_path = %self.db_path, "sqlite: initialized");
        Ok(true)
    }

    fn get_node_info(&self, path: &str) -> StorageResult<Option<NodeInfo>> {
        let conn = self.conn()?;
        lookup(&conn, &path::normalize(path))
    }

    fn create_node(&self, node: &NodeInfo) -> StorageResult<bool> {
        if node.name.is_empty() || node.name.contains('/') || node.name == "." || node.name == ".." {
            return Ok(false);
        }
        let parent_path = path::normalize(&node.parent_path);
        let full = path::join(&parent_path, &node.name);

        let conn = self.conn()?;
        if !lookup(&conn, &parent_path)?.is_some_and(|p| p.is_dir) {
            return Ok(false);
        }
        if lookup(&conn, &full)?.is_some() {
            return Ok(false);
        }
        let (size, content) = if node.is_dir {
            (None, None)
        } else {
            (Some(0_i64), Some(String::new()))
        };
        conn.execute(
            "INSERT INTO nodes
                (path, name, parent_path, is_dir, size, created_at, modified_at, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                full,
                node.name,
                parent_path,
                node.is_dir,
                size,
                node.created_at as i64,
                node.modified_at as i64,
                content,
            ],
        )?;
        tracing::debug!(path = %full, is_dir = node.is_dir, "sqlite: created node");
        Ok(true)
    }

    fn list_directory(&self, path: &str) -> StorageResult<Vec<String>> {
        let path = path::normalize(path);
        let conn = self.conn()?;
        if !lookup(&conn, &path)?.is_some_and(|n| n.is_dir) {
            return Ok(Vec::new());
        }
        let mut stmt =
            conn.prepare("SELECT name FROM nodes WHERE parent_path = ?1 AND path != '/' ORDER BY name")?;
        let names = stmt
            .query_map([&path], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn write_file(&self, path: &str, content: &str) -> StorageResult<bool> {
        let path = path::normalize(path);
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE nodes SET content = ?1, size = ?2, modified_at = ?3
             WHERE path = ?4 AND is_dir = 0",
            params![content, content.len() as i64, now_millis() as i64, path],
        )?;
        Ok(updated == 1)
    }

    fn read_file(&self, path: &str) -> StorageResult<Option<String>> {
        let path = path::normalize(path);
        let conn = self.conn()?;
        let content = conn
            .query_row(
                "SELECT content FROM nodes WHERE path = ?1 AND is_dir = 0",
                [&path],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(content.map(Option::unwrap_or_default))
    }

    fn delete_node(&self, path: &str) -> StorageResult<bool> {
        let path = path::normalize(path);
        if path == "/" {
            return Ok(false);
        }
        let conn = self.conn()?;
        let Some(node) = lookup(&conn, &path)? else {
            return Ok(false);
        };
        if node.is_dir {
            let children: i64 = conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE parent_path = ?1",
                [&path],
                |row| row.get(0),
            )?;
            if children > 0 {
                return Ok(false);
            }
        }
        let deleted = conn.execute("DELETE FROM nodes WHERE path = ?1", [&path])?;
        Ok(deleted == 1)
    }

    fn touch(&self, path: &str) -> StorageResult<bool> {
        let path = path::normalize(path);
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE nodes SET modified_at = ?1 WHERE path = ?2",
            params![now_millis() as i64, path],
        )?;
        Ok(updated == 1)
    }

    fn get_storage_stats(&self) -> StorageResult<StorageStats> {
        let conn = self.conn()?;
        let (dirs, files, bytes): (i64, i64, i64) = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN is_dir = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN is_dir = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN is_dir = 0 THEN size ELSE 0 END), 0)
             FROM nodes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let mut stats = StorageStats {
            provider: self.name().to_string(),
            file_count: files.max(0) as u64,
            directory_count: dirs.max(0) as u64,
            total_size_bytes: bytes.max(0) as u64,
            ..StorageStats::default()
        };
        stats
            .extra
            .insert("db_path".to_string(), self.db_path.clone().into());
        Ok(stats)
    }

    fn cleanup(&self) -> StorageResult<CleanupStats> {
        let prefix = format!("{}/", TEMP_DIR);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let (files, bytes): (i64, i64) = tx.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM nodes
             WHERE is_dir = 0 AND substr(path, 1, ?2) = ?1",
            params![prefix, prefix.len() as i64],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        tx.execute(
            "DELETE FROM nodes WHERE substr(path, 1, ?2) = ?1",
            params![prefix, prefix.len() as i64],
        )?;
        tx.commit()?;

        let stats = CleanupStats {
            files_removed: files.max(0) as u64,
            bytes_freed: bytes.max(0) as u64,
        };
        tracing::debug!(
            files_removed = stats.files_removed,
            bytes_freed = stats.bytes_freed,
            "sqlite: cleanup"
        );
        Ok(stats)
    }
}

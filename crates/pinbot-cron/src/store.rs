//! SQLite-backed storage for pending jobs (durable dispatch mode).

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::ScheduledJob;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS scheduled_jobs (
        key TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        fire_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_agent ON scheduled_jobs(agent_id);";

/// Persistent storage for pending jobs.
pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    /// Open or create a job store.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("job store connection lock poisoned"))
    }

    /// Insert a job. An existing key is left untouched.
    pub fn insert(&self, job: &ScheduledJob) -> Result<bool> {
        let conn = self.lock()?;
        let count = conn.execute(
            "INSERT OR IGNORE INTO scheduled_jobs (key, agent_id, fire_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![job.key, job.agent_id, job.fire_at.to_rfc3339()],
        )?;
        Ok(count > 0)
    }

    /// Delete one job by key.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count = conn.execute(
            "DELETE FROM scheduled_jobs WHERE key = ?1",
            rusqlite::params![key],
        )?;
        Ok(count > 0)
    }

    /// Delete every job of one agent.
    pub fn delete_for_agent(&self, agent_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count = conn.execute(
            "DELETE FROM scheduled_jobs WHERE agent_id = ?1",
            rusqlite::params![agent_id],
        )?;
        Ok(count)
    }

    /// All stored jobs in fire order.
    pub fn list(&self) -> Result<Vec<ScheduledJob>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key, agent_id, fire_at FROM scheduled_jobs ORDER BY fire_at ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (key, agent_id, fire_at) in rows {
            let fire_at = DateTime::parse_from_rfc3339(&fire_at)
                .map_err(|e| anyhow!("bad fire_at `{fire_at}` for job {key}: {e}"))?
                .with_timezone(&Utc);
            jobs.push(ScheduledJob {
                key,
                agent_id,
                fire_at,
            });
        }
        Ok(jobs)
    }
}

//! pinbot-storage: SQLite persistence for the agent aggregate.
//!
//! Agents live in one row each; the interaction log lives in a separate
//! append-only table keyed by `(agent_id, seq)` so a save never rewrites
//! edges that were already committed. A third table queues admin requests
//! for whichever process runs the scheduler.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use pinbot_types::{Agent, ControlAction, ControlRequest, EdgeKind, InteractionEdge};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        password TEXT NOT NULL,
        nickname TEXT NOT NULL,
        name TEXT NOT NULL,
        gender TEXT,
        age INTEGER,
        location TEXT,
        occupation TEXT,
        locale TEXT NOT NULL,
        platform_id TEXT,
        interests TEXT NOT NULL,
        intervals TEXT NOT NULL,
        functions TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 0,
        last_interacted_item_id TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS interaction_edges (
        agent_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        kind TEXT NOT NULL,
        target_id TEXT NOT NULL,
        at TEXT NOT NULL,
        PRIMARY KEY (agent_id, seq),
        FOREIGN KEY (agent_id) REFERENCES agents(id)
    );

    CREATE TABLE IF NOT EXISTS control_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_id TEXT NOT NULL,
        action TEXT NOT NULL,
        requested_at TEXT NOT NULL
    );";

const AGENT_COLUMNS: &str = "id, username, password, nickname, name, gender, age, location,
     occupation, locale, platform_id, interests, intervals, functions, is_active,
     last_interacted_item_id, created_at";

/// SQLite-backed agent repository.
pub struct AgentStore {
    conn: Arc<Mutex<Connection>>,
}

impl AgentStore {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Agent store opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or update an agent and append any edges not yet stored.
    pub async fn save_agent(&self, agent: &Agent) -> Result<()> {
        let conn = self.conn.clone();
        let agent = agent.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO agents
                    (id, username, password, nickname, name, gender, age, location,
                     occupation, locale, platform_id, interests, intervals, functions,
                     is_active, last_interacted_item_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    password = excluded.password,
                    nickname = excluded.nickname,
                    name = excluded.name,
                    gender = excluded.gender,
                    age = excluded.age,
                    location = excluded.location,
                    occupation = excluded.occupation,
                    locale = excluded.locale,
                    platform_id = excluded.platform_id,
                    interests = excluded.interests,
                    intervals = excluded.intervals,
                    functions = excluded.functions,
                    is_active = excluded.is_active,
                    last_interacted_item_id = excluded.last_interacted_item_id",
                rusqlite::params![
                    agent.id,
                    agent.username,
                    agent.password,
                    agent.nickname,
                    agent.name,
                    agent.gender,
                    agent.age,
                    agent.location,
                    agent.occupation,
                    agent.locale,
                    agent.platform_id,
                    serde_json::to_string(&agent.interests)?,
                    serde_json::to_string(&agent.intervals)?,
                    serde_json::to_string(&agent.functions)?,
                    agent.is_active as i32,
                    agent.last_interacted_item_id,
                    agent.created_at.to_rfc3339(),
                ],
            )?;
            for (seq, edge) in agent.edges.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO interaction_edges (agent_id, seq, kind, target_id, at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        agent.id,
                        seq as i64,
                        edge.kind.as_str(),
                        edge.target_id,
                        edge.at.to_rfc3339(),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?
    }

    /// Get an agent with its full interaction log.
    pub async fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            read_agent(&conn, &id)
        })
        .await?
    }

    /// List all agents, oldest first.
    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let ids = {
                let mut stmt = conn.prepare("SELECT id FROM agents ORDER BY created_at ASC")?;
                stmt.query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            let mut agents = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(agent) = read_agent(&conn, &id)? {
                    agents.push(agent);
                }
            }
            Ok(agents)
        })
        .await?
    }

    /// Agents with an interval covering the given local time of day.
    pub async fn agents_scheduled_at(&self, time: NaiveTime) -> Result<Vec<Agent>> {
        let agents = self.list_agents().await?;
        Ok(agents
            .into_iter()
            .filter(|a| a.is_scheduled_at(time))
            .collect())
    }

    /// Distinct ids of everything the agent has interacted with.
    pub async fn interacted_item_ids(&self, agent_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.clone();
        let agent_id = agent_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT target_id FROM interaction_edges WHERE agent_id = ?1
                 GROUP BY target_id ORDER BY MIN(seq)",
            )?;
            let ids = stmt
                .query_map(rusqlite::params![agent_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await?
    }

    /// Update only the active flag. Returns false when the agent is unknown.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute(
                "UPDATE agents SET is_active = ?1 WHERE id = ?2",
                rusqlite::params![active as i32, id],
            )?;
            Ok(count > 0)
        })
        .await?
    }

    /// Delete an agent and its interaction log.
    pub async fn delete_agent(&self, id: &str) -> Result<bool> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM interaction_edges WHERE agent_id = ?1",
                rusqlite::params![id],
            )?;
            let count = tx.execute("DELETE FROM agents WHERE id = ?1", rusqlite::params![id])?;
            tx.commit()?;
            Ok(count > 0)
        })
        .await?
    }

    /// Queue an admin request. Returns its id.
    pub async fn enqueue_control(&self, agent_id: &str, action: ControlAction) -> Result<i64> {
        let conn = self.conn.clone();
        let agent_id = agent_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO control_requests (agent_id, action, requested_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![agent_id, action.as_str(), Utc::now().to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?
    }

    /// Remove and return every queued request, oldest first. Rows with an
    /// unknown action are dropped with a warning.
    pub async fn take_control_requests(&self) -> Result<Vec<ControlRequest>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            let rows = {
                let mut stmt = tx.prepare(
                    "SELECT id, agent_id, action, requested_at FROM control_requests
                     ORDER BY id ASC",
                )?;
                stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?
            };
            if let Some((last, ..)) = rows.last() {
                tx.execute(
                    "DELETE FROM control_requests WHERE id <= ?1",
                    rusqlite::params![last],
                )?;
            }
            tx.commit()?;

            let mut requests = Vec::with_capacity(rows.len());
            for (id, agent_id, action, requested_at) in rows {
                let Some(action) = ControlAction::parse(&action) else {
                    tracing::warn!(id, action = %action, "Dropping unknown control request");
                    continue;
                };
                requests.push(ControlRequest {
                    id,
                    agent_id,
                    action,
                    requested_at: parse_timestamp(&requested_at)?,
                });
            }
            Ok(requests)
        })
        .await?
    }
}

/// Raw column values, decoded outside the rusqlite row closure.
struct AgentRow {
    id: String,
    username: String,
    password: String,
    nickname: String,
    name: String,
    gender: Option<String>,
    age: Option<u32>,
    location: Option<String>,
    occupation: Option<String>,
    locale: String,
    platform_id: Option<String>,
    interests: String,
    intervals: String,
    functions: String,
    is_active: bool,
    last_interacted_item_id: Option<String>,
    created_at: String,
}

fn read_agent(conn: &Connection, id: &str) -> Result<Option<Agent>> {
    let row = conn
        .query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            rusqlite::params![id],
            |row| {
                Ok(AgentRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password: row.get(2)?,
                    nickname: row.get(3)?,
                    name: row.get(4)?,
                    gender: row.get(5)?,
                    age: row.get(6)?,
                    location: row.get(7)?,
                    occupation: row.get(8)?,
                    locale: row.get(9)?,
                    platform_id: row.get(10)?,
                    interests: row.get(11)?,
                    intervals: row.get(12)?,
                    functions: row.get(13)?,
                    is_active: row.get::<_, i32>(14)? != 0,
                    last_interacted_item_id: row.get(15)?,
                    created_at: row.get(16)?,
                })
            },
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT kind, target_id, at FROM interaction_edges WHERE agent_id = ?1 ORDER BY seq ASC",
    )?;
    let raw_edges = stmt
        .query_map(rusqlite::params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut edges = Vec::with_capacity(raw_edges.len());
    for (kind, target_id, at) in raw_edges {
        let kind = EdgeKind::parse(&kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown edge kind `{kind}`")))?;
        edges.push(InteractionEdge {
            kind,
            target_id,
            at: parse_timestamp(&at)?,
        });
    }

    Ok(Some(Agent {
        id: row.id,
        username: row.username,
        password: row.password,
        nickname: row.nickname,
        name: row.name,
        gender: row.gender,
        age: row.age,
        location: row.location,
        occupation: row.occupation,
        locale: row.locale,
        interests: serde_json::from_str(&row.interests)?,
        platform_id: row.platform_id,
        intervals: serde_json::from_str(&row.intervals)?,
        functions: serde_json::from_str(&row.functions)?,
        is_active: row.is_active,
        last_interacted_item_id: row.last_interacted_item_id,
        edges,
        created_at: parse_timestamp(&row.created_at)?,
    }))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp `{raw}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinbot_types::{AgentProfile, Interval};

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn sample_agent(username: &str) -> Agent {
        Agent::from_profile(
            AgentProfile {
                username: username.into(),
                password: None,
                nickname: format!("{username}_nick"),
                name: "Sample".into(),
                gender: None,
                age: Some(31),
                location: None,
                occupation: Some("Chef".into()),
                locale: "en_US".into(),
                interests: vec!["cooking".into()],
                intervals: vec![Interval::new(hm(9, 0), hm(10, 0), 4)],
                functions: vec!["LIKE".into(), "COMMENT".into()],
            },
            "pw".into(),
        )
    }

    #[tokio::test]
    async fn test_save_and_get_agent() {
        let store = AgentStore::open_in_memory().unwrap();
        let agent = sample_agent("lena");
        store.save_agent(&agent).await.unwrap();

        let loaded = store.get_agent(&agent.id).await.unwrap().unwrap();
        assert_eq!(loaded.username, "lena");
        assert_eq!(loaded.intervals, agent.intervals);
        assert_eq!(loaded.functions, vec!["LIKE", "COMMENT"]);
        assert_eq!(loaded.age, Some(31));
        assert!(!loaded.is_active);
    }

    #[tokio::test]
    async fn test_get_agent_not_found() {
        let store = AgentStore::open_in_memory().unwrap();
        assert!(store.get_agent("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edges_are_appended_not_rewritten() {
        let store = AgentStore::open_in_memory().unwrap();
        let mut agent = sample_agent("lena");
        agent
            .edges
            .push(InteractionEdge::new(EdgeKind::Liked, "item-1"));
        store.save_agent(&agent).await.unwrap();

        // A stale copy that lost the first edge must not erase it.
        let mut stale = agent.clone();
        stale.edges.clear();
        store.save_agent(&stale).await.unwrap();

        agent
            .edges
            .push(InteractionEdge::new(EdgeKind::CommentedOn, "item-1"));
        agent.last_interacted_item_id = Some("item-1".into());
        store.save_agent(&agent).await.unwrap();

        let loaded = store.get_agent(&agent.id).await.unwrap().unwrap();
        assert_eq!(loaded.edges.len(), 2);
        assert_eq!(loaded.edges[0].kind, EdgeKind::Liked);
        assert_eq!(loaded.edges[1].kind, EdgeKind::CommentedOn);
        assert_eq!(loaded.last_interacted_item_id.as_deref(), Some("item-1"));
    }

    #[tokio::test]
    async fn test_set_active() {
        let store = AgentStore::open_in_memory().unwrap();
        let agent = sample_agent("lena");
        store.save_agent(&agent).await.unwrap();

        assert!(store.set_active(&agent.id, true).await.unwrap());
        assert!(store.get_agent(&agent.id).await.unwrap().unwrap().is_active);
        assert!(!store.set_active("missing", true).await.unwrap());
    }

    #[tokio::test]
    async fn test_agents_scheduled_at() {
        let store = AgentStore::open_in_memory().unwrap();
        let morning = sample_agent("morning");
        let mut evening = sample_agent("evening");
        evening.intervals = vec![Interval::new(hm(18, 0), hm(20, 0), 2)];
        store.save_agent(&morning).await.unwrap();
        store.save_agent(&evening).await.unwrap();

        let at_nine = store.agents_scheduled_at(hm(9, 30)).await.unwrap();
        assert_eq!(at_nine.len(), 1);
        assert_eq!(at_nine[0].username, "morning");
        assert!(store.agents_scheduled_at(hm(12, 0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interacted_item_ids_are_distinct() {
        let store = AgentStore::open_in_memory().unwrap();
        let mut agent = sample_agent("lena");
        agent.edges.push(InteractionEdge::new(EdgeKind::Liked, "a"));
        agent.edges.push(InteractionEdge::new(EdgeKind::CommentedOn, "a"));
        agent.edges.push(InteractionEdge::new(EdgeKind::Liked, "b"));
        store.save_agent(&agent).await.unwrap();

        let ids = store.interacted_item_ids(&agent.id).await.unwrap();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_agent_removes_edges() {
        let store = AgentStore::open_in_memory().unwrap();
        let mut agent = sample_agent("lena");
        agent.edges.push(InteractionEdge::new(EdgeKind::Liked, "a"));
        store.save_agent(&agent).await.unwrap();

        assert!(store.delete_agent(&agent.id).await.unwrap());
        assert!(store.get_agent(&agent.id).await.unwrap().is_none());
        assert!(store.interacted_item_ids(&agent.id).await.unwrap().is_empty());
        assert!(!store.delete_agent(&agent.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_control_requests_are_taken_once_in_order() {
        let store = AgentStore::open_in_memory().unwrap();
        store.enqueue_control("a", ControlAction::Schedule).await.unwrap();
        store.enqueue_control("a", ControlAction::RunNow).await.unwrap();
        store.enqueue_control("b", ControlAction::Stop).await.unwrap();

        let taken = store.take_control_requests().await.unwrap();
        let actions: Vec<_> = taken.iter().map(|r| (r.agent_id.as_str(), r.action)).collect();
        assert_eq!(
            actions,
            vec![
                ("a", ControlAction::Schedule),
                ("a", ControlAction::RunNow),
                ("b", ControlAction::Stop),
            ]
        );
        assert!(store.take_control_requests().await.unwrap().is_empty());

        store.enqueue_control("a", ControlAction::Delete).await.unwrap();
        let taken = store.take_control_requests().await.unwrap();
        assert_eq!(taken.len(), 1);
        assert!(taken[0].id > actions.len() as i64);
    }

    #[tokio::test]
    async fn test_list_agents_from_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.db");
        {
            let store = AgentStore::open(&path).unwrap();
            store.save_agent(&sample_agent("one")).await.unwrap();
            store.save_agent(&sample_agent("two")).await.unwrap();
        }
        let reopened = AgentStore::open(&path).unwrap();
        let agents = reopened.list_agents().await.unwrap();
        assert_eq!(agents.len(), 2);
    }
}

//! Durable pipeline state, backed by SQLite.
//!
//! One row per instance: the full snapshot as a JSON blob plus indexed
//! `status` and `project_id` columns for filtering. Every `save` writes
//! the whole record (last-writer-wins); there are no partial updates.
//! This is the source of truth for crash recovery.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::core::{PipelineInstance, PipelineStatus};
use crate::errors::Result;

/// Filter for [`StateStore::list`]. Empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Keep only instances with this status.
    pub status: Option<PipelineStatus>,
    /// Keep only instances of this project.
    pub project_id: Option<String>,
}

impl ListFilter {
    /// An empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by status.
    #[must_use]
    pub fn with_status(mut self, status: PipelineStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by project id.
    #[must_use]
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Durable, queryable record of every pipeline instance.
///
/// Safe for concurrent use from many pipelines: each pipeline only ever
/// writes its own instance id, and the connection is serialized behind a
/// mutex.
#[derive(Clone)]
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
}

impl StateStore {
    /// Opens (or creates) the database at `path`, creating parent
    /// directories and the schema as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory database. Handy for tests; recovery guarantees
    /// obviously do not hold.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pipelines (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                status TEXT NOT NULL,
                project_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pipelines_status ON pipelines(status);
            CREATE INDEX IF NOT EXISTS idx_pipelines_project ON pipelines(project_id);",
        )?;
        Ok(())
    }

    /// Upserts the full instance snapshot, keyed by id.
    pub fn save(&self, instance: &PipelineInstance) -> Result<()> {
        let data = serde_json::to_string(instance)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO pipelines
                (id, data, status, project_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                instance.id,
                data,
                instance.status.to_string(),
                instance.project_id(),
                instance.created_at.to_rfc3339(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Loads one instance by id.
    pub fn get(&self, pipeline_id: &str) -> Result<Option<PipelineInstance>> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM pipelines WHERE id = ?1",
                params![pipeline_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Lists instances matching the filter, newest first.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<PipelineInstance>> {
        let mut sql = "SELECT data FROM pipelines WHERE 1=1".to_string();
        let mut args: Vec<String> = Vec::new();
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(status.to_string());
        }
        if let Some(ref project_id) = filter.project_id {
            sql.push_str(" AND project_id = ?");
            args.push(project_id.clone());
        }
        sql.push_str(" ORDER BY created_at DESC");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
            row.get::<_, String>(0)
        })?;
        collect_instances(rows)
    }

    /// All instances of one project, newest first.
    pub fn get_by_project(&self, project_id: &str) -> Result<Vec<PipelineInstance>> {
        self.list(&ListFilter::new().with_project_id(project_id))
    }

    /// Non-terminal instances (`running` or `blocked`), oldest first.
    /// The crash-recovery seed list.
    pub fn get_incomplete(&self) -> Result<Vec<PipelineInstance>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT data FROM pipelines
             WHERE status IN ('running', 'blocked')
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        collect_instances(rows)
    }
}

fn collect_instances(
    rows: impl Iterator<Item = rusqlite::Result<String>>,
) -> Result<Vec<PipelineInstance>> {
    let mut instances = Vec::new();
    for row in rows {
        instances.push(serde_json::from_str(&row?)?);
    }
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DevEvent, EventCategory, EventSource, ProjectRef};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn instance(id: &str, project_id: &str) -> PipelineInstance {
        let event = DevEvent::new(
            format!("evt-{id}"),
            EventSource::Gitlab,
            EventCategory::Manual,
            ProjectRef::new(project_id, "demo", "git@example.com:demo.git", "main"),
        );
        PipelineInstance::new(id, event, PathBuf::from("/tmp/ws"))
    }

    #[test]
    fn test_save_and_get_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        let original = instance("pipe-1", "p1");
        store.save(&original).unwrap();

        let loaded = store.get("pipe-1").unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_save_is_idempotent_upsert() {
        let store = StateStore::open_in_memory().unwrap();
        let mut inst = instance("pipe-1", "p1");
        store.save(&inst).unwrap();

        inst.status = PipelineStatus::Blocked;
        store.save(&inst).unwrap();

        let loaded = store.get("pipe-1").unwrap().unwrap();
        assert_eq!(loaded.status, PipelineStatus::Blocked);
        assert_eq!(store.list(&ListFilter::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_list_filters_by_status_and_project() {
        let store = StateStore::open_in_memory().unwrap();
        let mut a = instance("pipe-a", "p1");
        a.status = PipelineStatus::Success;
        let b = instance("pipe-b", "p1");
        let c = instance("pipe-c", "p2");
        for inst in [&a, &b, &c] {
            store.save(inst).unwrap();
        }

        let running = store
            .list(&ListFilter::new().with_status(PipelineStatus::Running))
            .unwrap();
        assert_eq!(running.len(), 2);

        let p1_running = store
            .list(
                &ListFilter::new()
                    .with_status(PipelineStatus::Running)
                    .with_project_id("p1"),
            )
            .unwrap();
        assert_eq!(p1_running.len(), 1);
        assert_eq!(p1_running[0].id, "pipe-b");

        assert_eq!(store.get_by_project("p2").unwrap().len(), 1);
    }

    #[test]
    fn test_get_incomplete_oldest_first() {
        let store = StateStore::open_in_memory().unwrap();

        let mut old = instance("pipe-old", "p1");
        old.created_at = chrono::Utc::now() - chrono::Duration::minutes(10);
        let mut done = instance("pipe-done", "p1");
        done.status = PipelineStatus::Success;
        let mut blocked = instance("pipe-blocked", "p2");
        blocked.status = PipelineStatus::Blocked;
        let fresh = instance("pipe-fresh", "p2");

        for inst in [&old, &done, &blocked, &fresh] {
            store.save(inst).unwrap();
        }

        let incomplete = store.get_incomplete().unwrap();
        let ids: Vec<&str> = incomplete.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids[0], "pipe-old");
        assert!(ids.contains(&"pipe-blocked"));
        assert!(ids.contains(&"pipe-fresh"));
        assert!(!ids.contains(&"pipe-done"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("state.db");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.save(&instance("pipe-1", "p1")).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        let incomplete = store.get_incomplete().unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].id, "pipe-1");
    }
}

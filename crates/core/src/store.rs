//! Session persistence.
//!
//! The engine only needs get / set-with-expiry / delete / scan, so the
//! store is a small trait with two implementations: a durable SQLite
//! database and an in-memory map (no expiry) used when the durable store
//! is unreachable. `FailoverStore` composes the two so a persistence
//! outage degrades to memory instead of losing the turn.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::session::{now_ms, Session};

const KEY_PREFIX: &str = "session:";

/// Sessions expire after a week of inactivity unless rewritten.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("session serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Durable key-value persistence for sessions. Writes refresh the expiry;
/// reads never do.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Session>, StoreError>;
    fn put(&self, id: &str, session: &Session) -> Result<(), StoreError>;
    fn delete(&self, id: &str) -> Result<(), StoreError>;
    /// Enumerate all live (non-expired) sessions.
    fn scan(&self) -> Result<Vec<(String, Session)>, StoreError>;
    fn healthy(&self) -> bool;
}

fn session_key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// Durable store backed by a single-table SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    ttl_ms: u64,
}

impl SqliteStore {
    pub fn open(path: &Path, ttl: Duration) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?, ttl)
    }

    /// Private database for tests.
    pub fn open_in_memory(ttl: Duration) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, ttl)
    }

    fn from_connection(conn: Connection, ttl: Duration) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at_ms INTEGER NOT NULL
            )
            "#,
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_ms: ttl.as_millis() as u64,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl SessionStore for SqliteStore {
    fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT value, expires_at_ms FROM sessions WHERE key = ?1")?;
        let row = stmt.query_row(params![session_key(id)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        });
        match row {
            Ok((value, expires_at_ms)) => {
                if (expires_at_ms as u64) <= now_ms() {
                    conn.execute("DELETE FROM sessions WHERE key = ?1", params![session_key(id)])?;
                    return Ok(None);
                }
                Ok(Some(serde_json::from_str(&value)?))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, id: &str, session: &Session) -> Result<(), StoreError> {
        let value = serde_json::to_string(session)?;
        let expires_at_ms = now_ms() + self.ttl_ms;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO sessions (key, value, expires_at_ms) VALUES (?1, ?2, ?3)",
            params![session_key(id), value, expires_at_ms as i64],
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sessions WHERE key = ?1", params![session_key(id)])?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(String, Session)>, StoreError> {
        let now = now_ms();
        let conn = self.lock()?;
        // Opportunistic cleanup keeps the table from accumulating corpses.
        conn.execute(
            "DELETE FROM sessions WHERE expires_at_ms <= ?1",
            params![now as i64],
        )?;

        let pattern = format!("{KEY_PREFIX}%");
        let mut stmt = conn.prepare("SELECT key, value FROM sessions WHERE key LIKE ?1")?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (key, value) = row?;
            let id = key.trim_start_matches(KEY_PREFIX).to_string();
            match serde_json::from_str::<Session>(&value) {
                Ok(session) => sessions.push((id, session)),
                Err(e) => tracing::warn!("skipping unreadable session {id}: {e}"),
            }
        }
        Ok(sessions)
    }

    fn healthy(&self) -> bool {
        self.lock()
            .map(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory fallback. No expiry; otherwise behaves identically.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(sessions.get(id).cloned())
    }

    fn put(&self, id: &str, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| StoreError::Poisoned)?;
        sessions.insert(id.to_string(), session.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| StoreError::Poisoned)?;
        sessions.remove(id);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(String, Session)>, StoreError> {
        let sessions = self.sessions.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(sessions
            .iter()
            .map(|(id, session)| (id.clone(), session.clone()))
            .collect())
    }

    fn healthy(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// FailoverStore
// ---------------------------------------------------------------------------

/// Primary-then-fallback composition. A failed primary write lands in the
/// fallback (with a warning) instead of being lost; reads fall through to
/// the fallback when the primary errors or has no record.
pub struct FailoverStore<P, F> {
    primary: P,
    fallback: F,
}

impl<P: SessionStore, F: SessionStore> FailoverStore<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: SessionStore, F: SessionStore> SessionStore for FailoverStore<P, F> {
    fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        match self.primary.get(id) {
            Ok(Some(session)) => Ok(Some(session)),
            Ok(None) => self.fallback.get(id),
            Err(e) => {
                tracing::warn!("primary store read failed, using fallback: {e}");
                self.fallback.get(id)
            }
        }
    }

    fn put(&self, id: &str, session: &Session) -> Result<(), StoreError> {
        match self.primary.put(id, session) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("primary store write failed, using fallback: {e}");
                self.fallback.put(id, session)
            }
        }
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        if let Err(e) = self.primary.delete(id) {
            tracing::warn!("primary store delete failed: {e}");
        }
        self.fallback.delete(id)
    }

    fn scan(&self) -> Result<Vec<(String, Session)>, StoreError> {
        let mut sessions = match self.primary.scan() {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!("primary store scan failed, using fallback: {e}");
                Vec::new()
            }
        };
        let seen: std::collections::HashSet<String> =
            sessions.iter().map(|(id, _)| id.clone()).collect();
        for (id, session) in self.fallback.scan()? {
            if !seen.contains(&id) {
                sessions.push((id, session));
            }
        }
        Ok(sessions)
    }

    fn healthy(&self) -> bool {
        self.primary.healthy()
    }
}

/// Incomplete sessions for a student, most recently active first. Used to
/// offer "pick up where you left off".
pub fn find_student_sessions(
    store: &dyn SessionStore,
    student_name: &str,
) -> Result<Vec<(String, Session)>, StoreError> {
    let mut sessions: Vec<(String, Session)> = store
        .scan()?
        .into_iter()
        .filter(|(_, s)| !s.completed && s.student_name.eq_ignore_ascii_case(student_name))
        .collect();
    sessions.sort_by(|a, b| b.1.last_active_ms.cmp(&a.1.last_active_ms));
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    /// A primary that is always down.
    struct BrokenStore;

    impl SessionStore for BrokenStore {
        fn get(&self, _id: &str) -> Result<Option<Session>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn put(&self, _id: &str, _session: &Session) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
        fn delete(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
        fn scan(&self) -> Result<Vec<(String, Session)>, StoreError> {
            Err(StoreError::Poisoned)
        }
        fn healthy(&self) -> bool {
            false
        }
    }

    fn drill(name: &str, last_active_ms: u64, completed: bool) -> Session {
        let mut session = Session::new(vec!["cat".into()], Some(name.into()), 0);
        session.last_active_ms = last_active_ms;
        session.completed = completed;
        session
    }

    #[test]
    fn sqlite_round_trip() {
        let store = SqliteStore::open_in_memory(DEFAULT_SESSION_TTL).unwrap();
        let session = drill("Maya", 5, false);

        store.put("abc", &session).unwrap();
        let loaded = store.get("abc").unwrap().unwrap();
        assert_eq!(loaded.student_name, "Maya");
        assert_eq!(loaded.words, vec!["cat"]);

        store.delete("abc").unwrap();
        assert!(store.get("abc").unwrap().is_none());
    }

    #[test]
    fn sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        {
            let store = SqliteStore::open(&path, DEFAULT_SESSION_TTL).unwrap();
            store.put("abc", &drill("Maya", 5, false)).unwrap();
        }
        let store = SqliteStore::open(&path, DEFAULT_SESSION_TTL).unwrap();
        assert!(store.get("abc").unwrap().is_some());
        assert!(store.healthy());
    }

    #[test]
    fn expired_records_read_as_absent() {
        let store = SqliteStore::open_in_memory(Duration::ZERO).unwrap();
        store.put("abc", &drill("Maya", 5, false)).unwrap();
        assert!(store.get("abc").unwrap().is_none());
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn rewrites_refresh_expiry() {
        let store = SqliteStore::open_in_memory(Duration::from_millis(200)).unwrap();
        store.put("abc", &drill("Maya", 5, false)).unwrap();

        // Rewrite partway through the window, then read past the original
        // deadline: the record must still be alive.
        std::thread::sleep(Duration::from_millis(120));
        store.put("abc", &drill("Maya", 5, false)).unwrap();
        std::thread::sleep(Duration::from_millis(120));
        assert!(store.get("abc").unwrap().is_some());

        // And it still expires once the refreshed window lapses.
        std::thread::sleep(Duration::from_millis(250));
        assert!(store.get("abc").unwrap().is_none());
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store.put("abc", &drill("Maya", 5, false)).unwrap();
        assert!(store.get("abc").unwrap().is_some());
        assert_eq!(store.scan().unwrap().len(), 1);
        store.delete("abc").unwrap();
        assert!(store.get("abc").unwrap().is_none());
    }

    #[test]
    fn failover_writes_land_in_the_fallback() {
        let store = FailoverStore::new(BrokenStore, MemoryStore::new());
        let session = drill("Maya", 5, false);

        store.put("abc", &session).unwrap();
        let loaded = store.get("abc").unwrap().unwrap();
        assert_eq!(loaded.student_name, "Maya");
        assert_eq!(store.scan().unwrap().len(), 1);
        assert!(!store.healthy());
    }

    #[test]
    fn failover_reads_fall_through_on_missing_records() {
        let primary = SqliteStore::open_in_memory(DEFAULT_SESSION_TTL).unwrap();
        let fallback = MemoryStore::new();
        fallback.put("abc", &drill("Maya", 5, false)).unwrap();

        let store = FailoverStore::new(primary, fallback);
        assert!(store.get("abc").unwrap().is_some());
    }

    #[test]
    fn find_student_sessions_filters_and_sorts() {
        let store = MemoryStore::new();
        store.put("old", &drill("Maya", 10, false)).unwrap();
        store.put("new", &drill("maya", 20, false)).unwrap();
        store.put("done", &drill("Maya", 30, true)).unwrap();
        store.put("other", &drill("Alex", 40, false)).unwrap();

        let found = find_student_sessions(&store, "MAYA").unwrap();
        let ids: Vec<&str> = found.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }
}

//! Durable relational rows: sessions, interactions, facts, mistakes, preferences,
//! health metrics, tasks, reminders, calendar events.
//!
//! One connection is opened per call rather than held open across awaits —
//! `rusqlite::Connection` is not `Send`, and turns may interleave across tasks.

use crate::error::RelationalError;
use crate::model::{
    CalendarEvent, EpisodicEvent, HealthMetric, Interaction, Mistake, Priority, Recurrence, Reminder, Session, Task,
};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

const SCHEMA_VERSION: i64 = 1;

pub struct RelationalStore {
    db_path: PathBuf,
}

fn recurrence_to_str(r: Recurrence) -> &'static str {
    match r {
        Recurrence::None => "none",
        Recurrence::Daily => "daily",
        Recurrence::Weekly => "weekly",
        Recurrence::Monthly => "monthly",
    }
}

fn recurrence_from_str(s: &str) -> Recurrence {
    match s {
        "daily" => Recurrence::Daily,
        "weekly" => Recurrence::Weekly,
        "monthly" => Recurrence::Monthly,
        _ => Recurrence::None,
    }
}

fn priority_to_str(p: Priority) -> &'static str {
    match p {
        Priority::Low => "low",
        Priority::Normal => "normal",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

fn priority_from_str(s: &str) -> Priority {
    match s {
        "low" => Priority::Low,
        "high" => Priority::High,
        "urgent" => Priority::Urgent,
        _ => Priority::Normal,
    }
}

impl RelationalStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self, RelationalError> {
        let store = Self { db_path: db_path.into() };
        store.init()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection, RelationalError> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(conn)
    }

    fn init(&self) -> Result<(), RelationalError> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            CREATE TABLE IF NOT EXISTS sessions (
              id TEXT PRIMARY KEY, started_at INTEGER NOT NULL, ended_at INTEGER,
              message_count INTEGER NOT NULL DEFAULT 0, domain TEXT NOT NULL DEFAULT 'general', summary TEXT
            );
            CREATE TABLE IF NOT EXISTS interactions (
              id TEXT PRIMARY KEY, session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
              user_message TEXT NOT NULL, agent_response TEXT NOT NULL, domain TEXT NOT NULL,
              timestamp INTEGER NOT NULL, tokens_used INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_interactions_session ON interactions(session_id);
            CREATE INDEX IF NOT EXISTS idx_interactions_timestamp ON interactions(timestamp);
            CREATE TABLE IF NOT EXISTS facts (
              id TEXT PRIMARY KEY, label TEXT NOT NULL, domain TEXT NOT NULL, confidence REAL NOT NULL,
              source TEXT, created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS mistakes (
              id TEXT PRIMARY KEY, session_id TEXT REFERENCES sessions(id) ON DELETE SET NULL,
              user_input TEXT NOT NULL, agent_response TEXT NOT NULL, correction TEXT NOT NULL,
              domain TEXT NOT NULL, error_pattern TEXT, timestamp INTEGER NOT NULL,
              similar_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS preferences (
              key TEXT PRIMARY KEY, value TEXT NOT NULL, domain TEXT NOT NULL DEFAULT 'general', updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS health_metrics (
              id TEXT PRIMARY KEY, metric TEXT NOT NULL, value REAL NOT NULL, unit TEXT,
              recorded_at INTEGER NOT NULL, session_id TEXT REFERENCES sessions(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_health_metrics_recorded ON health_metrics(recorded_at);
            CREATE TABLE IF NOT EXISTS tasks (
              id TEXT PRIMARY KEY, title TEXT NOT NULL, notes TEXT, done INTEGER NOT NULL DEFAULT 0,
              due_timestamp INTEGER, created_at INTEGER NOT NULL, session_id TEXT REFERENCES sessions(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS reminders (
              id TEXT PRIMARY KEY, title TEXT NOT NULL, notes TEXT, due_timestamp INTEGER NOT NULL,
              recurrence TEXT NOT NULL DEFAULT 'none', priority TEXT NOT NULL DEFAULT 'normal',
              completed INTEGER NOT NULL DEFAULT 0, snoozed_until INTEGER NOT NULL DEFAULT 0,
              created_at INTEGER NOT NULL, session_id TEXT REFERENCES sessions(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(due_timestamp);
            CREATE TABLE IF NOT EXISTS calendar_events (
              id TEXT PRIMARY KEY, title TEXT NOT NULL, start_timestamp INTEGER NOT NULL,
              end_timestamp INTEGER NOT NULL, location TEXT, notes TEXT, recurrence TEXT NOT NULL DEFAULT 'none',
              all_day INTEGER NOT NULL DEFAULT 0, reminder_minutes INTEGER NOT NULL DEFAULT 0, created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_calendar_events_start ON calendar_events(start_timestamp);
            CREATE TABLE IF NOT EXISTS episodic_events (
              id TEXT PRIMARY KEY, session_id TEXT NOT NULL, event_type TEXT NOT NULL,
              timestamp INTEGER NOT NULL, domain TEXT NOT NULL, content TEXT NOT NULL,
              importance REAL NOT NULL DEFAULT 0.5
            );
            CREATE INDEX IF NOT EXISTS idx_episodic_events_timestamp ON episodic_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_episodic_events_session ON episodic_events(session_id);
            "#,
        )?;
        conn.execute(
            "INSERT INTO schema_meta(key, value) VALUES ('schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    // ── Sessions ──────────────────────────────────────────────────

    pub fn insert_session(&self, session: &Session) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO sessions (id, started_at, ended_at, message_count, domain, summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
               ended_at = excluded.ended_at,
               message_count = excluded.message_count,
               summary = excluded.summary",
            params![
                session.id,
                session.started_at,
                session.ended_at,
                session.message_count,
                session.domain,
                session.summary,
            ],
        )?;
        Ok(())
    }

    pub fn end_session(&self, id: &str, ended_at: i64, summary: Option<&str>) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE sessions SET ended_at = ?2, summary = ?3 WHERE id = ?1",
            params![id, ended_at, summary],
        )?;
        Ok(())
    }

    pub fn increment_session_messages(&self, id: &str) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute("UPDATE sessions SET message_count = message_count + 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>, RelationalError> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, started_at, ended_at, message_count, domain, summary FROM sessions WHERE id = ?1",
            params![id],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    ended_at: row.get(2)?,
                    message_count: row.get(3)?,
                    domain: row.get(4)?,
                    summary: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    // ── Interactions ─────────────────────────────────────────────

    pub fn insert_interaction(&self, i: &Interaction) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO interactions (id, session_id, user_message, agent_response, domain, timestamp, tokens_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![i.id, i.session_id, i.user_message, i.agent_response, i.domain, i.timestamp, i.tokens_used],
        )?;
        Ok(())
    }

    pub fn last_interactions(&self, session_id: &str, limit: u32) -> Result<Vec<Interaction>, RelationalError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, user_message, agent_response, domain, timestamp, tokens_used
             FROM interactions WHERE session_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![session_id, limit], Self::map_interaction)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut rows = rows;
        rows.reverse();
        Ok(rows)
    }

    /// Simple `LIKE`-based keyword search, used as the semantic-search fallback.
    pub fn keyword_search_interactions(&self, query: &str, limit: u32) -> Result<Vec<Interaction>, RelationalError> {
        let conn = self.open()?;
        let pattern = format!("%{}%", query.replace('%', ""));
        let mut stmt = conn.prepare(
            "SELECT id, session_id, user_message, agent_response, domain, timestamp, tokens_used
             FROM interactions WHERE user_message LIKE ?1 OR agent_response LIKE ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![pattern, limit], Self::map_interaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_interaction(row: &rusqlite::Row) -> rusqlite::Result<Interaction> {
        Ok(Interaction {
            id: row.get(0)?,
            session_id: row.get(1)?,
            user_message: row.get(2)?,
            agent_response: row.get(3)?,
            domain: row.get(4)?,
            timestamp: row.get(5)?,
            tokens_used: row.get(6)?,
        })
    }

    // ── Preferences ──────────────────────────────────────────────

    pub fn set_preference(&self, key: &str, value: &str, domain: &str) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO preferences (key, value, domain, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, domain = excluded.domain, updated_at = excluded.updated_at",
            params![key, value, domain, crate::model::now_ts()],
        )?;
        Ok(())
    }

    pub fn get_preference(&self, key: &str) -> Result<Option<String>, RelationalError> {
        let conn = self.open()?;
        conn.query_row("SELECT value FROM preferences WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    // ── Mistakes ─────────────────────────────────────────────────

    pub fn insert_mistake(&self, m: &Mistake) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO mistakes (id, session_id, user_input, agent_response, correction, domain, error_pattern, timestamp, similar_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                m.id, m.session_id, m.user_input, m.agent_response, m.correction, m.domain,
                m.error_pattern, m.timestamp, m.similar_count
            ],
        )?;
        Ok(())
    }

    pub fn increment_mistake_similar_count(&self, id: &str) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute("UPDATE mistakes SET similar_count = similar_count + 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn get_mistake(&self, id: &str) -> Result<Option<Mistake>, RelationalError> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, session_id, user_input, agent_response, correction, domain, error_pattern, timestamp, similar_count
             FROM mistakes WHERE id = ?1",
            params![id],
            |row| {
                Ok(Mistake {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    user_input: row.get(2)?,
                    agent_response: row.get(3)?,
                    correction: row.get(4)?,
                    domain: row.get(5)?,
                    error_pattern: row.get(6)?,
                    timestamp: row.get(7)?,
                    similar_count: row.get(8)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    // ── Tasks ────────────────────────────────────────────────────

    pub fn insert_task(&self, t: &Task) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO tasks (id, title, notes, done, due_timestamp, created_at, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![t.id, t.title, t.notes, t.done, t.due_timestamp, t.created_at, t.session_id],
        )?;
        Ok(())
    }

    pub fn list_tasks(&self, include_done: bool) -> Result<Vec<Task>, RelationalError> {
        let conn = self.open()?;
        let sql = if include_done {
            "SELECT id, title, notes, done, due_timestamp, created_at, session_id FROM tasks ORDER BY created_at DESC"
        } else {
            "SELECT id, title, notes, done, due_timestamp, created_at, session_id FROM tasks WHERE done = 0 ORDER BY created_at DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], Self::map_task)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn complete_task(&self, id: &str) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute("UPDATE tasks SET done = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn map_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        Ok(Task {
            id: row.get(0)?,
            title: row.get(1)?,
            notes: row.get(2)?,
            done: row.get(3)?,
            due_timestamp: row.get(4)?,
            created_at: row.get(5)?,
            session_id: row.get(6)?,
        })
    }

    // ── Health metrics ───────────────────────────────────────────

    pub fn insert_health_metric(&self, m: &HealthMetric) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO health_metrics (id, metric, value, unit, recorded_at, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![m.id, m.metric, m.value, m.unit, m.recorded_at, m.session_id],
        )?;
        Ok(())
    }

    pub fn recent_health_metrics(&self, limit: u32) -> Result<Vec<HealthMetric>, RelationalError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, metric, value, unit, recorded_at, session_id FROM health_metrics
             ORDER BY recorded_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(HealthMetric {
                    id: row.get(0)?,
                    metric: row.get(1)?,
                    value: row.get(2)?,
                    unit: row.get(3)?,
                    recorded_at: row.get(4)?,
                    session_id: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Reminders ────────────────────────────────────────────────

    pub fn insert_reminder(&self, r: &Reminder) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO reminders (id, title, notes, due_timestamp, recurrence, priority, completed, snoozed_until, created_at, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                r.id, r.title, r.notes, r.due_timestamp, recurrence_to_str(r.recurrence),
                priority_to_str(r.priority), r.completed, r.snoozed_until, r.created_at, r.session_id
            ],
        )?;
        Ok(())
    }

    pub fn due_reminders(&self, now: i64) -> Result<Vec<Reminder>, RelationalError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, notes, due_timestamp, recurrence, priority, completed, snoozed_until, created_at, session_id
             FROM reminders WHERE completed = 0 AND due_timestamp <= ?1 AND (snoozed_until = 0 OR snoozed_until <= ?1)",
        )?;
        let rows = stmt
            .query_map(params![now], Self::map_reminder)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn reschedule_reminder(&self, id: &str, next_due: i64) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute("UPDATE reminders SET due_timestamp = ?2 WHERE id = ?1", params![id, next_due])?;
        Ok(())
    }

    pub fn complete_reminder(&self, id: &str) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute("UPDATE reminders SET completed = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn map_reminder(row: &rusqlite::Row) -> rusqlite::Result<Reminder> {
        let recurrence_str: String = row.get(4)?;
        let priority_str: String = row.get(5)?;
        Ok(Reminder {
            id: row.get(0)?,
            title: row.get(1)?,
            notes: row.get(2)?,
            due_timestamp: row.get(3)?,
            recurrence: recurrence_from_str(&recurrence_str),
            priority: priority_from_str(&priority_str),
            completed: row.get(6)?,
            snoozed_until: row.get(7)?,
            created_at: row.get(8)?,
            session_id: row.get(9)?,
        })
    }

    // ── Calendar events ──────────────────────────────────────────

    pub fn insert_calendar_event(&self, e: &CalendarEvent) -> Result<(), RelationalError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO calendar_events (id, title, start_timestamp, end_timestamp, location, notes, recurrence, all_day, reminder_minutes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                e.id, e.title, e.start_timestamp, e.end_timestamp, e.location, e.notes,
                recurrence_to_str(e.recurrence), e.all_day, e.reminder_minutes, e.created_at
            ],
        )?;
        Ok(())
    }

    pub fn upcoming_events(&self, now: i64) -> Result<Vec<CalendarEvent>, RelationalError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, start_timestamp, end_timestamp, location, notes, recurrence, all_day, reminder_minutes, created_at
             FROM calendar_events WHERE start_timestamp - (reminder_minutes * 60) <= ?1 AND start_timestamp > ?1",
        )?;
        let rows = stmt
            .query_map(params![now], |row| {
                let recurrence_str: String = row.get(6)?;
                Ok(CalendarEvent {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    start_timestamp: row.get(2)?,
                    end_timestamp: row.get(3)?,
                    location: row.get(4)?,
                    notes: row.get(5)?,
                    recurrence: recurrence_from_str(&recurrence_str),
                    all_day: row.get(7)?,
                    reminder_minutes: row.get(8)?,
                    created_at: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Episodic events ──────────────────────────────────────────

    pub fn insert_episodic_event(&self, e: &EpisodicEvent) -> Result<(), RelationalError> {
        let conn = self.open()?;
        let content = serde_json::to_string(&e.content).unwrap_or_else(|_| "null".to_string());
        conn.execute(
            "INSERT INTO episodic_events (id, session_id, event_type, timestamp, domain, content, importance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![e.id, e.session_id, e.event_type, e.timestamp, e.domain, content, e.importance],
        )?;
        Ok(())
    }

    pub fn events_in_range(&self, start: i64, end: i64, limit: u32) -> Result<Vec<EpisodicEvent>, RelationalError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, event_type, timestamp, domain, content, importance
             FROM episodic_events WHERE timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![start, end, limit], Self::map_episodic_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn events_for_session(&self, session_id: &str) -> Result<Vec<EpisodicEvent>, RelationalError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, event_type, timestamp, domain, content, importance
             FROM episodic_events WHERE session_id = ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], Self::map_episodic_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_episodic_event(row: &rusqlite::Row) -> rusqlite::Result<EpisodicEvent> {
        let content_str: String = row.get(5)?;
        let content = serde_json::from_str(&content_str).unwrap_or(serde_json::Value::Null);
        Ok(EpisodicEvent {
            id: row.get(0)?,
            session_id: row.get(1)?,
            event_type: row.get(2)?,
            timestamp: row.get(3)?,
            domain: row.get(4)?,
            content,
            importance: row.get(6)?,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Row counts across the durable tables, for the stats endpoint.
    pub fn counts(&self) -> Result<RelationalCounts, RelationalError> {
        let conn = self.open()?;
        let count = |table: &str| -> Result<u64, RelationalError> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0)).map_err(Into::into)
        };
        Ok(RelationalCounts {
            sessions: count("sessions")?,
            interactions: count("interactions")?,
            mistakes: count("mistakes")?,
            reminders: count("reminders")?,
            calendar_events: count("calendar_events")?,
            tasks: count("tasks")?,
        })
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RelationalCounts {
    pub sessions: u64,
    pub interactions: u64,
    pub mistakes: u64,
    pub reminders: u64,
    pub calendar_events: u64,
    pub tasks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::now_ts;

    fn temp_store() -> (tempfile::TempDir, RelationalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RelationalStore::new(dir.path().join("psycho.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn session_round_trip() {
        let (_dir, store) = temp_store();
        let session = Session::new("s1".into(), "general");
        store.insert_session(&session).unwrap();
        let fetched = store.get_session("s1").unwrap().unwrap();
        assert_eq!(fetched.id, "s1");
        assert_eq!(fetched.message_count, 0);
    }

    #[test]
    fn keyword_search_matches_substring() {
        let (_dir, store) = temp_store();
        let session = Session::new("s1".into(), "general");
        store.insert_session(&session).unwrap();
        store
            .insert_interaction(&Interaction {
                id: "i1".into(),
                session_id: "s1".into(),
                user_message: "tell me about rust ownership".into(),
                agent_response: "ownership tracks a single owner per value".into(),
                domain: "coding".into(),
                timestamp: now_ts(),
                tokens_used: 10,
            })
            .unwrap();
        let hits = store.keyword_search_interactions("ownership", 5).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn due_reminders_respects_snooze() {
        let (_dir, store) = temp_store();
        let now = now_ts();
        store
            .insert_reminder(&Reminder {
                id: "r1".into(),
                title: "call mom".into(),
                notes: None,
                due_timestamp: now - 10,
                recurrence: Recurrence::None,
                priority: Priority::Normal,
                completed: false,
                snoozed_until: now + 1000,
                created_at: now,
                session_id: None,
            })
            .unwrap();
        let due = store.due_reminders(now).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn episodic_events_filter_by_range() {
        let (_dir, store) = temp_store();
        let now = now_ts();
        store
            .insert_episodic_event(&EpisodicEvent {
                id: "e1".into(),
                session_id: "s1".into(),
                event_type: "correction".into(),
                timestamp: now,
                domain: "general".into(),
                content: serde_json::json!({"note": "test"}),
                importance: 0.7,
            })
            .unwrap();
        let events = store.events_in_range(now - 10, now + 10, 10).unwrap();
        assert_eq!(events.len(), 1);
        let outside = store.events_in_range(now + 100, now + 200, 10).unwrap();
        assert!(outside.is_empty());
    }
}

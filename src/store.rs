//! SQLite-backed calendar store, scoped per user.
//!
//! The scheduling core only needs two things from persistence: "list events
//! in [start, end) for user X" and CRUD by id. Everything is stored locally;
//! timestamps are naive ISO-8601 text so range queries can compare
//! lexicographically.

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use crate::model::{parse_timestamp, CalendarEvent, EventDraft, EventType, Frequency};

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub event_type: EventType,
    pub start_time: NaiveDateTime,
    pub duration_minutes: i64,
    pub frequency: Frequency,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

impl StoredEvent {
    pub fn end_time(&self) -> NaiveDateTime {
        self.start_time + Duration::minutes(self.duration_minutes)
    }
}

impl From<&StoredEvent> for CalendarEvent {
    fn from(event: &StoredEvent) -> Self {
        CalendarEvent {
            title: event.title.clone(),
            event_type: event.event_type,
            start_time: event.start_time,
            duration_minutes: event.duration_minutes,
        }
    }
}

/// Fields of an event that callers may change after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventUpdate {
    pub title: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub duration_minutes: Option<i64>,
    pub description: Option<String>,
}

pub struct CalendarStore {
    conn: Mutex<Connection>,
}

impl CalendarStore {
    pub fn open(path: &Path) -> Result<CalendarStore> {
        let conn = Connection::open(path)?;
        initialize(&conn)?;
        Ok(CalendarStore { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<CalendarStore> {
        let conn = Connection::open_in_memory()?;
        initialize(&conn)?;
        Ok(CalendarStore { conn: Mutex::new(conn) })
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    pub fn create_event(&self, user_id: &str, draft: &EventDraft) -> Result<StoredEvent> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let start = draft.start_time.format(TIME_FORMAT).to_string();

        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO calendar_events
                 (id, user_id, title, event_type, start_time, duration_minutes, frequency, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    user_id,
                    draft.title,
                    draft.event_type.as_str(),
                    start,
                    draft.duration_minutes,
                    draft.frequency.as_str(),
                    draft.description,
                    now,
                    now
                ],
            )?;
            Ok(StoredEvent {
                id: id.clone(),
                user_id: user_id.to_string(),
                title: draft.title.clone(),
                event_type: draft.event_type,
                start_time: draft.start_time,
                duration_minutes: draft.duration_minutes,
                frequency: draft.frequency,
                description: draft.description.clone(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    pub fn get_event(&self, user_id: &str, event_id: &str) -> Result<Option<StoredEvent>> {
        self.with_connection(|conn| {
            let result = conn.query_row(
                "SELECT id, user_id, title, event_type, start_time, duration_minutes, frequency, description, created_at, updated_at
                 FROM calendar_events WHERE id = ?1 AND user_id = ?2",
                params![event_id, user_id],
                row_to_event,
            );
            match result {
                Ok(event) => Ok(Some(event)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    /// Apply the non-empty fields of `changes`. Returns false when the event
    /// does not exist for this user.
    pub fn update_event(
        &self,
        user_id: &str,
        event_id: &str,
        changes: &EventUpdate,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            let current = conn.query_row(
                "SELECT title, start_time, duration_minutes, description
                 FROM calendar_events WHERE id = ?1 AND user_id = ?2",
                params![event_id, user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            );
            let (title, start, duration, description) = match current {
                Ok(values) => values,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(false),
                Err(e) => return Err(e),
            };

            let title = changes.title.clone().unwrap_or(title);
            let start = changes
                .start_time
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or(start);
            let duration = changes.duration_minutes.unwrap_or(duration);
            let description = changes.description.clone().unwrap_or(description);

            let updated = conn.execute(
                "UPDATE calendar_events
                 SET title = ?1, start_time = ?2, duration_minutes = ?3, description = ?4, updated_at = ?5
                 WHERE id = ?6 AND user_id = ?7",
                params![title, start, duration, description, now, event_id, user_id],
            )?;
            Ok(updated > 0)
        })
    }

    pub fn delete_event(&self, user_id: &str, event_id: &str) -> Result<bool> {
        self.with_connection(|conn| {
            let deleted = conn.execute(
                "DELETE FROM calendar_events WHERE id = ?1 AND user_id = ?2",
                params![event_id, user_id],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Events with `start <= start_time < end`, chronological.
    pub fn list_events_in_range(
        &self,
        user_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<StoredEvent>> {
        let start = start.format(TIME_FORMAT).to_string();
        let end = end.format(TIME_FORMAT).to_string();
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, event_type, start_time, duration_minutes, frequency, description, created_at, updated_at
                 FROM calendar_events
                 WHERE user_id = ?1 AND start_time >= ?2 AND start_time < ?3
                 ORDER BY start_time",
            )?;
            let events = stmt.query_map(params![user_id, start, end], row_to_event)?;
            events.collect()
        })
    }

    pub fn list_user_events(&self, user_id: &str) -> Result<Vec<StoredEvent>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, event_type, start_time, duration_minutes, frequency, description, created_at, updated_at
                 FROM calendar_events WHERE user_id = ?1 ORDER BY start_time",
            )?;
            let events = stmt.query_map(params![user_id], row_to_event)?;
            events.collect()
        })
    }

    /// Hourly candidate slots within working hours (09:00-17:00) on `date`
    /// that do not overlap any of the user's events. Capped at `max`.
    pub fn find_available_slots(
        &self,
        user_id: &str,
        date: NaiveDate,
        duration_minutes: i64,
        max: usize,
    ) -> Result<Vec<NaiveDateTime>> {
        let day_start = match date.and_hms_opt(0, 0, 0) {
            Some(t) => t,
            None => return Ok(vec![]),
        };
        let events = self.list_events_in_range(user_id, day_start, day_start + Duration::days(1))?;

        let mut slots = Vec::new();
        for hour in 9..17 {
            let slot_start = match date.and_hms_opt(hour, 0, 0) {
                Some(t) => t,
                None => continue,
            };
            let slot_end = slot_start + Duration::minutes(duration_minutes);
            let clear = events.iter().all(|event| {
                !crate::conflict::events_overlap(
                    slot_start,
                    slot_end,
                    event.start_time,
                    event.end_time(),
                )
            });
            if clear {
                slots.push(slot_start);
                if slots.len() >= max {
                    break;
                }
            }
        }
        Ok(slots)
    }
}

fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS calendar_events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            event_type TEXT NOT NULL,
            start_time TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            frequency TEXT NOT NULL DEFAULT 'once',
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_calendar_events_user_start
            ON calendar_events(user_id, start_time);
        ",
    )?;
    Ok(())
}

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<StoredEvent> {
    let start_raw: String = row.get(4)?;
    let start_time = parse_timestamp(&start_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {}", start_raw).into(),
        )
    })?;
    Ok(StoredEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        event_type: EventType::from_str(&row.get::<_, String>(3)?),
        start_time,
        duration_minutes: row.get(5)?,
        frequency: Frequency::from_str(&row.get::<_, String>(6)?),
        description: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

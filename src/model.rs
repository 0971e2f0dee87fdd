//! Shared data model for the scheduling pipeline.
//!
//! Everything here is plain data: the parser produces `EventDraft`s, the
//! expander clones them across a series, and the conflict resolver consumes
//! them together with normalized `CalendarEvent` records.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ============ Event Types ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Therapy,
    Exercise,
    Journaling,
    Meal,
    Work,
    Personal,
    Social,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Therapy => "therapy",
            EventType::Exercise => "exercise",
            EventType::Journaling => "journaling",
            EventType::Meal => "meal",
            EventType::Work => "work",
            EventType::Personal => "personal",
            EventType::Social => "social",
        }
    }

    /// Unrecognized strings fall back to `Personal`.
    pub fn from_str(s: &str) -> EventType {
        match s.to_lowercase().as_str() {
            "therapy" => EventType::Therapy,
            "exercise" => EventType::Exercise,
            "journaling" => EventType::Journaling,
            "meal" => EventType::Meal,
            "work" => EventType::Work,
            "social" => EventType::Social,
            _ => EventType::Personal,
        }
    }

    /// Fixed priority used for severity scoring and auto-resolution order.
    pub fn priority(&self) -> u8 {
        match self {
            EventType::Therapy => 9,
            EventType::Work => 8,
            EventType::Personal => 7,
            EventType::Exercise => 6,
            EventType::Journaling => 5,
            EventType::Meal => 4,
            EventType::Social => 3,
        }
    }

    /// Default duration in minutes when the request does not state one.
    pub fn default_duration_minutes(&self) -> i64 {
        match self {
            EventType::Therapy => 60,
            EventType::Exercise => 30,
            EventType::Journaling => 15,
            EventType::Meal => 60,
            EventType::Work => 60,
            EventType::Personal => 30,
            EventType::Social => 120,
        }
    }

    /// Preferred hours of day when rescheduling onto another day.
    pub fn preferred_hours(&self) -> &'static [u32] {
        match self {
            EventType::Therapy => &[18, 19, 20],
            EventType::Exercise => &[7, 8, 17, 18],
            EventType::Journaling => &[8, 9, 21, 22],
            EventType::Work => &[9, 10, 14, 15],
            EventType::Personal => &[10, 11, 14, 15, 16],
            EventType::Meal => &[12, 13, 18, 19],
            EventType::Social => &[18, 19, 20],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Once => "once",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Frequency {
        match s.to_lowercase().as_str() {
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            "biweekly" => Frequency::Biweekly,
            "monthly" => Frequency::Monthly,
            _ => Frequency::Once,
        }
    }
}

// ============ Drafts & Recurrence ============

/// A proposed, not-yet-persisted event.
///
/// Drafts are only emitted once both `start_time` and `duration_minutes`
/// are resolved; the parser drops anything it cannot complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub event_type: EventType,
    pub start_time: NaiveDateTime,
    pub duration_minutes: i64,
    pub frequency: Frequency,
    pub description: String,
}

impl EventDraft {
    pub fn end_time(&self) -> NaiveDateTime {
        self.start_time + Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundUnit {
    Days,
    Weeks,
    Months,
}

/// How long a recurring series runs, e.g. "for 4 weeks".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesBound {
    pub count: i64,
    pub unit: BoundUnit,
}

/// Recurrence derived from text, attached to one template draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    pub frequency: Frequency,
    /// 0 = Monday .. 6 = Sunday; sorted and deduplicated. When non-empty
    /// the weekly expansion emits one instance per listed weekday.
    pub weekdays: Vec<u32>,
    pub series_end: Option<SeriesBound>,
}

impl RecurrencePattern {
    /// Series bound applied when the request did not state one.
    pub fn effective_bound(&self) -> SeriesBound {
        if let Some(bound) = self.series_end {
            return bound;
        }
        match self.frequency {
            Frequency::Daily => SeriesBound { count: 30, unit: BoundUnit::Days },
            Frequency::Weekly => SeriesBound { count: 8, unit: BoundUnit::Weeks },
            Frequency::Biweekly => SeriesBound { count: 12, unit: BoundUnit::Weeks },
            Frequency::Monthly => SeriesBound { count: 6, unit: BoundUnit::Months },
            Frequency::Once => SeriesBound { count: 4, unit: BoundUnit::Weeks },
        }
    }
}

// ============ Calendar Records ============

/// Canonical shape of an already-committed calendar event, after boundary
/// normalization. The resolver only ever sees this form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub title: String,
    pub event_type: EventType,
    pub start_time: NaiveDateTime,
    pub duration_minutes: i64,
}

impl CalendarEvent {
    pub fn end_time(&self) -> NaiveDateTime {
        self.start_time + Duration::minutes(self.duration_minutes)
    }
}

impl From<&EventDraft> for CalendarEvent {
    fn from(draft: &EventDraft) -> Self {
        CalendarEvent {
            title: draft.title.clone(),
            event_type: draft.event_type,
            start_time: draft.start_time,
            duration_minutes: draft.duration_minutes,
        }
    }
}

/// Raw external record. Calendar sources disagree on field names, so the
/// aliases absorb both conventions before anything downstream runs.
#[derive(Debug, Deserialize)]
struct RawCalendarRecord {
    title: Option<String>,
    #[serde(alias = "type")]
    event_type: Option<String>,
    #[serde(alias = "scheduledTime")]
    datetime: Option<String>,
    #[serde(alias = "durationMinutes")]
    duration: Option<i64>,
}

/// Parse a timestamp that may arrive as RFC 3339 (with or without a zone
/// suffix) or a bare `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()
}

/// Map heterogeneous external records into the canonical shape.
///
/// Records without a usable start time are skipped; a missing duration
/// defaults to 60 minutes; a missing type defaults to `personal`.
pub fn normalize_records(records: &[serde_json::Value]) -> Vec<CalendarEvent> {
    let mut normalized = Vec::new();
    for value in records {
        let raw: RawCalendarRecord = match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        let start_time = match raw.datetime.as_deref().and_then(parse_timestamp) {
            Some(ts) => ts,
            None => continue,
        };
        normalized.push(CalendarEvent {
            title: raw.title.unwrap_or_else(|| "Untitled".to_string()),
            event_type: raw
                .event_type
                .map(|t| EventType::from_str(&t))
                .unwrap_or(EventType::Personal),
            start_time,
            duration_minutes: raw.duration.unwrap_or(60),
        });
    }
    normalized
}

// ============ Conflicts & Resolutions ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Whether the clashing event was already on the calendar or is another
/// event proposed in the same request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSource {
    Existing,
    Proposed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub source: ConflictSource,
    pub other: CalendarEvent,
    pub overlap_start: NaiveDateTime,
    pub overlap_end: NaiveDateTime,
}

/// All conflicts found for one proposed event. Events with zero conflicts
/// never get a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub event: EventDraft,
    pub conflicts: Vec<ConflictDetail>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    RescheduleSameDay,
    RescheduleNextDay,
    ReduceDuration,
    KeepConflict,
}

/// One candidate fix for a conflicted event, ranked by `priority`
/// (higher first). Next-day options are generated without re-checking the
/// calendar and are marked `tentative`; the orchestration layer re-validates
/// them before persisting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOption {
    pub kind: ResolutionKind,
    pub new_start: Option<NaiveDateTime>,
    pub new_duration: Option<i64>,
    pub description: String,
    pub priority: u8,
    pub tentative: bool,
}

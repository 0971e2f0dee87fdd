//! Scheduling orchestration.
//!
//! Sequences the pipeline (parse -> expand -> conflict check) against the
//! calendar store, persists what lands cleanly, and stashes conflicted
//! drafts in the session store until the user picks a resolution. All
//! user-facing I/O happens above this layer; this module only produces
//! structured responses plus a plain-text summary.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;

use crate::conflict::{events_overlap, ConflictResolver};
use crate::gemini::GeminiClient;
use crate::logging::{log_calendar, log_conflict, log_parser, log_recurrence, log_session};
use crate::model::{CalendarEvent, ConflictRecord, EventDraft, ResolutionKind};
use crate::parser::{EventParser, ParseOutcome};
use crate::recurrence::SeriesExpander;
use crate::session::{PendingResolution, SessionStore};
use crate::store::{CalendarStore, EventUpdate, StoredEvent};

/// How far ahead the reference calendar is fetched for conflict checks.
const LOOKAHEAD_DAYS: i64 = 180;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SchedulingResponse {
    /// Everything landed; events are persisted.
    Scheduled {
        events: Vec<StoredEvent>,
        message: String,
    },
    /// Some drafts clash. Conflict-free drafts from the same request are
    /// already persisted in `scheduled`; the rest wait in the session.
    NeedsResolution {
        scheduled: Vec<StoredEvent>,
        pending: Vec<PendingResolution>,
        message: String,
    },
    /// Nothing parseable (or no pending state to act on).
    NeedsClarification { message: String },
}

/// Result of an update with conflict re-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated { event: StoredEvent },
    Conflicted { records: Vec<ConflictRecord> },
    NotFound,
}

pub struct SchedulingOrchestrator {
    parser: EventParser,
    expander: SeriesExpander,
    resolver: ConflictResolver,
    llm: Option<GeminiClient>,
}

impl SchedulingOrchestrator {
    /// Uses `GEMINI_API_KEY` for reply phrasing when present.
    pub fn new() -> Self {
        SchedulingOrchestrator {
            parser: EventParser::new(),
            expander: SeriesExpander::new(),
            resolver: ConflictResolver::new(),
            llm: GeminiClient::from_env(),
        }
    }

    pub fn with_client(client: GeminiClient) -> Self {
        SchedulingOrchestrator {
            parser: EventParser::new(),
            expander: SeriesExpander::new(),
            resolver: ConflictResolver::new(),
            llm: Some(client),
        }
    }

    /// Handle one free-text scheduling request.
    pub fn handle_request(
        &self,
        user_id: &str,
        text: &str,
        now: NaiveDateTime,
        store: &CalendarStore,
        sessions: &SessionStore,
    ) -> Result<SchedulingResponse, Box<dyn Error + Send + Sync>> {
        let proposed = match self.parse_and_expand(user_id, text, now) {
            Some(proposed) => proposed,
            None => {
                return Ok(SchedulingResponse::NeedsClarification {
                    message: "I couldn't find a time in that request. Try something like \
                              'Schedule therapy tomorrow at 6pm'."
                        .to_string(),
                })
            }
        };

        let reference = self.reference_calendar(user_id, now, store)?;
        let records = self.resolver.check_bulk_conflicts(&reference, &proposed);

        if records.is_empty() {
            let mut stored = Vec::new();
            for draft in &proposed {
                stored.push(store.create_event(user_id, draft)?);
            }
            log_calendar(
                Some(user_id),
                &format!("Created {} event(s) with no conflicts", stored.len()),
            );
            let message = format_scheduled(&stored);
            return Ok(SchedulingResponse::Scheduled { events: stored, message });
        }

        // Persist the conflict-free subset, stash the rest for resolution.
        let conflicted_starts: Vec<NaiveDateTime> =
            records.iter().map(|r| r.event.start_time).collect();
        let mut scheduled = Vec::new();
        for draft in &proposed {
            if !conflicted_starts.contains(&draft.start_time) {
                scheduled.push(store.create_event(user_id, draft)?);
            }
        }

        let pending: Vec<PendingResolution> = records
            .into_iter()
            .map(|record| {
                let options = self
                    .resolver
                    .generate_resolution_options(&record.event, &record.conflicts);
                PendingResolution { record, options }
            })
            .collect();

        log_conflict(
            Some(user_id),
            &format!(
                "{} conflicted draft(s), {} persisted cleanly",
                pending.len(),
                scheduled.len()
            ),
        );
        sessions.put_pending(user_id, pending.clone());
        log_session(Some(user_id), "Stored pending resolutions");

        let message = format_conflicts(&scheduled, &pending);
        Ok(SchedulingResponse::NeedsResolution { scheduled, pending, message })
    }

    /// Apply the user's chosen resolution option for one pending event.
    /// Tentative next-day options are re-validated against the calendar
    /// before anything is persisted.
    pub fn apply_resolution(
        &self,
        user_id: &str,
        event_index: usize,
        option_index: usize,
        store: &CalendarStore,
        sessions: &SessionStore,
    ) -> Result<SchedulingResponse, Box<dyn Error + Send + Sync>> {
        let mut pending = match sessions.take_pending(user_id) {
            Some(pending) => pending,
            None => {
                return Ok(SchedulingResponse::NeedsClarification {
                    message: "There are no conflicts waiting for a decision.".to_string(),
                })
            }
        };

        if event_index >= pending.len()
            || option_index >= pending[event_index].options.len()
        {
            let message = format!(
                "Pick an event (0-{}) and one of its listed options.",
                pending.len().saturating_sub(1)
            );
            sessions.put_pending(user_id, pending);
            return Ok(SchedulingResponse::NeedsClarification { message });
        }

        let resolution = pending.remove(event_index);
        let option = resolution.options[option_index].clone();
        let mut draft = resolution.record.event.clone();

        match option.kind {
            ResolutionKind::RescheduleSameDay | ResolutionKind::RescheduleNextDay => {
                if let Some(new_start) = option.new_start {
                    if option.tentative
                        && !self.slot_is_free(user_id, new_start, draft.duration_minutes, store)?
                    {
                        // The assumed-free slot is actually taken; hand the
                        // choice back instead of double-booking.
                        pending.insert(event_index, resolution);
                        sessions.put_pending(user_id, pending);
                        return Ok(SchedulingResponse::NeedsClarification {
                            message: format!(
                                "{} is already booked. Please pick another option.",
                                new_start.format("%A %I:%M %p")
                            ),
                        });
                    }
                    draft.start_time = new_start;
                }
            }
            ResolutionKind::ReduceDuration => {
                if let Some(new_duration) = option.new_duration {
                    draft.duration_minutes = new_duration;
                }
            }
            ResolutionKind::KeepConflict => {}
        }

        let stored = store.create_event(user_id, &draft)?;
        log_calendar(
            Some(user_id),
            &format!("Resolved '{}' via {:?}", stored.title, option.kind),
        );

        if pending.is_empty() {
            sessions.clear(user_id);
        } else {
            sessions.put_pending(user_id, pending.clone());
        }

        let message = format!(
            "Scheduled '{}' for {}.{}",
            stored.title,
            stored.start_time.format("%A, %B %d at %I:%M %p"),
            if pending.is_empty() {
                String::new()
            } else {
                format!(" {} conflict(s) still need a decision.", pending.len())
            }
        );
        Ok(SchedulingResponse::Scheduled { events: vec![stored], message })
    }

    /// Best-effort automatic scheduling: greedy priority placement with one
    /// same-day retry per event; whatever cannot be placed lands in the
    /// session for manual resolution.
    pub fn auto_schedule(
        &self,
        user_id: &str,
        text: &str,
        now: NaiveDateTime,
        store: &CalendarStore,
        sessions: &SessionStore,
    ) -> Result<SchedulingResponse, Box<dyn Error + Send + Sync>> {
        let proposed = match self.parse_and_expand(user_id, text, now) {
            Some(proposed) => proposed,
            None => {
                return Ok(SchedulingResponse::NeedsClarification {
                    message: "I couldn't find a time in that request.".to_string(),
                })
            }
        };

        let mut reference = self.reference_calendar(user_id, now, store)?;
        let result = self.resolver.auto_resolve_conflicts(&reference, &proposed);
        log_conflict(
            Some(user_id),
            &format!(
                "Auto-resolution placed {} of {} event(s)",
                result.resolved.len(),
                proposed.len()
            ),
        );

        let mut stored = Vec::new();
        for draft in &result.resolved {
            stored.push(store.create_event(user_id, draft)?);
        }

        if result.success {
            let message = format_scheduled(&stored);
            return Ok(SchedulingResponse::Scheduled { events: stored, message });
        }

        // Whatever remains could not be placed; surface it with options
        // computed against the full picture, placed events included.
        reference.extend(result.resolved.iter().map(CalendarEvent::from));
        let records = self
            .resolver
            .check_bulk_conflicts(&reference, &result.remaining_conflicts);
        let pending: Vec<PendingResolution> = records
            .into_iter()
            .map(|record| {
                let options = self
                    .resolver
                    .generate_resolution_options(&record.event, &record.conflicts);
                PendingResolution { record, options }
            })
            .collect();
        sessions.put_pending(user_id, pending.clone());

        let message = format_conflicts(&stored, &pending);
        Ok(SchedulingResponse::NeedsResolution { scheduled: stored, pending, message })
    }

    /// Update a stored event, re-checking conflicts against everything on
    /// the calendar except the event itself.
    pub fn update_event(
        &self,
        user_id: &str,
        event_id: &str,
        changes: &EventUpdate,
        store: &CalendarStore,
    ) -> Result<UpdateOutcome, Box<dyn Error + Send + Sync>> {
        let current = match store.get_event(user_id, event_id)? {
            Some(event) => event,
            None => return Ok(UpdateOutcome::NotFound),
        };

        let mut draft = EventDraft {
            title: current.title.clone(),
            event_type: current.event_type,
            start_time: current.start_time,
            duration_minutes: current.duration_minutes,
            frequency: current.frequency,
            description: current.description.clone(),
        };
        if let Some(title) = &changes.title {
            draft.title = title.clone();
        }
        if let Some(start) = changes.start_time {
            draft.start_time = start;
        }
        if let Some(duration) = changes.duration_minutes {
            draft.duration_minutes = duration;
        }

        let others: Vec<CalendarEvent> = store
            .list_user_events(user_id)?
            .iter()
            .filter(|event| event.id != event_id)
            .map(CalendarEvent::from)
            .collect();
        let records = self.resolver.check_bulk_conflicts(&others, &[draft]);
        if !records.is_empty() {
            log_conflict(Some(user_id), "Update rejected: new slot conflicts");
            return Ok(UpdateOutcome::Conflicted { records });
        }

        store.update_event(user_id, event_id, changes)?;
        let updated = store
            .get_event(user_id, event_id)?
            .ok_or("event disappeared during update")?;
        log_calendar(Some(user_id), &format!("Updated '{}'", updated.title));
        Ok(UpdateOutcome::Updated { event: updated })
    }

    /// Plain-text calendar listing between `from` (inclusive) and `to`
    /// (exclusive), grouped by date.
    pub fn format_calendar(
        &self,
        user_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
        store: &CalendarStore,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let events = store.list_events_in_range(user_id, from, to)?;
        if events.is_empty() {
            return Ok("Your calendar is empty for this period.".to_string());
        }

        let mut by_date: BTreeMap<chrono::NaiveDate, Vec<&StoredEvent>> = BTreeMap::new();
        for event in &events {
            by_date.entry(event.start_time.date()).or_default().push(event);
        }

        let mut out = String::from("Your calendar:\n");
        for (date, day_events) in by_date {
            out.push_str(&format!("\n{}\n", date.format("%A, %B %d")));
            for event in day_events {
                out.push_str(&format!(
                    "  - {} {} ({} min, {})\n",
                    event.start_time.format("%I:%M %p"),
                    event.title,
                    event.duration_minutes,
                    event.event_type.as_str()
                ));
            }
        }
        Ok(out)
    }

    /// Rephrase a deterministic summary through the LLM when a client is
    /// configured; otherwise (or on any error) return the summary as-is.
    pub async fn compose_reply(&self, user_id: &str, summary: &str) -> String {
        let client = match &self.llm {
            Some(client) => client,
            None => return summary.to_string(),
        };
        let system = "You are a warm, concise scheduling assistant. Rephrase the \
                      following scheduling summary for the user without changing \
                      any dates, times, or counts.";
        match client.generate(Some(system), summary, 0.4, Some(512)).await {
            Ok(reply) => reply,
            Err(e) => {
                crate::logging::log_error(
                    Some(user_id),
                    &format!("Reply phrasing failed, using fallback: {}", e),
                );
                summary.to_string()
            }
        }
    }

    // ============ Internals ============

    fn parse_and_expand(
        &self,
        user_id: &str,
        text: &str,
        now: NaiveDateTime,
    ) -> Option<Vec<EventDraft>> {
        let outcome = self.parser.parse(text, now);
        let proposed = match outcome {
            ParseOutcome::Events(events) => {
                log_parser(
                    Some(user_id),
                    &format!("Parsed {} one-shot draft(s)", events.len()),
                );
                events
            }
            ParseOutcome::Recurring { template, pattern } => {
                let instances = self.expander.expand(&template, &pattern);
                log_recurrence(
                    Some(user_id),
                    &format!(
                        "Expanded '{}' into {} {} instance(s)",
                        template.title,
                        instances.len(),
                        pattern.frequency.as_str()
                    ),
                );
                instances
            }
        };
        if proposed.is_empty() {
            None
        } else {
            Some(proposed)
        }
    }

    fn reference_calendar(
        &self,
        user_id: &str,
        now: NaiveDateTime,
        store: &CalendarStore,
    ) -> Result<Vec<CalendarEvent>, Box<dyn Error + Send + Sync>> {
        let from = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);
        let to = from + Duration::days(LOOKAHEAD_DAYS);
        let events = store.list_events_in_range(user_id, from, to)?;
        Ok(events.iter().map(CalendarEvent::from).collect())
    }

    fn slot_is_free(
        &self,
        user_id: &str,
        start: NaiveDateTime,
        duration_minutes: i64,
        store: &CalendarStore,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let day_start = start.date().and_hms_opt(0, 0, 0).unwrap_or(start);
        let events =
            store.list_events_in_range(user_id, day_start, day_start + Duration::days(1))?;
        let end = start + Duration::minutes(duration_minutes);
        Ok(events
            .iter()
            .all(|event| !events_overlap(start, end, event.start_time, event.end_time())))
    }
}

impl Default for SchedulingOrchestrator {
    fn default() -> Self {
        SchedulingOrchestrator::new()
    }
}

// ============ Formatting ============

fn format_scheduled(events: &[StoredEvent]) -> String {
    match events.len() {
        0 => "Nothing was scheduled.".to_string(),
        1 => format!(
            "Scheduled '{}' for {} ({} minutes).",
            events[0].title,
            events[0].start_time.format("%A, %B %d at %I:%M %p"),
            events[0].duration_minutes
        ),
        n => {
            let first = &events[0];
            let last = &events[n - 1];
            format!(
                "Scheduled {} events from {} through {}.",
                n,
                first.start_time.format("%B %d"),
                last.start_time.format("%B %d")
            )
        }
    }
}

fn format_conflicts(scheduled: &[StoredEvent], pending: &[PendingResolution]) -> String {
    let mut out = String::new();
    if !scheduled.is_empty() {
        out.push_str(&format!(
            "Scheduled {} event(s) without conflicts. ",
            scheduled.len()
        ));
    }
    out.push_str(&format!(
        "{} event(s) conflict with your calendar:\n",
        pending.len()
    ));
    for (i, item) in pending.iter().enumerate() {
        out.push_str(&format!(
            "{}. '{}' at {} ({} severity)\n",
            i + 1,
            item.record.event.title,
            item.record.event.start_time.format("%A %I:%M %p"),
            item.record.severity.as_str()
        ));
        for (j, option) in item.options.iter().enumerate() {
            out.push_str(&format!("   {}) {}\n", j + 1, option.description));
        }
    }
    out
}

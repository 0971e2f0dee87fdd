//! Conflict detection and resolution.
//!
//! Pure computation over in-memory drafts and normalized calendar records:
//! overlap tests, severity scoring, ranked resolution options and a greedy
//! auto-resolution pass. No operation here errors for "no solution found";
//! absence is an empty list or a non-empty remainder.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::model::{
    CalendarEvent, ConflictDetail, ConflictRecord, ConflictSource, EventDraft, ResolutionKind,
    ResolutionOption, Severity,
};

/// Strict half-open interval overlap. Touching endpoints do not count, so
/// back-to-back events never conflict.
pub fn events_overlap(
    start_a: NaiveDateTime,
    end_a: NaiveDateTime,
    start_b: NaiveDateTime,
    end_b: NaiveDateTime,
) -> bool {
    start_a < end_b && start_b < end_a
}

/// Result of the greedy auto-resolution pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoResolution {
    pub resolved: Vec<EventDraft>,
    pub remaining_conflicts: Vec<EventDraft>,
    pub success: bool,
}

pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        ConflictResolver
    }

    /// Check every proposed event against the existing calendar and against
    /// every other proposed event. Events with zero conflicts are omitted
    /// from the result entirely.
    pub fn check_bulk_conflicts(
        &self,
        existing: &[CalendarEvent],
        proposed: &[EventDraft],
    ) -> Vec<ConflictRecord> {
        let mut records = Vec::new();

        for (i, event) in proposed.iter().enumerate() {
            let start = event.start_time;
            let end = event.end_time();
            let mut details = Vec::new();

            for other in existing {
                if events_overlap(start, end, other.start_time, other.end_time()) {
                    details.push(ConflictDetail {
                        source: ConflictSource::Existing,
                        other: other.clone(),
                        overlap_start: start.max(other.start_time),
                        overlap_end: end.min(other.end_time()),
                    });
                }
            }

            for (j, other) in proposed.iter().enumerate() {
                if i == j {
                    continue;
                }
                if events_overlap(start, end, other.start_time, other.end_time()) {
                    details.push(ConflictDetail {
                        source: ConflictSource::Proposed,
                        other: CalendarEvent::from(other),
                        overlap_start: start.max(other.start_time),
                        overlap_end: end.min(other.end_time()),
                    });
                }
            }

            if !details.is_empty() {
                let severity = conflict_severity(&details);
                records.push(ConflictRecord { event: event.clone(), conflicts: details, severity });
            }
        }

        records
    }

    /// Produce candidate fixes for one conflicted event, sorted by
    /// descending priority. The list always ends with keep-conflict.
    pub fn generate_resolution_options(
        &self,
        event: &EventDraft,
        conflicts: &[ConflictDetail],
    ) -> Vec<ResolutionOption> {
        let busy: Vec<(NaiveDateTime, NaiveDateTime)> = conflicts
            .iter()
            .map(|detail| (detail.other.start_time, detail.other.end_time()))
            .collect();

        let mut options = Vec::new();

        for alt in self.find_alternative_times_same_day(
            event.start_time,
            event.duration_minutes,
            &busy,
        ) {
            options.push(ResolutionOption {
                kind: ResolutionKind::RescheduleSameDay,
                new_start: Some(alt),
                new_duration: None,
                description: format!("Move to {} on the same day", alt.format("%I:%M %p")),
                priority: 8,
                tentative: false,
            });
        }

        if let Some(next_day) = self.find_next_available_day(event, &busy) {
            options.push(ResolutionOption {
                kind: ResolutionKind::RescheduleNextDay,
                new_start: Some(next_day),
                new_duration: None,
                description: format!("Move to {}", next_day.format("%A %I:%M %p")),
                priority: 6,
                tentative: true,
            });
        }

        if event.duration_minutes > 30 {
            let shorter = (event.duration_minutes - 30).max(30);
            options.push(ResolutionOption {
                kind: ResolutionKind::ReduceDuration,
                new_start: None,
                new_duration: Some(shorter),
                description: format!("Reduce duration to {} minutes", shorter),
                priority: 4,
                tentative: false,
            });
        }

        options.push(ResolutionOption {
            kind: ResolutionKind::KeepConflict,
            new_start: None,
            new_duration: None,
            description: "Keep the conflict and decide later".to_string(),
            priority: 2,
            tentative: false,
        });

        options.sort_by(|a, b| b.priority.cmp(&a.priority));
        options
    }

    /// Scan every 30-minute boundary between 08:00 and 22:00 on the event's
    /// date for a window clear of the supplied busy intervals. Returns at
    /// most three candidate starts.
    pub fn find_alternative_times_same_day(
        &self,
        original: NaiveDateTime,
        duration_minutes: i64,
        busy: &[(NaiveDateTime, NaiveDateTime)],
    ) -> Vec<NaiveDateTime> {
        let day_start = match original.date().and_hms_opt(8, 0, 0) {
            Some(t) => t,
            None => return vec![],
        };
        let day_end = match original.date().and_hms_opt(22, 0, 0) {
            Some(t) => t,
            None => return vec![],
        };

        let mut alternatives = Vec::new();
        let mut current = day_start;
        while current + Duration::minutes(duration_minutes) <= day_end {
            let slot_end = current + Duration::minutes(duration_minutes);
            let clear = busy
                .iter()
                .all(|(busy_start, busy_end)| {
                    !events_overlap(current, slot_end, *busy_start, *busy_end)
                });

            if clear {
                alternatives.push(current);
                if alternatives.len() >= 3 {
                    break;
                }
            }
            current += Duration::minutes(30);
        }
        alternatives
    }

    /// First slot within the next seven days at the event type's preferred
    /// hours that clears the supplied busy intervals. Does not consult the
    /// wider calendar; callers see the option flagged tentative and
    /// re-validate before committing.
    fn find_next_available_day(
        &self,
        event: &EventDraft,
        busy: &[(NaiveDateTime, NaiveDateTime)],
    ) -> Option<NaiveDateTime> {
        let hours = event.event_type.preferred_hours();
        for days_ahead in 1..=7 {
            let target = event.start_time + Duration::days(days_ahead);
            for &hour in hours {
                let candidate = match target.date().and_hms_opt(hour, 0, 0) {
                    Some(t) => t,
                    None => continue,
                };
                let candidate_end = candidate + Duration::minutes(event.duration_minutes);
                let clear = busy.iter().all(|(busy_start, busy_end)| {
                    !events_overlap(candidate, candidate_end, *busy_start, *busy_end)
                });
                if clear {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Stable sort by event-type priority, highest first.
    pub fn prioritize_events(&self, events: &[EventDraft]) -> Vec<EventDraft> {
        let mut prioritized = events.to_vec();
        prioritized.sort_by(|a, b| b.event_type.priority().cmp(&a.event_type.priority()));
        prioritized
    }

    /// Greedy best-effort placement: stored calendar events claim their
    /// intervals up front, then highest-priority drafts claim their slots,
    /// conflicted drafts get one same-day retry against the accumulated
    /// intervals, and anything still clashing lands in
    /// `remaining_conflicts`. Never backtracks.
    pub fn auto_resolve_conflicts(
        &self,
        existing: &[CalendarEvent],
        events: &[EventDraft],
    ) -> AutoResolution {
        let mut resolved = Vec::new();
        let mut remaining = Vec::new();
        let mut occupied: Vec<(NaiveDateTime, NaiveDateTime)> = existing
            .iter()
            .map(|event| (event.start_time, event.end_time()))
            .collect();

        for event in self.prioritize_events(events) {
            let start = event.start_time;
            let end = event.end_time();

            let clashes = occupied
                .iter()
                .any(|(busy_start, busy_end)| events_overlap(start, end, *busy_start, *busy_end));

            if !clashes {
                occupied.push((start, end));
                resolved.push(event);
                continue;
            }

            let alternatives =
                self.find_alternative_times_same_day(start, event.duration_minutes, &occupied);
            match alternatives.first() {
                Some(&alt) => {
                    let mut relocated = event.clone();
                    relocated.start_time = alt;
                    occupied.push((alt, relocated.end_time()));
                    resolved.push(relocated);
                }
                None => remaining.push(event),
            }
        }

        let success = remaining.is_empty();
        AutoResolution { resolved, remaining_conflicts: remaining, success }
    }
}

fn conflict_severity(conflicts: &[ConflictDetail]) -> Severity {
    if conflicts.is_empty() {
        return Severity::None;
    }
    if conflicts.iter().any(|detail| detail.other.event_type.priority() >= 8) {
        return Severity::High;
    }
    if conflicts.len() > 1 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventType, Frequency};
    use chrono::{NaiveDate, Timelike};

    fn at(d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    fn draft(title: &str, event_type: EventType, start: NaiveDateTime, minutes: i64) -> EventDraft {
        EventDraft {
            title: title.to_string(),
            event_type,
            start_time: start,
            duration_minutes: minutes,
            frequency: Frequency::Once,
            description: title.to_lowercase(),
        }
    }

    fn calendar(title: &str, event_type: EventType, start: NaiveDateTime, minutes: i64) -> CalendarEvent {
        CalendarEvent {
            title: title.to_string(),
            event_type,
            start_time: start,
            duration_minutes: minutes,
        }
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let (a1, a2) = (at(3, 14, 0), at(3, 15, 0));
        let (b1, b2) = (at(3, 14, 30), at(3, 16, 0));
        assert_eq!(events_overlap(a1, a2, b1, b2), events_overlap(b1, b2, a1, a2));
        assert!(events_overlap(a1, a2, b1, b2));
    }

    #[test]
    fn test_touching_intervals_do_not_conflict() {
        assert!(!events_overlap(at(3, 13, 0), at(3, 14, 0), at(3, 14, 0), at(3, 15, 0)));
        assert!(!events_overlap(at(3, 14, 0), at(3, 15, 0), at(3, 13, 0), at(3, 14, 0)));
    }

    #[test]
    fn test_containment_overlaps() {
        assert!(events_overlap(at(3, 13, 0), at(3, 17, 0), at(3, 14, 0), at(3, 15, 0)));
    }

    #[test]
    fn test_bulk_conflicts_low_severity_single_hit() {
        let resolver = ConflictResolver::new();
        let existing = vec![calendar("meeting", EventType::Personal, at(3, 14, 0), 60)];
        let proposed = vec![draft("Dentist", EventType::Personal, at(3, 14, 30), 30)];

        let records = resolver.check_bulk_conflicts(&existing, &proposed);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.severity, Severity::Low);
        assert_eq!(record.conflicts.len(), 1);
        assert_eq!(record.conflicts[0].source, ConflictSource::Existing);
        assert_eq!(record.conflicts[0].overlap_start, at(3, 14, 30));
        assert_eq!(record.conflicts[0].overlap_end, at(3, 15, 0));
    }

    #[test]
    fn test_high_severity_when_blocking_therapy() {
        let resolver = ConflictResolver::new();
        let existing = vec![calendar("Therapy Session", EventType::Therapy, at(3, 18, 0), 60)];
        let proposed = vec![draft("Gym", EventType::Exercise, at(3, 18, 30), 30)];
        let records = resolver.check_bulk_conflicts(&existing, &proposed);
        assert_eq!(records[0].severity, Severity::High);
    }

    #[test]
    fn test_medium_severity_on_multiple_low_priority_hits() {
        let resolver = ConflictResolver::new();
        let existing = vec![
            calendar("Lunch", EventType::Meal, at(3, 12, 0), 60),
            calendar("Coffee", EventType::Social, at(3, 12, 30), 60),
        ];
        let proposed = vec![draft("Errand", EventType::Personal, at(3, 12, 15), 60)];
        let records = resolver.check_bulk_conflicts(&existing, &proposed);
        assert_eq!(records[0].conflicts.len(), 2);
        assert_eq!(records[0].severity, Severity::Medium);
    }

    #[test]
    fn test_conflict_free_events_are_omitted() {
        let resolver = ConflictResolver::new();
        let existing = vec![calendar("meeting", EventType::Work, at(3, 14, 0), 60)];
        let proposed = vec![
            draft("Clash", EventType::Personal, at(3, 14, 30), 30),
            draft("Clean", EventType::Personal, at(3, 9, 0), 30),
        ];
        let records = resolver.check_bulk_conflicts(&existing, &proposed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event.title, "Clash");
    }

    #[test]
    fn test_cross_proposed_conflicts_detected() {
        let resolver = ConflictResolver::new();
        let proposed = vec![
            draft("One", EventType::Work, at(3, 10, 0), 60),
            draft("Two", EventType::Personal, at(3, 10, 30), 60),
        ];
        let records = resolver.check_bulk_conflicts(&[], &proposed);
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.conflicts.iter().all(|c| c.source == ConflictSource::Proposed)));
    }

    #[test]
    fn test_resolution_ranking_monotone_keep_conflict_last() {
        let resolver = ConflictResolver::new();
        let existing = vec![calendar("meeting", EventType::Personal, at(3, 14, 0), 60)];
        let proposed = vec![draft("Dentist", EventType::Personal, at(3, 14, 30), 30)];
        let records = resolver.check_bulk_conflicts(&existing, &proposed);
        let options =
            resolver.generate_resolution_options(&records[0].event, &records[0].conflicts);

        assert!(options.windows(2).all(|w| w[0].priority >= w[1].priority));
        assert_eq!(options.first().unwrap().kind, ResolutionKind::RescheduleSameDay);
        assert_eq!(options.last().unwrap().kind, ResolutionKind::KeepConflict);
        let next_day = options
            .iter()
            .find(|o| o.kind == ResolutionKind::RescheduleNextDay)
            .unwrap();
        assert!(next_day.tentative);
        // 30-minute event: no reduce-duration option.
        assert!(!options.iter().any(|o| o.kind == ResolutionKind::ReduceDuration));
    }

    #[test]
    fn test_reduce_duration_offered_above_thirty_minutes() {
        let resolver = ConflictResolver::new();
        let existing = vec![calendar("meeting", EventType::Personal, at(3, 14, 0), 60)];
        let proposed = vec![draft("Review", EventType::Work, at(3, 14, 30), 90)];
        let records = resolver.check_bulk_conflicts(&existing, &proposed);
        let options =
            resolver.generate_resolution_options(&records[0].event, &records[0].conflicts);
        let reduce = options
            .iter()
            .find(|o| o.kind == ResolutionKind::ReduceDuration)
            .unwrap();
        assert_eq!(reduce.new_duration, Some(60));
    }

    #[test]
    fn test_same_day_alternatives_bounds_and_cap() {
        let resolver = ConflictResolver::new();
        let busy = vec![(at(3, 8, 0), at(3, 9, 0))];
        let alternatives = resolver.find_alternative_times_same_day(at(3, 8, 30), 60, &busy);
        assert_eq!(alternatives.len(), 3);
        // First clear slot starts exactly when the busy window ends.
        assert_eq!(alternatives[0], at(3, 9, 0));
        assert_eq!(alternatives[1], at(3, 9, 30));
        for alt in &alternatives {
            assert!(*alt >= at(3, 8, 0));
            assert!(*alt + Duration::minutes(60) <= at(3, 22, 0));
            assert_eq!(alt.minute() % 30, 0);
        }
    }

    #[test]
    fn test_auto_resolve_relocates_lower_priority() {
        let resolver = ConflictResolver::new();
        let events = vec![
            draft("Coffee", EventType::Social, at(3, 18, 0), 60),
            draft("Therapy Session", EventType::Therapy, at(3, 18, 0), 60),
        ];
        let result = resolver.auto_resolve_conflicts(&[], &events);
        assert!(result.success);
        assert_eq!(result.resolved.len(), 2);
        // Therapy outranks social and keeps the original slot.
        assert_eq!(result.resolved[0].title, "Therapy Session");
        assert_eq!(result.resolved[0].start_time, at(3, 18, 0));
        assert_ne!(result.resolved[1].start_time, at(3, 18, 0));
        // Relocation landed on a clear same-day slot.
        assert!(!events_overlap(
            result.resolved[1].start_time,
            result.resolved[1].end_time(),
            at(3, 18, 0),
            at(3, 19, 0),
        ));
    }

    #[test]
    fn test_auto_resolve_respects_existing_calendar() {
        let resolver = ConflictResolver::new();
        let existing = vec![calendar("Work review", EventType::Work, at(3, 18, 0), 60)];
        let events = vec![draft("Therapy Session", EventType::Therapy, at(3, 18, 0), 60)];

        let result = resolver.auto_resolve_conflicts(&existing, &events);
        assert!(result.success);
        assert_eq!(result.resolved.len(), 1);
        // The stored event keeps its slot; the draft is relocated clear of it.
        assert!(!events_overlap(
            result.resolved[0].start_time,
            result.resolved[0].end_time(),
            at(3, 18, 0),
            at(3, 19, 0),
        ));
    }

    #[test]
    fn test_next_day_option_skips_known_busy_hours() {
        let resolver = ConflictResolver::new();
        let event = draft("Errand", EventType::Personal, at(3, 10, 0), 60);

        assert_eq!(resolver.find_next_available_day(&event, &[]), Some(at(4, 10, 0)));
        // First preferred hour of the next day is taken; the scan advances.
        let busy = vec![(at(4, 10, 0), at(4, 11, 0))];
        assert_eq!(resolver.find_next_available_day(&event, &busy), Some(at(4, 11, 0)));
    }

    #[test]
    fn test_auto_resolve_reports_unplaceable_events() {
        let resolver = ConflictResolver::new();
        let events = vec![
            // Fills the entire 08:00-22:00 window.
            draft("Retreat", EventType::Therapy, at(3, 8, 0), 840),
            draft("Standup", EventType::Work, at(3, 9, 0), 30),
        ];
        let result = resolver.auto_resolve_conflicts(&[], &events);
        assert!(!result.success);
        assert_eq!(result.resolved.len(), 1);
        assert_eq!(result.remaining_conflicts.len(), 1);
        assert_eq!(result.remaining_conflicts[0].title, "Standup");
    }
}

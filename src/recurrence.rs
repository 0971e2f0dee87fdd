//! Recurring series expansion.
//!
//! Materializes a template draft into concrete instances bounded by the
//! pattern's end condition, and carries the series-level operations: a
//! conflict sweep over the whole series and bulk modification of an
//! existing series.

use chrono::{Datelike, Duration, Months, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::conflict::events_overlap;
use crate::model::{
    BoundUnit, CalendarEvent, EventDraft, Frequency, RecurrencePattern, SeriesBound,
};

const DAY_NAMES: [&str; 7] =
    ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

pub struct SeriesExpander;

impl SeriesExpander {
    pub fn new() -> Self {
        SeriesExpander
    }

    /// Expand a template into concrete instances, chronologically ordered.
    /// Every instance shares the template's title, type and duration; only
    /// `start_time` and the description differ.
    pub fn expand(&self, template: &EventDraft, pattern: &RecurrencePattern) -> Vec<EventDraft> {
        let end_date = self.calculate_end_date(template.start_time, pattern.effective_bound());

        match pattern.frequency {
            Frequency::Daily => self.generate_stepped(template, end_date, Step::Days(1), "Daily"),
            Frequency::Weekly => {
                if pattern.weekdays.is_empty() {
                    self.generate_stepped(template, end_date, Step::Days(7), "Weekly")
                } else {
                    self.generate_weekly_specific_days(template, &pattern.weekdays, end_date)
                }
            }
            Frequency::Biweekly => {
                self.generate_stepped(template, end_date, Step::Days(14), "Biweekly")
            }
            Frequency::Monthly => {
                self.generate_stepped(template, end_date, Step::Months(1), "Monthly")
            }
            Frequency::Once => vec![template.clone()],
        }
    }

    /// Add `count` of the bound's unit to `start`. Months use calendar
    /// arithmetic, not fixed 30-day steps.
    pub fn calculate_end_date(&self, start: NaiveDateTime, bound: SeriesBound) -> NaiveDateTime {
        match bound.unit {
            BoundUnit::Days => start + Duration::days(bound.count),
            BoundUnit::Weeks => start + Duration::weeks(bound.count),
            BoundUnit::Months => start
                .checked_add_months(Months::new(bound.count.max(0) as u32))
                .unwrap_or(start + Duration::weeks(4)),
        }
    }

    fn generate_stepped(
        &self,
        template: &EventDraft,
        end_date: NaiveDateTime,
        step: Step,
        label: &str,
    ) -> Vec<EventDraft> {
        let frequency = match step {
            Step::Days(1) => Frequency::Daily,
            Step::Days(7) => Frequency::Weekly,
            Step::Days(_) => Frequency::Biweekly,
            Step::Months(_) => Frequency::Monthly,
        };

        let mut events = Vec::new();
        let mut current = template.start_time;
        while current <= end_date {
            let mut event = template.clone();
            event.start_time = current;
            event.frequency = frequency;
            event.description = format!("{} {}", label, template.title);
            events.push(event);

            current = match step {
                Step::Days(days) => current + Duration::days(days),
                Step::Months(months) => match current.checked_add_months(Months::new(months)) {
                    Some(next) => next,
                    None => break,
                },
            };
        }
        events
    }

    /// Weekly expansion on specific weekdays (e.g. Mon/Wed/Fri). Anchors to
    /// the Monday of the template's week and emits one instance per listed
    /// weekday that falls within [template start, end], preserving the
    /// template's time-of-day.
    fn generate_weekly_specific_days(
        &self,
        template: &EventDraft,
        weekdays: &[u32],
        end_date: NaiveDateTime,
    ) -> Vec<EventDraft> {
        let start = template.start_time;
        let mut week_start =
            start - Duration::days(start.weekday().num_days_from_monday() as i64);

        let mut events = Vec::new();
        while week_start <= end_date {
            for &day in weekdays {
                if day > 6 {
                    continue;
                }
                let instance_time = week_start + Duration::days(day as i64);
                if instance_time >= start && instance_time <= end_date {
                    let mut event = template.clone();
                    event.start_time = instance_time;
                    event.frequency = Frequency::Weekly;
                    event.description =
                        format!("Weekly {} ({})", template.title, DAY_NAMES[day as usize]);
                    events.push(event);
                }
            }
            week_start += Duration::weeks(1);
        }
        events
    }

    /// Sweep a whole series against the existing calendar and summarize how
    /// much of it lands cleanly, with tiered suggestions for the rest.
    pub fn analyze_series_conflicts(
        &self,
        instances: &[EventDraft],
        existing: &[CalendarEvent],
    ) -> SeriesConflictReport {
        let mut conflict_free = Vec::new();
        let mut conflicted = Vec::new();

        for instance in instances {
            let clashes: Vec<CalendarEvent> = existing
                .iter()
                .filter(|other| {
                    events_overlap(
                        instance.start_time,
                        instance.end_time(),
                        other.start_time,
                        other.end_time(),
                    )
                })
                .cloned()
                .collect();

            if clashes.is_empty() {
                conflict_free.push(instance.clone());
            } else {
                conflicted.push((instance.clone(), clashes));
            }
        }

        let total = instances.len();
        let success_rate = if total == 0 {
            0.0
        } else {
            conflict_free.len() as f64 / total as f64
        };
        let suggestions = series_suggestions(total, &conflicted);

        SeriesConflictReport {
            total_events: total,
            conflict_free,
            conflicted,
            success_rate,
            suggestions,
        }
    }

    /// Apply a bulk modification to an already-expanded series.
    pub fn modify_series(
        &self,
        instances: &[EventDraft],
        modification: &SeriesModification,
    ) -> Vec<EventDraft> {
        match modification {
            SeriesModification::ChangeTime { new_time } => instances
                .iter()
                .map(|event| {
                    let mut modified = event.clone();
                    modified.start_time = event.start_time.date().and_time(*new_time);
                    modified
                })
                .collect(),
            SeriesModification::ChangeDay { new_day } => instances
                .iter()
                .map(|event| {
                    let current = event.start_time.weekday().num_days_from_monday();
                    let shift = (*new_day).min(6) as i64 - current as i64;
                    let mut modified = event.clone();
                    modified.start_time = event.start_time + Duration::days(shift);
                    modified
                })
                .collect(),
            SeriesModification::ReduceFrequency { new_frequency } => {
                match new_frequency {
                    Frequency::Biweekly if instances.len() > 1 => {
                        instances.iter().step_by(2).cloned().collect()
                    }
                    Frequency::Monthly if instances.len() > 3 => {
                        instances.iter().step_by(4).cloned().collect()
                    }
                    _ => instances[..instances.len() / 2].to_vec(),
                }
            }
        }
    }
}

enum Step {
    Days(i64),
    Months(u32),
}

// ============ Series Analysis Types ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesConflictReport {
    pub total_events: usize,
    pub conflict_free: Vec<EventDraft>,
    pub conflicted: Vec<(EventDraft, Vec<CalendarEvent>)>,
    pub success_rate: f64,
    pub suggestions: Vec<SeriesSuggestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSuggestionKind {
    RescheduleSingle,
    RescheduleIndividual,
    ChangeTime,
    ChangeDay,
    ReduceFrequency,
    ProceedWithConflicts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSuggestion {
    pub kind: SeriesSuggestionKind,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeriesModification {
    ChangeTime { new_time: NaiveTime },
    ChangeDay { new_day: u32 },
    ReduceFrequency { new_frequency: Frequency },
}

fn series_suggestions(
    total: usize,
    conflicted: &[(EventDraft, Vec<CalendarEvent>)],
) -> Vec<SeriesSuggestion> {
    let mut suggestions = Vec::new();
    if conflicted.is_empty() {
        return suggestions;
    }

    let count = conflicted.len();
    if count == 1 {
        let event = &conflicted[0].0;
        suggestions.push(SeriesSuggestion {
            kind: SeriesSuggestionKind::RescheduleSingle,
            description: format!(
                "Reschedule the {} session",
                event.start_time.format("%A, %B %d")
            ),
        });
    } else if count as f64 <= total as f64 * 0.3 {
        suggestions.push(SeriesSuggestion {
            kind: SeriesSuggestionKind::RescheduleIndividual,
            description: format!("Reschedule {} conflicting sessions individually", count),
        });
    } else {
        let first = &conflicted[0].0;
        suggestions.push(SeriesSuggestion {
            kind: SeriesSuggestionKind::ChangeTime,
            description: format!(
                "Change the recurring time (currently {})",
                first.start_time.format("%I:%M %p")
            ),
        });
        suggestions.push(SeriesSuggestion {
            kind: SeriesSuggestionKind::ChangeDay,
            description: format!(
                "Change the recurring day (currently {})",
                first.start_time.format("%A")
            ),
        });
        suggestions.push(SeriesSuggestion {
            kind: SeriesSuggestionKind::ReduceFrequency,
            description: "Reduce frequency to avoid conflicts".to_string(),
        });
    }

    suggestions.push(SeriesSuggestion {
        kind: SeriesSuggestionKind::ProceedWithConflicts,
        description: format!("Proceed anyway and resolve {} conflicts manually", count),
    });
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;
    use chrono::{NaiveDate, Weekday};

    fn template(start: NaiveDateTime) -> EventDraft {
        EventDraft {
            title: "Exercise/Workout".to_string(),
            event_type: EventType::Exercise,
            start_time: start,
            duration_minutes: 30,
            frequency: Frequency::Weekly,
            description: "workout".to_string(),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn test_daily_expansion_inclusive_bounds() {
        let expander = SeriesExpander::new();
        let pattern = RecurrencePattern {
            frequency: Frequency::Daily,
            weekdays: vec![],
            series_end: Some(SeriesBound { count: 1, unit: BoundUnit::Weeks }),
        };
        let events = expander.expand(&template(at(2026, 3, 3, 7, 0)), &pattern);
        // Start day and end day both included.
        assert_eq!(events.len(), 8);
        assert_eq!(events[0].start_time, at(2026, 3, 3, 7, 0));
        assert_eq!(events[7].start_time, at(2026, 3, 10, 7, 0));
        assert!(events.iter().all(|e| e.description == "Daily Exercise/Workout"));
    }

    #[test]
    fn test_weekly_specific_days_four_week_count() {
        let expander = SeriesExpander::new();
        // Tuesday start, Mon/Wed/Fri, 4 weeks: partial first week gives 12.
        let pattern = RecurrencePattern {
            frequency: Frequency::Weekly,
            weekdays: vec![0, 2, 4],
            series_end: Some(SeriesBound { count: 4, unit: BoundUnit::Weeks }),
        };
        let events = expander.expand(&template(at(2026, 3, 3, 7, 0)), &pattern);
        assert_eq!(events.len(), 12);
        for event in &events {
            let weekday = event.start_time.weekday();
            assert!(
                matches!(weekday, Weekday::Mon | Weekday::Wed | Weekday::Fri),
                "unexpected weekday {:?}",
                weekday
            );
            assert_eq!(event.start_time.format("%H:%M").to_string(), "07:00");
            assert_eq!(event.duration_minutes, 30);
        }
        // Chronological and nothing before the template start.
        assert!(events.windows(2).all(|w| w[0].start_time < w[1].start_time));
        assert!(events[0].start_time >= at(2026, 3, 3, 7, 0));
        assert_eq!(events[0].description, "Weekly Exercise/Workout (Wednesday)");
    }

    #[test]
    fn test_weekly_default_bound_is_eight_weeks() {
        let expander = SeriesExpander::new();
        let pattern = RecurrencePattern {
            frequency: Frequency::Weekly,
            weekdays: vec![],
            series_end: None,
        };
        let events = expander.expand(&template(at(2026, 3, 3, 7, 0)), &pattern);
        assert_eq!(events.len(), 9);
        assert_eq!(events.last().unwrap().start_time, at(2026, 4, 28, 7, 0));
    }

    #[test]
    fn test_biweekly_steps_two_weeks() {
        let expander = SeriesExpander::new();
        let pattern = RecurrencePattern {
            frequency: Frequency::Biweekly,
            weekdays: vec![],
            series_end: Some(SeriesBound { count: 6, unit: BoundUnit::Weeks }),
        };
        let events = expander.expand(&template(at(2026, 3, 3, 9, 0)), &pattern);
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].start_time, at(2026, 3, 17, 9, 0));
        assert_eq!(events[0].description, "Biweekly Exercise/Workout");
    }

    #[test]
    fn test_monthly_uses_calendar_months() {
        let expander = SeriesExpander::new();
        let pattern = RecurrencePattern {
            frequency: Frequency::Monthly,
            weekdays: vec![],
            series_end: Some(SeriesBound { count: 3, unit: BoundUnit::Months }),
        };
        let events = expander.expand(&template(at(2026, 1, 31, 10, 0)), &pattern);
        // Jan 31 -> Feb 28 (clamped) -> Mar 28 -> Apr 28.
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].start_time, at(2026, 2, 28, 10, 0));
        assert_eq!(events[0].description, "Monthly Exercise/Workout");
    }

    #[test]
    fn test_series_conflict_report() {
        let expander = SeriesExpander::new();
        let pattern = RecurrencePattern {
            frequency: Frequency::Daily,
            weekdays: vec![],
            series_end: Some(SeriesBound { count: 3, unit: BoundUnit::Days }),
        };
        let instances = expander.expand(&template(at(2026, 3, 3, 7, 0)), &pattern);
        assert_eq!(instances.len(), 4);

        // One existing event colliding with the second instance.
        let existing = vec![CalendarEvent {
            title: "Early sync".to_string(),
            event_type: EventType::Work,
            start_time: at(2026, 3, 4, 7, 0),
            duration_minutes: 60,
        }];

        let report = expander.analyze_series_conflicts(&instances, &existing);
        assert_eq!(report.total_events, 4);
        assert_eq!(report.conflict_free.len(), 3);
        assert_eq!(report.conflicted.len(), 1);
        assert!((report.success_rate - 0.75).abs() < 1e-9);
        assert_eq!(report.suggestions[0].kind, SeriesSuggestionKind::RescheduleSingle);
        assert_eq!(
            report.suggestions.last().unwrap().kind,
            SeriesSuggestionKind::ProceedWithConflicts
        );
    }

    #[test]
    fn test_modify_series_change_time_and_reduce() {
        let expander = SeriesExpander::new();
        let pattern = RecurrencePattern {
            frequency: Frequency::Weekly,
            weekdays: vec![],
            series_end: Some(SeriesBound { count: 3, unit: BoundUnit::Weeks }),
        };
        let instances = expander.expand(&template(at(2026, 3, 3, 7, 0)), &pattern);
        assert_eq!(instances.len(), 4);

        let retimed = expander.modify_series(
            &instances,
            &SeriesModification::ChangeTime {
                new_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            },
        );
        assert!(retimed
            .iter()
            .all(|e| e.start_time.format("%H:%M").to_string() == "18:30"));
        assert_eq!(retimed[0].start_time.date(), instances[0].start_time.date());

        let thinned = expander.modify_series(
            &instances,
            &SeriesModification::ReduceFrequency { new_frequency: Frequency::Biweekly },
        );
        assert_eq!(thinned.len(), 2);
        assert_eq!(thinned[1].start_time, instances[2].start_time);
    }
}

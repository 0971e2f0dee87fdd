//! Natural-language event parser.
//!
//! Turns one free-text scheduling utterance into zero or more event drafts,
//! or a single template draft plus a recurrence pattern for the expander.
//! Parsing is deliberately best-effort: malformed input produces an empty
//! result, never an error, and the caller treats empty as "ask the user to
//! clarify".

use chrono::{Datelike, Duration, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{
    BoundUnit, EventDraft, EventType, Frequency, RecurrencePattern, SeriesBound,
};

// ============ Keyword Tables ============

/// Keyword groups checked in order; the first group containing a match wins.
/// "dinner" appears under both meal and social, so meal takes precedence.
const EVENT_TYPE_KEYWORDS: &[(EventType, &[&str])] = &[
    (EventType::Therapy, &["therapy", "therapist", "counseling", "session"]),
    (EventType::Exercise, &["workout", "exercise", "gym", "fitness", "training"]),
    (EventType::Journaling, &["journal", "journaling", "writing", "reflection"]),
    (EventType::Meal, &["meal", "lunch", "dinner", "breakfast", "eating"]),
    (EventType::Work, &["work", "meeting", "conference", "office", "team"]),
    (EventType::Personal, &["personal", "appointment", "dentist", "doctor", "shopping"]),
    (EventType::Social, &["dinner", "friends", "social", "party", "hangout"]),
];

/// Longest/most specific phrasing first so "biweekly" is not swallowed by
/// the "weekly" substring.
const FREQUENCY_KEYWORDS: &[(&str, Frequency)] = &[
    ("every other week", Frequency::Biweekly),
    ("biweekly", Frequency::Biweekly),
    ("every day", Frequency::Daily),
    ("daily", Frequency::Daily),
    ("every week", Frequency::Weekly),
    ("every month", Frequency::Monthly),
    ("monthly", Frequency::Monthly),
    ("weekly", Frequency::Weekly),
];

/// Day-name spellings, full names before abbreviations. 0 = Monday.
const DAY_PATTERNS: &[(&str, u32)] = &[
    ("monday", 0),
    ("mon", 0),
    ("tuesday", 1),
    ("tues", 1),
    ("tue", 1),
    ("wednesday", 2),
    ("wed", 2),
    ("thursday", 3),
    ("thurs", 3),
    ("thu", 3),
    ("friday", 4),
    ("fri", 4),
    ("saturday", 5),
    ("sat", 5),
    ("sunday", 6),
    ("sun", 6),
];

const SCHEDULING_VERBS: &[&str] = &["schedule", "add", "create", "book", "set up"];

const RECURRING_INDICATORS: &[&str] =
    &["every", "daily", "weekly", "monthly", "biweekly", "for the next"];

const MULTIPLE_INDICATORS: &[&str] =
    &[" and ", ", ", ": ", "also ", "plus ", "i need to", "schedule:", "add:"];

const MULTIPLE_SEPARATORS: &[&str] = &[" and ", ", ", ": ", " also ", " plus "];

// ============ Compiled Patterns ============

static TIME_CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2}):(\d{2})\s*(am|pm)").unwrap());
static TIME_HOUR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2})\s*(am|pm)").unwrap());
static TIME_AT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)at\s+(\d{1,2}):(\d{2})\s*(am|pm)?").unwrap());
static DURATION_HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*hours?").unwrap());
static DURATION_MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*min(?:ute)?s?").unwrap());
static NEXT_WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)next\s+(\w+)").unwrap());
static WEEKDAY_LIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(mon|tue|wed|thu|fri|sat|sun)[a-z]*[/,\s]+(mon|tue|wed|thu|fri|sat|sun)")
        .unwrap()
});
static SERIES_BOUND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)for\s+(\d+)\s+(weeks?|months?)").unwrap());

// ============ Parser ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    Recurring,
    Multiple,
    Single,
}

/// Result of parsing one utterance. `Events` carries zero or more one-shot
/// drafts; `Recurring` carries a template for the series expander.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Events(Vec<EventDraft>),
    Recurring {
        template: EventDraft,
        pattern: RecurrencePattern,
    },
}

impl ParseOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, ParseOutcome::Events(events) if events.is_empty())
    }
}

pub struct EventParser;

impl EventParser {
    pub fn new() -> Self {
        EventParser
    }

    /// Parse a scheduling request relative to `now`.
    pub fn parse(&self, text: &str, now: NaiveDateTime) -> ParseOutcome {
        let text = text.to_lowercase();
        let text = text.trim();

        match self.classify_request(text) {
            RequestShape::Recurring => self.parse_recurring(text, now),
            RequestShape::Multiple => {
                let events = self
                    .split_multiple(text)
                    .iter()
                    .filter_map(|part| self.parse_single(part, now))
                    .collect();
                ParseOutcome::Events(events)
            }
            RequestShape::Single => {
                ParseOutcome::Events(self.parse_single(text, now).into_iter().collect())
            }
        }
    }

    /// Recurring indicators win over multiple-event indicators, which win
    /// over the single-event default. A request containing both "every
    /// tuesday" and "and" is treated as recurring, not split.
    pub fn classify_request(&self, text: &str) -> RequestShape {
        let recurring = RECURRING_INDICATORS.iter().any(|ind| text.contains(ind))
            || WEEKDAY_LIST_RE.is_match(text)
            || SERIES_BOUND_RE.is_match(text);
        if recurring {
            return RequestShape::Recurring;
        }
        if MULTIPLE_INDICATORS.iter().any(|ind| text.contains(ind)) {
            return RequestShape::Multiple;
        }
        RequestShape::Single
    }

    fn parse_recurring(&self, text: &str, now: NaiveDateTime) -> ParseOutcome {
        let pattern = match self.parse_recurring_pattern(text) {
            Some(pattern) => pattern,
            None => return ParseOutcome::Events(vec![]),
        };
        let start_time = match self.extract_datetime(text, now) {
            Some(start) => start,
            None => return ParseOutcome::Events(vec![]),
        };

        let event_type = self.extract_event_type(text);
        let template = EventDraft {
            title: self.extract_title(text),
            event_type,
            start_time,
            duration_minutes: self.extract_duration(text),
            frequency: pattern.frequency,
            description: text.to_string(),
        };

        ParseOutcome::Recurring { template, pattern }
    }

    fn parse_single(&self, text: &str, now: NaiveDateTime) -> Option<EventDraft> {
        let start_time = self.extract_datetime(text, now)?;
        Some(EventDraft {
            title: self.extract_title(text),
            event_type: self.extract_event_type(text),
            start_time,
            duration_minutes: self.extract_duration(text),
            frequency: Frequency::Once,
            description: text.to_string(),
        })
    }

    /// Strip scheduling verbs, then map the first recognized keyword to a
    /// canonical title; fall back to the first three remaining words.
    pub fn extract_title(&self, text: &str) -> String {
        let mut remaining = text.to_string();
        for verb in SCHEDULING_VERBS {
            remaining = remaining.replace(verb, "");
        }
        let remaining = remaining.trim();

        for (event_type, keywords) in EVENT_TYPE_KEYWORDS {
            for keyword in *keywords {
                if remaining.contains(keyword) {
                    return match event_type {
                        EventType::Therapy => "Therapy Session".to_string(),
                        EventType::Exercise => "Exercise/Workout".to_string(),
                        EventType::Journaling => "Journaling".to_string(),
                        _ => title_case(keyword),
                    };
                }
            }
        }

        let words: Vec<&str> = remaining.split_whitespace().take(3).collect();
        if words.is_empty() {
            "Scheduled Event".to_string()
        } else {
            title_case(&words.join(" "))
        }
    }

    pub fn extract_event_type(&self, text: &str) -> EventType {
        for (event_type, keywords) in EVENT_TYPE_KEYWORDS {
            if keywords.iter().any(|kw| text.contains(kw)) {
                return *event_type;
            }
        }
        EventType::Personal
    }

    /// Explicit "N hours" / "N minutes", otherwise the per-type default.
    pub fn extract_duration(&self, text: &str) -> i64 {
        if let Some(caps) = DURATION_HOURS_RE.captures(text) {
            if let Ok(hours) = caps[1].parse::<i64>() {
                return hours * 60;
            }
        }
        if let Some(caps) = DURATION_MINUTES_RE.captures(text) {
            if let Ok(minutes) = caps[1].parse::<i64>() {
                return minutes;
            }
        }
        self.extract_event_type(text).default_duration_minutes()
    }

    /// A time-of-day token is mandatory; the date token is optional and
    /// defaults to today. Returns None when no time can be found, which
    /// drops the event.
    pub fn extract_datetime(&self, text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let (hour, minute) = self.extract_time_of_day(text)?;

        let mut base = now;
        if text.contains("tomorrow") {
            base += Duration::days(1);
        } else if let Some(caps) = NEXT_WEEKDAY_RE.captures(text) {
            if let Some(target) = day_of_week(&caps[1]) {
                let current = base.weekday().num_days_from_monday();
                let mut days_ahead = (target + 7 - current) % 7;
                if days_ahead == 0 {
                    // "next monday" on a Monday means next week, not today.
                    days_ahead = 7;
                }
                base += Duration::days(days_ahead as i64);
            }
        }
        // "today", "this <day>" and bare weekday names keep today's date.

        base.date().and_hms_opt(hour, minute, 0)
    }

    /// Extract an (hour, minute) in 24h form from the first matching time
    /// token. am/pm is required unless the token is an "at H:MM" clock time.
    fn extract_time_of_day(&self, text: &str) -> Option<(u32, u32)> {
        if let Some(caps) = TIME_CLOCK_RE.captures(text) {
            let hour = caps[1].parse::<u32>().ok()?;
            let minute = caps[2].parse::<u32>().ok()?;
            return Some((to_24_hour(hour, Some(&caps[3])), minute));
        }
        if let Some(caps) = TIME_HOUR_RE.captures(text) {
            let hour = caps[1].parse::<u32>().ok()?;
            return Some((to_24_hour(hour, Some(&caps[2])), 0));
        }
        if let Some(caps) = TIME_AT_RE.captures(text) {
            let hour = caps[1].parse::<u32>().ok()?;
            let minute = caps[2].parse::<u32>().ok()?;
            let ampm = caps.get(3).map(|m| m.as_str());
            return Some((to_24_hour(hour, ampm), minute));
        }
        None
    }

    /// Cascading split on each separator over the outputs of the previous
    /// split; fragments of five characters or fewer are discarded.
    pub fn split_multiple(&self, text: &str) -> Vec<String> {
        let mut parts = vec![text.to_string()];
        for separator in MULTIPLE_SEPARATORS {
            let mut next = Vec::new();
            for part in &parts {
                next.extend(part.split(separator).map(|s| s.to_string()));
            }
            parts = next;
        }
        parts
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| p.len() > 5)
            .collect()
    }

    /// Detect frequency keyword, explicit weekday list (which forces
    /// weekly), and an explicit "for N weeks/months" bound. Returns None
    /// when no recurrence signal is present.
    pub fn parse_recurring_pattern(&self, text: &str) -> Option<RecurrencePattern> {
        let mut frequency = FREQUENCY_KEYWORDS
            .iter()
            .find(|(kw, _)| text.contains(kw))
            .map(|(_, freq)| *freq);

        let mut weekdays = Vec::new();
        if WEEKDAY_LIST_RE.is_match(text) {
            frequency = Some(Frequency::Weekly);
            weekdays = extract_weekdays(text);
        }

        let series_end = SERIES_BOUND_RE.captures(text).and_then(|caps| {
            let count = caps[1].parse::<i64>().ok()?;
            let unit = if caps[2].starts_with("week") {
                BoundUnit::Weeks
            } else {
                BoundUnit::Months
            };
            Some(SeriesBound { count, unit })
        });

        if frequency.is_none() && series_end.is_none() {
            return None;
        }

        Some(RecurrencePattern {
            frequency: frequency.unwrap_or(Frequency::Weekly),
            weekdays,
            series_end,
        })
    }
}

// ============ Helpers ============

fn to_24_hour(hour: u32, ampm: Option<&str>) -> u32 {
    match ampm.map(|s| s.to_lowercase()) {
        Some(ref s) if s == "pm" && hour != 12 => hour + 12,
        Some(ref s) if s == "am" && hour == 12 => 0,
        _ => hour,
    }
}

/// Exact lookup of a weekday word ("monday", "tues", ...). 0 = Monday.
fn day_of_week(word: &str) -> Option<u32> {
    let word = word.to_lowercase();
    DAY_PATTERNS
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, num)| *num)
}

/// Collect every day name mentioned anywhere in the text, sorted and
/// deduplicated. Used once a weekday list has been detected.
fn extract_weekdays(text: &str) -> Vec<u32> {
    let mut days: Vec<u32> = DAY_PATTERNS
        .iter()
        .filter(|(name, _)| text.contains(name))
        .map(|(_, num)| *num)
        .collect();
    days.sort_unstable();
    days.dedup();
    days
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn parser() -> EventParser {
        EventParser::new()
    }

    // Tuesday.
    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 3)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_classify_precedence() {
        let p = parser();
        assert_eq!(p.classify_request("schedule workout every day at 7am"), RequestShape::Recurring);
        // Recurring wins even when a multiple-event separator is present.
        assert_eq!(
            p.classify_request("therapy every tuesday and workout every friday"),
            RequestShape::Recurring
        );
        assert_eq!(
            p.classify_request("dentist tomorrow at 2pm and lunch at 12pm"),
            RequestShape::Multiple
        );
        assert_eq!(p.classify_request("dentist tomorrow at 2pm"), RequestShape::Single);
        // A weekday list alone is a recurrence signal.
        assert_eq!(
            p.classify_request("add workout monday, wednesday, friday at 7am"),
            RequestShape::Recurring
        );
    }

    #[test]
    fn test_single_event_fully_qualified() {
        let p = parser();
        let outcome = p.parse("Schedule dentist tomorrow at 2pm for 30 minutes", fixed_now());
        let events = match outcome {
            ParseOutcome::Events(events) => events,
            other => panic!("expected events, got {:?}", other),
        };
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.title, "Dentist");
        assert_eq!(event.event_type, EventType::Personal);
        assert_eq!(event.duration_minutes, 30);
        assert_eq!(
            event.start_time,
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap().and_hms_opt(14, 0, 0).unwrap()
        );
        assert_eq!(event.frequency, Frequency::Once);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let p = parser();
        let a = p.parse("Schedule dentist tomorrow at 2pm for 30 minutes", fixed_now());
        let b = p.parse("Schedule dentist tomorrow at 2pm for 30 minutes", fixed_now());
        assert_eq!(a, b);
    }

    #[test]
    fn test_therapy_canonical_title_and_duration_default() {
        let p = parser();
        let outcome = p.parse("Schedule therapy tomorrow at 6pm", fixed_now());
        let events = match outcome {
            ParseOutcome::Events(events) => events,
            other => panic!("expected events, got {:?}", other),
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Therapy Session");
        assert_eq!(events[0].event_type, EventType::Therapy);
        assert_eq!(events[0].duration_minutes, 60);
        assert_eq!(
            events[0].start_time,
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap().and_hms_opt(18, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_explicit_hours_duration() {
        let p = parser();
        assert_eq!(p.extract_duration("team meeting for 2 hours"), 120);
        assert_eq!(p.extract_duration("journaling for 20 minutes"), 20);
        assert_eq!(p.extract_duration("workout at 7am"), 30);
    }

    #[test]
    fn test_no_time_token_drops_event() {
        let p = parser();
        let outcome = p.parse("schedule dentist tomorrow", fixed_now());
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_next_weekday_never_resolves_to_today() {
        let p = parser();
        // fixed_now() is a Tuesday; "next tuesday" must land a full week out.
        let start = p
            .extract_datetime("meeting next tuesday at 3pm", fixed_now())
            .unwrap();
        assert_eq!(
            start,
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap().and_hms_opt(15, 0, 0).unwrap()
        );
        // Tuesday -> Friday is three days ahead.
        let friday = p
            .extract_datetime("meeting next friday at 3pm", fixed_now())
            .unwrap();
        assert_eq!(
            friday,
            NaiveDate::from_ymd_opt(2026, 3, 6).unwrap().and_hms_opt(15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_midnight_and_noon_conversion() {
        let p = parser();
        let noon = p.extract_datetime("lunch at 12pm", fixed_now()).unwrap();
        assert_eq!(noon.format("%H:%M").to_string(), "12:00");
        let midnight = p.extract_datetime("walk at 12am", fixed_now()).unwrap();
        assert_eq!(midnight.format("%H:%M").to_string(), "00:00");
    }

    #[test]
    fn test_split_multiple_discards_short_fragments() {
        let p = parser();
        let parts =
            p.split_multiple("dentist tomorrow at 2pm and lunch at 12pm, gym at 6pm, ok");
        assert_eq!(
            parts,
            vec![
                "dentist tomorrow at 2pm".to_string(),
                "lunch at 12pm".to_string(),
                "gym at 6pm".to_string(),
            ]
        );
    }

    #[test]
    fn test_multiple_events_parsed_independently() {
        let p = parser();
        let outcome = p.parse(
            "Schedule dentist tomorrow at 2pm and lunch with friends at 12:30 pm",
            fixed_now(),
        );
        let events = match outcome {
            ParseOutcome::Events(events) => events,
            other => panic!("expected events, got {:?}", other),
        };
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Dentist");
        assert_eq!(events[1].event_type, EventType::Meal);
        assert_eq!(events[1].start_time.format("%H:%M").to_string(), "12:30");
    }

    #[test]
    fn test_weekday_list_forces_weekly_pattern() {
        let p = parser();
        let outcome = p.parse("Add workout Monday, Wednesday, Friday at 7am", fixed_now());
        let (template, pattern) = match outcome {
            ParseOutcome::Recurring { template, pattern } => (template, pattern),
            other => panic!("expected recurring, got {:?}", other),
        };
        assert_eq!(pattern.frequency, Frequency::Weekly);
        assert_eq!(pattern.weekdays, vec![0, 2, 4]);
        assert!(pattern.series_end.is_none());
        assert_eq!(template.event_type, EventType::Exercise);
        assert_eq!(template.duration_minutes, 30);
        assert_eq!(template.start_time.format("%H:%M").to_string(), "07:00");
    }

    #[test]
    fn test_recurring_pattern_with_explicit_bound() {
        let p = parser();
        let pattern = p
            .parse_recurring_pattern("journaling every day at 8am for 2 weeks")
            .unwrap();
        assert_eq!(pattern.frequency, Frequency::Daily);
        assert_eq!(pattern.series_end, Some(SeriesBound { count: 2, unit: BoundUnit::Weeks }));
    }

    #[test]
    fn test_biweekly_not_swallowed_by_weekly() {
        let p = parser();
        let pattern = p.parse_recurring_pattern("biweekly checkup at 9am").unwrap();
        assert_eq!(pattern.frequency, Frequency::Biweekly);
        let other = p
            .parse_recurring_pattern("checkup every other week at 9am")
            .unwrap();
        assert_eq!(other.frequency, Frequency::Biweekly);
    }

    #[test]
    fn test_recurring_without_time_is_empty() {
        let p = parser();
        let outcome = p.parse("workout every day", fixed_now());
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_title_fallbacks() {
        let p = parser();
        assert_eq!(p.extract_title("schedule something odd tomorrow at 2pm"), "Something Odd Tomorrow");
        assert_eq!(p.extract_title("schedule"), "Scheduled Event");
    }
}

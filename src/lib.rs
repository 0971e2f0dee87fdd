//! Innerverse scheduling core.
//!
//! Turns free-text scheduling requests into calendar events:
//!
//! - [`parser`] classifies a request (single, multiple, recurring) and
//!   extracts drafts with sensible per-type defaults
//! - [`recurrence`] expands recurring templates into concrete instances
//! - [`conflict`] detects overlaps and ranks resolution options
//! - [`store`] persists events in SQLite
//! - [`session`] holds conflicted drafts awaiting a user decision
//! - [`orchestrator`] wires the pipeline together
//! - [`gemini`] optionally phrases user-facing summaries

pub mod conflict;
pub mod gemini;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod recurrence;
pub mod session;
pub mod store;

pub use conflict::{events_overlap, AutoResolution, ConflictResolver};
pub use model::{
    CalendarEvent, ConflictDetail, ConflictRecord, EventDraft, EventType, Frequency,
    RecurrencePattern, ResolutionKind, ResolutionOption, Severity,
};
pub use orchestrator::{SchedulingOrchestrator, SchedulingResponse, UpdateOutcome};
pub use parser::{EventParser, ParseOutcome};
pub use recurrence::SeriesExpander;
pub use session::{PendingResolution, SessionStore};
pub use store::{CalendarStore, EventUpdate, StoredEvent};

use std::error::Error;
use std::path::Path;

/// Everything a host application needs to serve scheduling requests.
pub struct Innerverse {
    pub orchestrator: SchedulingOrchestrator,
    pub store: CalendarStore,
    pub sessions: SessionStore,
}

/// Open the calendar database and set up logging.
pub fn init(db_path: &Path) -> Result<Innerverse, Box<dyn Error + Send + Sync>> {
    if let Err(e) = logging::init_logging() {
        eprintln!("Logging unavailable: {}", e);
    }
    match logging::cleanup_old_logs() {
        Ok(deleted) if deleted > 0 => {
            logging::log_session(None, &format!("Removed {} old log file(s)", deleted));
        }
        Ok(_) => {}
        Err(e) => logging::log_error(None, &format!("Log cleanup failed: {}", e)),
    }

    let store = CalendarStore::open(db_path)?;
    Ok(Innerverse {
        orchestrator: SchedulingOrchestrator::new(),
        store,
        sessions: SessionStore::new(),
    })
}

//! Observability
//!
//! - Structured JSON-lines logging with a process-wide threshold
//! - Typed lifecycle events
//! - Monotonic counters
//!
//! Observability is read-only: nothing here affects engine behavior,
//! and a failed log write is ignored.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event at its default severity
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // Verifies no panic
        log_event(Event::DatastoreOpened);
        log_event_with_fields(Event::WinnerChanged, &[("document_id", "doc1")]);
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;
use salvo::http::header::{CONTENT_TYPE, HeaderValue};
use salvo::prelude::*;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

static EVENTS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static EVENTS_IGNORED: AtomicU64 = AtomicU64::new(0);
static EVENT_PROCESSING_ERRORS: AtomicU64 = AtomicU64::new(0);
static AUTOMATIONS_EXECUTED: AtomicU64 = AtomicU64::new(0);
static AUTOMATIONS_FAILED: AtomicU64 = AtomicU64::new(0);
static ACTIONS_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
static ACTIONS_FAILED: AtomicU64 = AtomicU64::new(0);

/// Process-wide engine counters.
pub struct Metrics;

impl Metrics {
    /// Starts the uptime clock.
    pub fn init() {
        Lazy::force(&STARTED_AT);
    }

    pub fn event_received() {
        EVENTS_RECEIVED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_ignored() {
        EVENTS_IGNORED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_processing_error() {
        EVENT_PROCESSING_ERRORS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn automation_executed() {
        AUTOMATIONS_EXECUTED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn automation_failed() {
        AUTOMATIONS_FAILED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_succeeded() {
        ACTIONS_SUCCEEDED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn action_failed() {
        ACTIONS_FAILED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds() -> u64 {
        STARTED_AT.elapsed().as_secs()
    }
}

pub fn format_prometheus() -> String {
    let counters = [
        (
            "automation_events_received_total",
            "Total number of gateway events handed to the engine",
            &EVENTS_RECEIVED,
        ),
        (
            "automation_events_ignored_total",
            "Events dropped before rule lookup because a bot produced them",
            &EVENTS_IGNORED,
        ),
        (
            "automation_event_errors_total",
            "Events aborted because automations could not be loaded",
            &EVENT_PROCESSING_ERRORS,
        ),
        (
            "automations_executed_total",
            "Automations whose filters passed and whose actions ran",
            &AUTOMATIONS_EXECUTED,
        ),
        (
            "automations_failed_total",
            "Executed automations with at least one failed action",
            &AUTOMATIONS_FAILED,
        ),
        (
            "automation_actions_succeeded_total",
            "Individual actions that succeeded",
            &ACTIONS_SUCCEEDED,
        ),
        (
            "automation_actions_failed_total",
            "Individual actions that failed",
            &ACTIONS_FAILED,
        ),
    ];

    let mut output = format!(
        "# HELP automation_uptime_seconds Number of seconds the engine has been running\n\
         # TYPE automation_uptime_seconds gauge\n\
         automation_uptime_seconds {}\n",
        Metrics::uptime_seconds()
    );
    for (name, help, counter) in counters {
        output.push_str(&format!(
            "\n# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
            counter.load(Ordering::Relaxed)
        ));
    }
    output
}

#[handler]
pub async fn metrics_endpoint(res: &mut Response) {
    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    res.body(format_prometheus());
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are shared with every other test in the process, so only
    // lower bounds are asserted.
    #[test]
    fn metrics_increments_counters() {
        Metrics::event_received();
        Metrics::event_ignored();
        Metrics::automation_executed();
        Metrics::automation_failed();
        Metrics::action_succeeded();
        Metrics::action_failed();
        Metrics::event_processing_error();

        assert!(EVENTS_RECEIVED.load(Ordering::Relaxed) >= 1);
        assert!(EVENTS_IGNORED.load(Ordering::Relaxed) >= 1);
        assert!(AUTOMATIONS_EXECUTED.load(Ordering::Relaxed) >= 1);
        assert!(AUTOMATIONS_FAILED.load(Ordering::Relaxed) >= 1);
        assert!(ACTIONS_SUCCEEDED.load(Ordering::Relaxed) >= 1);
        assert!(ACTIONS_FAILED.load(Ordering::Relaxed) >= 1);
        assert!(EVENT_PROCESSING_ERRORS.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn format_prometheus_includes_all_metrics() {
        let output = format_prometheus();
        for name in [
            "automation_uptime_seconds",
            "automation_events_received_total",
            "automation_events_ignored_total",
            "automation_event_errors_total",
            "automations_executed_total",
            "automations_failed_total",
            "automation_actions_succeeded_total",
            "automation_actions_failed_total",
        ] {
            assert!(output.contains(&format!("# TYPE {name}")), "missing {name}");
        }
    }
}

//! Metrics instrumentation.
//!
//! Uses the `metrics` facade. Nothing is exported unless the host installs
//! a recorder.

use crate::channel::{ChannelError, ChannelKind};
use metrics::{counter, gauge};
use tracing::debug;

/// Metric names.
pub mod names {
    pub const CHANNELS_CREATED: &str = "echo_mock_channels_created_total";
    pub const EVENTS_DISPATCHED: &str = "echo_mock_events_dispatched_total";
    pub const REJECTED_CALLS: &str = "echo_mock_rejected_calls_total";
    pub const PRESENCE_JOINS: &str = "echo_mock_presence_joins_total";
    pub const PRESENCE_LEAVES: &str = "echo_mock_presence_leaves_total";
    pub const PRESENCE_MEMBERS: &str = "echo_mock_presence_members";
}

/// Describe all metrics to the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(names::CHANNELS_CREATED, "Channels created by the registry");
    metrics::describe_counter!(
        names::EVENTS_DISPATCHED,
        "Events, whispers and notifications delivered to a handler"
    );
    metrics::describe_counter!(names::REJECTED_CALLS, "Calls rejected with a diagnostic");
    metrics::describe_counter!(names::PRESENCE_JOINS, "Members added to presence rosters");
    metrics::describe_counter!(names::PRESENCE_LEAVES, "Members removed from presence rosters");
    metrics::describe_gauge!(names::PRESENCE_MEMBERS, "Current presence roster size");

    debug!("Metrics described");
}

/// Record a channel creation.
pub fn record_channel_created(kind: ChannelKind) {
    counter!(names::CHANNELS_CREATED, "kind" => kind.as_str()).increment(1);
}

/// Record a delivered event. `route` is one of `event`, `whisper` or `notification`.
pub fn record_dispatch(route: &'static str) {
    counter!(names::EVENTS_DISPATCHED, "route" => route).increment(1);
}

/// Record a rejected call.
pub fn record_rejection(error: &ChannelError) {
    counter!(names::REJECTED_CALLS, "reason" => error.reason()).increment(1);
}

/// Record a presence join.
pub fn record_join(channel: &str, members: usize) {
    counter!(names::PRESENCE_JOINS).increment(1);
    gauge!(names::PRESENCE_MEMBERS, "channel" => channel.to_string()).set(members as f64);
}

/// Record a presence leave.
pub fn record_leave(channel: &str, removed: usize, members: usize) {
    counter!(names::PRESENCE_LEAVES).increment(removed as u64);
    gauge!(names::PRESENCE_MEMBERS, "channel" => channel.to_string()).set(members as f64);
}

/// In-memory counter recorder for tests.
#[cfg(test)]
pub(crate) mod testing {
    use metrics::{
        Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    /// Counts increments per metric name and label set; gauges and
    /// histograms are dropped.
    #[derive(Debug, Default)]
    pub(crate) struct CountingRecorder {
        counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
    }

    impl CountingRecorder {
        /// Get the count for `name` with a single `label=value` pair,
        /// or with no labels when `label` is `None`.
        pub(crate) fn count(&self, name: &str, label: Option<(&str, &str)>) -> u64 {
            let id = match label {
                Some((key, value)) => format!("{name}{{{key}={value}}}"),
                None => format!("{name}{{}}"),
            };
            self.counters
                .lock()
                .unwrap()
                .get(&id)
                .map_or(0, |c| c.load(Ordering::SeqCst))
        }
    }

    impl Recorder for CountingRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            let labels: Vec<String> = key
                .labels()
                .map(|l| format!("{}={}", l.key(), l.value()))
                .collect();
            let id = format!("{}{{{}}}", key.name(), labels.join(","));
            let counter = Arc::clone(self.counters.lock().unwrap().entry(id).or_default());
            Counter::from_arc(counter)
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }
}

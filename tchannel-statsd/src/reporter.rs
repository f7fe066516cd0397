use std::sync::Arc;
use std::time::Duration;

use crate::client::with_client;
use crate::key::{StatsTags, statsd_key};
use crate::stats::{CounterMetric, GaugeMetric, TimerMetric};

/// Receives the stats emitted by the RPC runtime.
///
/// Implementations must never fail the caller. Errors are logged and the stat is dropped.
pub trait StatsReporter: Send + Sync {
    /// Increments the counter `name` by `value`.
    fn inc_counter(&self, name: &str, tags: &StatsTags, value: i64);

    /// Sets the gauge `name` to `value`.
    fn update_gauge(&self, name: &str, tags: &StatsTags, value: u64);

    /// Records a timing for `name`.
    fn record_timer(&self, name: &str, tags: &StatsTags, duration: Duration);
}

impl<R: StatsReporter + ?Sized> StatsReporter for Arc<R> {
    fn inc_counter(&self, name: &str, tags: &StatsTags, value: i64) {
        (**self).inc_counter(name, tags, value)
    }

    fn update_gauge(&self, name: &str, tags: &StatsTags, value: u64) {
        (**self).update_gauge(name, tags, value)
    }

    fn record_timer(&self, name: &str, tags: &StatsTags, duration: Duration) {
        (**self).record_timer(name, tags, duration)
    }
}

/// Typed helpers on top of [`StatsReporter`].
pub trait StatsReporterExt: StatsReporter {
    /// Increments a [`CounterMetric`].
    fn count(&self, metric: impl CounterMetric, tags: &StatsTags, value: i64) {
        self.inc_counter(metric.name(), tags, value);
    }

    /// Sets a [`GaugeMetric`].
    fn gauge(&self, metric: impl GaugeMetric, tags: &StatsTags, value: u64) {
        self.update_gauge(metric.name(), tags, value);
    }

    /// Records a [`TimerMetric`].
    fn time(&self, metric: impl TimerMetric, tags: &StatsTags, duration: Duration) {
        self.record_timer(metric.name(), tags, duration);
    }
}

impl<R: StatsReporter + ?Sized> StatsReporterExt for R {}

/// A reporter that drops all stats.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStatsReporter;

impl StatsReporter for NullStatsReporter {
    fn inc_counter(&self, _name: &str, _tags: &StatsTags, _value: i64) {}

    fn update_gauge(&self, _name: &str, _tags: &StatsTags, _value: u64) {}

    fn record_timer(&self, _name: &str, _tags: &StatsTags, _duration: Duration) {}
}

/// Composes a statsd key from a stat name and its tags.
pub type KeyFn = fn(&str, Option<&StatsTags>) -> String;

/// Reports stats to the global statsd client.
///
/// Keys are composed with [`statsd_key`] unless a different [`KeyFn`] is given. Stats are dropped
/// silently while no client is configured, see [`init`](crate::init).
#[derive(Clone, Copy, Debug)]
pub struct StatsdReporter {
    key_fn: KeyFn,
}

impl StatsdReporter {
    /// Creates a reporter composing keys with [`statsd_key`].
    pub fn new() -> Self {
        Self::with_key_fn(statsd_key)
    }

    /// Creates a reporter with a custom key function.
    pub fn with_key_fn(key_fn: KeyFn) -> Self {
        Self { key_fn }
    }

    fn key(&self, name: &str, tags: &StatsTags) -> String {
        (self.key_fn)(name, Some(tags))
    }
}

impl Default for StatsdReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsReporter for StatsdReporter {
    fn inc_counter(&self, name: &str, tags: &StatsTags, value: i64) {
        if value == 0 {
            return;
        }

        let key = self.key(name, tags);
        with_client(|client| client.count(&key, value));
    }

    fn update_gauge(&self, name: &str, tags: &StatsTags, value: u64) {
        let key = self.key(name, tags);
        with_client(|client| client.gauge(&key, value));
    }

    fn record_timer(&self, name: &str, tags: &StatsTags, duration: Duration) {
        let key = self.key(name, tags);
        with_client(|client| client.time(&key, duration));
    }
}

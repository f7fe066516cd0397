use std::time::Duration;

use parking_lot::Mutex;

use crate::key::StatsTags;
use crate::reporter::{KeyFn, StatsReporter};

/// The value of a recorded stat.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum StatValue {
    /// A counter increment.
    Counter(i64),
    /// A gauge update.
    Gauge(u64),
    /// A timer recording.
    Timer(Duration),
}

/// A single call to a [`StatsReporter`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct RecordedStat {
    /// The stat name as passed by the caller.
    pub name: String,
    /// The tags as passed by the caller.
    pub tags: StatsTags,
    /// The reported value.
    pub value: StatValue,
}

impl RecordedStat {
    /// Creates a counter stat.
    pub fn counter(name: &str, tags: StatsTags, value: i64) -> Self {
        Self::new(name, tags, StatValue::Counter(value))
    }

    /// Creates a gauge stat.
    pub fn gauge(name: &str, tags: StatsTags, value: u64) -> Self {
        Self::new(name, tags, StatValue::Gauge(value))
    }

    /// Creates a timer stat.
    pub fn timer(name: &str, tags: StatsTags, duration: Duration) -> Self {
        Self::new(name, tags, StatValue::Timer(duration))
    }

    fn new(name: &str, tags: StatsTags, value: StatValue) -> Self {
        Self {
            name: name.to_owned(),
            tags,
            value,
        }
    }
}

/// A [`StatsReporter`] that keeps every stat in memory for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingStatsReporter {
    stats: Mutex<Vec<RecordedStat>>,
}

impl RecordingStatsReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all stats recorded so far, in the order they were reported.
    pub fn recorded(&self) -> Vec<RecordedStat> {
        self.stats.lock().clone()
    }

    /// Returns the keys of all recorded stats composed with `key_fn`.
    pub fn keys(&self, key_fn: KeyFn) -> Vec<String> {
        self.stats
            .lock()
            .iter()
            .map(|stat| key_fn(&stat.name, Some(&stat.tags)))
            .collect()
    }

    /// Removes all recorded stats.
    pub fn clear(&self) {
        self.stats.lock().clear();
    }

    /// Asserts that exactly the `expected` stats were recorded, ignoring order.
    #[track_caller]
    pub fn validate(&self, expected: impl IntoIterator<Item = RecordedStat>) {
        let mut expected: Vec<_> = expected.into_iter().collect();
        expected.sort();

        let mut actual = self.recorded();
        actual.sort();

        similar_asserts::assert_eq!(actual, expected, "recorded stats do not match");
    }

    fn push(&self, stat: RecordedStat) {
        self.stats.lock().push(stat);
    }
}

impl StatsReporter for RecordingStatsReporter {
    fn inc_counter(&self, name: &str, tags: &StatsTags, value: i64) {
        self.push(RecordedStat::counter(name, tags.clone(), value));
    }

    fn update_gauge(&self, name: &str, tags: &StatsTags, value: u64) {
        self.push(RecordedStat::gauge(name, tags.clone(), value));
    }

    fn record_timer(&self, name: &str, tags: &StatsTags, duration: Duration) {
        self.push(RecordedStat::timer(name, tags.clone(), duration));
    }
}

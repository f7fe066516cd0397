use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cadence::prelude::*;
use cadence::{Metric, MetricBuilder, MetricSink, StatsdClient};
use parking_lot::RwLock;
use rand::Rng;
use rand::distr::StandardUniform;
use statsdproxy::cadence::StatsdProxyMetricSink;
use statsdproxy::config::AggregateMetricsConfig;
use statsdproxy::middleware::aggregate::AggregateMetrics;

use crate::upstream::{Delivery, SinkUpstream, StatsdSink, UpstreamAddr};

/// Interval in which aggregated counters and gauges are sent upstream.
const AGGREGATE_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Errors returned by [`init`].
#[derive(Debug, thiserror::Error)]
pub enum MetricsInitError {
    /// The statsd address is neither `host:port` nor a `udp://` or `unixgram://` URL.
    #[error("invalid statsd address '{0}', expected host:port, udp://host:port or unixgram://path")]
    InvalidAddress(String),
}

/// A sample rate between `0.0` (no metrics are sent) and `1.0` (all metrics are sent).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRate(f64);

impl SampleRate {
    /// Decides whether a single metric is sent.
    fn sample(self) -> bool {
        if self.0 >= 1.0 {
            true
        } else if self.0 <= 0.0 {
            false
        } else {
            rand::rng().sample::<f64, _>(StandardUniform) <= self.0
        }
    }

    /// Returns `true` if only a share of all metrics is sent.
    fn is_partial(self) -> bool {
        self.0 < 1.0
    }
}

impl From<f64> for SampleRate {
    fn from(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

impl From<SampleRate> for f64 {
    fn from(value: SampleRate) -> Self {
        value.0
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self(1.0)
    }
}

/// Sends composed stat keys to statsd.
///
/// Adds the default tags to every line and drops lines according to the sample rate. Sampled
/// lines carry the rate (`|@0.5`) so the server can scale them back.
#[derive(Debug)]
pub struct MetricsClient {
    statsd_client: StatsdClient,
    default_tags: BTreeMap<String, String>,
    sample_rate: SampleRate,
}

impl MetricsClient {
    /// Creates a client that writes into the given cadence sink.
    pub fn from_sink<S>(prefix: &str, sink: S) -> Self
    where
        S: MetricSink + Send + Sync + std::panic::RefUnwindSafe + 'static,
    {
        Self {
            statsd_client: StatsdClient::from_sink(prefix, sink),
            default_tags: BTreeMap::new(),
            sample_rate: SampleRate::default(),
        }
    }

    /// Adds tags that are attached to every metric.
    pub fn with_default_tags(mut self, default_tags: BTreeMap<String, String>) -> Self {
        self.default_tags = default_tags;
        self
    }

    /// Sets the share of metrics that is sent.
    pub fn with_sample_rate(mut self, sample_rate: SampleRate) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Increments the counter `key` by `value`.
    pub fn count(&self, key: &str, value: i64) {
        if self.sample_rate.sample() {
            self.send(self.statsd_client.count_with_tags(key, value));
        }
    }

    /// Sets the gauge `key` to `value`.
    pub fn gauge(&self, key: &str, value: u64) {
        if self.sample_rate.sample() {
            self.send(self.statsd_client.gauge_with_tags(key, value));
        }
    }

    /// Records `duration` in milliseconds for the timer `key`.
    pub fn time(&self, key: &str, duration: Duration) {
        if self.sample_rate.sample() {
            self.send(self.statsd_client.time_with_tags(key, duration));
        }
    }

    fn send<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        for (k, v) in &self.default_tags {
            metric = metric.with_tag(k, v);
        }

        if self.sample_rate.is_partial() {
            metric = metric.with_sampling_rate(self.sample_rate.into());
        }

        if let Err(error) = metric.try_send() {
            tchannel_log::error!(
                error = &error as &dyn std::error::Error,
                "error sending a metric"
            );
        }
    }
}

/// Client configuration used for initialization of [`MetricsClient`].
#[derive(Debug)]
pub struct MetricsConfig {
    /// Prefix which is prepended to all metric keys.
    ///
    /// Keys composed by this crate already start with `tchannel.`, so this is usually empty.
    pub prefix: String,
    /// Address of the metrics upstream.
    pub host: String,
    /// Size of the datagrams sent upstream when aggregating, defaults to the sink's default.
    ///
    /// Without aggregation every line is sent in its own datagram.
    pub buffer_size: Option<usize>,
    /// Tags that are added to all metrics.
    pub default_tags: BTreeMap<String, String>,
    /// Default sample rate for metrics.
    pub sample_rate: SampleRate,
    /// If counters and gauges should be aggregated before they are sent upstream.
    pub aggregate: bool,
}

static GLOBAL_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    /// Client used instead of the global one on this thread, see [`with_capturing_test_client`].
    static SCOPED_CLIENT: RefCell<Option<Arc<MetricsClient>>> = const { RefCell::new(None) };
}

/// Set a new statsd client for all threads.
pub fn set_client(client: MetricsClient) {
    *GLOBAL_CLIENT.write() = Some(Arc::new(client));
}

/// Disable the client again, metrics are dropped afterwards.
pub fn disable() {
    *GLOBAL_CLIENT.write() = None;
}

/// Returns the client for the current thread.
fn current_client() -> Option<Arc<MetricsClient>> {
    SCOPED_CLIENT
        .with(|cell| cell.borrow().clone())
        .or_else(|| GLOBAL_CLIENT.read().clone())
}

/// Invoke a callback with the current statsd client.
///
/// If statsd is not configured the callback is not invoked.
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    match current_client() {
        Some(client) => f(&client),
        None => R::default(),
    }
}

/// Restores the previous scoped client when dropped, also when the scope panics.
struct ScopeGuard(Option<Arc<MetricsClient>>);

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.0.take();
        SCOPED_CLIENT.with(|cell| cell.replace(previous));
    }
}

/// Captures the statsd lines sent on the current thread while running `f`.
///
/// Other threads keep reporting to the global client.
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    with_capturing_test_client_sample_rate(1.0, f)
}

/// Like [`with_capturing_test_client`], with a sample rate for the capturing client.
#[doc(hidden)]
pub fn with_capturing_test_client_sample_rate(sample_rate: f64, f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let client = MetricsClient::from_sink("", sink).with_sample_rate(sample_rate.into());

    {
        let previous = SCOPED_CLIENT.with(|cell| cell.replace(Some(Arc::new(client))));
        let _guard = ScopeGuard(previous);
        f();
    }

    rx.try_iter()
        .map(|line| String::from_utf8_lossy(&line).into_owned())
        .collect()
}

/// Tell the metrics system to report to statsd.
///
/// With aggregation, counters and gauges are summed up per key and sent in batches every 50ms.
/// A statsd server that cannot be reached does not fail initialization, metrics are dropped.
pub fn init(config: MetricsConfig) -> Result<(), MetricsInitError> {
    let addr = UpstreamAddr::parse(&config.host)?;
    tchannel_log::info!("reporting metrics to statsd at {addr}");

    if f64::from(config.sample_rate) == 0.0 {
        tchannel_log::debug!("metrics sample rate is 0, no metrics will be reported");
    }

    let client = if config.aggregate {
        let buffer_size = config.buffer_size;
        let sink = StatsdProxyMetricSink::new(move || {
            let upstream = SinkUpstream::new(StatsdSink::connect(
                &addr,
                Delivery::Buffered(buffer_size),
            ));

            AggregateMetrics::new(
                AggregateMetricsConfig {
                    aggregate_gauges: true,
                    aggregate_counters: true,
                    flush_interval: AGGREGATE_FLUSH_INTERVAL,
                    flush_offset: 0,
                    max_map_size: None,
                },
                upstream,
            )
        });
        MetricsClient::from_sink(&config.prefix, sink)
    } else {
        let sink = StatsdSink::connect(&addr, Delivery::Immediate);
        MetricsClient::from_sink(&config.prefix, sink)
    };

    set_client(
        client
            .with_default_tags(config.default_tags)
            .with_sample_rate(config.sample_rate),
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::thread;

    use cadence::NopMetricSink;

    use super::*;

    #[test]
    fn test_sample_rate_clamped() {
        assert_eq!(f64::from(SampleRate::from(1.5)), 1.0);
        assert_eq!(f64::from(SampleRate::from(-0.5)), 0.0);
        assert_eq!(f64::from(SampleRate::from(0.25)), 0.25);
    }

    #[test]
    fn test_capturing_client() {
        let captures = with_capturing_test_client(|| {
            with_client(|client| {
                client.count("tchannel.foo", 3);
                client.gauge("tchannel.bar", 7);
                client.time("tchannel.baz", Duration::from_millis(12));
            })
        });

        assert_eq!(
            captures,
            ["tchannel.foo:3|c", "tchannel.bar:7|g", "tchannel.baz:12|ms"]
        );
    }

    #[test]
    fn test_default_tags() {
        let (rx, sink) = cadence::SpyMetricSink::new();
        let client = MetricsClient::from_sink("", sink).with_default_tags(BTreeMap::from([(
            "host".to_owned(),
            "web01".to_owned(),
        )]));

        client.count("tchannel.foo", 1);

        let captures: Vec<_> = rx
            .try_iter()
            .map(|x| String::from_utf8(x).unwrap())
            .collect();
        assert_eq!(captures, ["tchannel.foo:1|c|#host:web01"]);
    }

    #[test]
    fn test_prefix() {
        let (rx, sink) = cadence::SpyMetricSink::new();
        MetricsClient::from_sink("edge", sink).count("tchannel.foo", 1);

        let captures: Vec<_> = rx
            .try_iter()
            .map(|x| String::from_utf8(x).unwrap())
            .collect();
        assert_eq!(captures, ["edge.tchannel.foo:1|c"]);
    }

    #[test]
    fn test_sampled_out() {
        let captures = with_capturing_test_client_sample_rate(0.0, || {
            with_client(|client| client.count("tchannel.foo", 1))
        });

        assert!(captures.is_empty());
    }

    #[test]
    fn test_capturing_client_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            with_capturing_test_client(|| panic!("report failed"));
        });
        assert!(result.is_err());

        assert!(SCOPED_CLIENT.with(|cell| cell.borrow().is_none()));
    }

    #[test]
    fn test_set_client_and_disable() {
        set_client(MetricsClient::from_sink("", NopMetricSink));

        // Visible from threads that never saw a client before.
        assert!(thread::spawn(|| with_client(|_| true)).join().unwrap());

        disable();
        assert!(!thread::spawn(|| with_client(|_| true)).join().unwrap());
    }

    #[test]
    fn test_init_invalid_address() {
        let result = init(MetricsConfig {
            prefix: String::new(),
            host: "tcp://localhost:8125".to_owned(),
            buffer_size: None,
            default_tags: BTreeMap::new(),
            sample_rate: SampleRate::default(),
            aggregate: false,
        });

        assert!(matches!(result, Err(MetricsInitError::InvalidAddress(_))));
    }
}

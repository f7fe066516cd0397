//! Stats emitted by the RPC runtime for calls and connections.
//!
//! The metric traits serve only to provide a type safe metric name. All metric types have exactly
//! the same form, they are different only to ensure that a metric can only be used for the type for
//! which it was defined, (e.g. a counter metric cannot be used as a timer metric).
//!
//! ```
//! use std::time::Duration;
//!
//! use tchannel_statsd::{
//!     CallCounters, CallTimers, CommonTags, NullStatsReporter, StatsReporterExt,
//!     outbound_call_tags,
//! };
//!
//! let reporter = NullStatsReporter;
//! let tags = outbound_call_tags(&CommonTags::default(), "callerS", "targetS", "echo");
//!
//! reporter.count(CallCounters::OutboundCallsSend, &tags, 1);
//! reporter.time(CallTimers::OutboundCallsLatency, &tags, Duration::from_millis(150));
//! ```

use crate::key::{StatsTags, TagRole};

/// A metric for capturing counters.
///
/// Counters are simple values incremented or decremented by a client. The rates at which these
/// events occur or average values will be determined by the server receiving them.
pub trait CounterMetric {
    /// Returns the counter metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing timings.
///
/// Timings are a positive number of milliseconds between a start and end time.
pub trait TimerMetric {
    /// Returns the timer metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing gauges.
///
/// Gauge values are an instantaneous measurement of a value determined by the client. They do not
/// change unless changed by the client.
pub trait GaugeMetric {
    /// Returns the gauge metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// Counters emitted for every call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CallCounters {
    /// Incremented when a call is sent to a peer.
    ///
    /// Tagged with [`outbound_call_tags`].
    OutboundCallsSend,
    /// Incremented when an outbound call completes without an application error.
    OutboundCallsSuccess,
    /// Incremented when an outbound call completes with an application error.
    OutboundCallsAppErrors,
    /// Incremented when a call is received from a peer.
    ///
    /// Tagged with [`inbound_call_tags`].
    InboundCallsRecvd,
    /// Incremented when an inbound call is handled without an application error.
    InboundCallsSuccess,
    /// Incremented when the handler of an inbound call returns an application error.
    InboundCallsAppErrors,
}

impl CounterMetric for CallCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::OutboundCallsSend => "outbound.calls.send",
            Self::OutboundCallsSuccess => "outbound.calls.success",
            Self::OutboundCallsAppErrors => "outbound.calls.app-errors",
            Self::InboundCallsRecvd => "inbound.calls.recvd",
            Self::InboundCallsSuccess => "inbound.calls.success",
            Self::InboundCallsAppErrors => "inbound.calls.app-errors",
        }
    }
}

/// Latencies recorded for every call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CallTimers {
    /// Time from sending the call until the response has been read completely.
    OutboundCallsLatency,
    /// Time the handler spent on an inbound call.
    InboundCallsLatency,
}

impl TimerMetric for CallTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::OutboundCallsLatency => "outbound.calls.latency",
            Self::InboundCallsLatency => "inbound.calls.latency",
        }
    }
}

/// Counters emitted per connection.
///
/// Tagged with [`connection_tags`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConnectionCounters {
    /// Incremented when a connection to a peer is initiated.
    Initiated,
    /// Incremented when a connection from a peer is accepted.
    Accepted,
    /// Incremented when connecting to a peer fails.
    ConnectErrors,
    /// Number of bytes written to a connection.
    BytesSent,
    /// Number of bytes read from a connection.
    BytesRecvd,
}

impl CounterMetric for ConnectionCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::Initiated => "connections.initiated",
            Self::Accepted => "connections.accepted",
            Self::ConnectErrors => "connections.connect-errors",
            Self::BytesSent => "connections.bytes-sent",
            Self::BytesRecvd => "connections.bytes-recvd",
        }
    }
}

/// Gauges reported per connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConnectionGauges {
    /// Number of active connections to a peer.
    Active,
}

impl GaugeMetric for ConnectionGauges {
    fn name(&self) -> &'static str {
        match *self {
            Self::Active => "connections.active",
        }
    }
}

/// Tags shared by all call stats of a process.
///
/// These are not part of the composed key, but are useful for sinks that support tags and are
/// verified by the recording reporter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommonTags {
    /// The process name.
    pub app: Option<String>,
    /// The hostname of the machine.
    pub host: Option<String>,
}

impl CommonTags {
    fn to_tags(&self) -> StatsTags {
        let mut tags = StatsTags::new();
        if let Some(ref app) = self.app {
            tags.insert("app".to_owned(), app.clone());
        }
        if let Some(ref host) = self.host {
            tags.insert("host".to_owned(), host.clone());
        }
        tags
    }
}

fn insert(tags: &mut StatsTags, role: TagRole, value: &str) {
    tags.insert(role.as_str().to_owned(), value.to_owned());
}

/// Tags for a call sent by `service` to `target_endpoint` of `target_service`.
pub fn outbound_call_tags(
    common: &CommonTags,
    service: &str,
    target_service: &str,
    target_endpoint: &str,
) -> StatsTags {
    let mut tags = common.to_tags();
    insert(&mut tags, TagRole::Service, service);
    insert(&mut tags, TagRole::TargetService, target_service);
    insert(&mut tags, TagRole::TargetEndpoint, target_endpoint);
    tags
}

/// Tags for a call from `calling_service` handled by `endpoint` of the local `service`.
pub fn inbound_call_tags(
    common: &CommonTags,
    service: &str,
    calling_service: &str,
    endpoint: &str,
) -> StatsTags {
    let mut tags = common.to_tags();
    insert(&mut tags, TagRole::Service, service);
    insert(&mut tags, TagRole::CallingService, calling_service);
    insert(&mut tags, TagRole::Endpoint, endpoint);
    tags
}

/// Tags for a stat about the connection to `peer_host_port`.
pub fn connection_tags(common: &CommonTags, peer_host_port: &str) -> StatsTags {
    let mut tags = common.to_tags();
    insert(&mut tags, TagRole::PeerHostPort, peer_host_port);
    tags
}

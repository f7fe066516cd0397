use std::fmt;
use std::io;
use std::net::{Ipv4Addr, UdpSocket};
#[cfg(unix)]
use std::os::unix::net::UnixDatagram;
#[cfg(unix)]
use std::path::PathBuf;

#[cfg(unix)]
use cadence::{BufferedUnixMetricSink, UnixMetricSink};
use cadence::{BufferedUdpMetricSink, MetricSink, UdpMetricSink};
use statsdproxy::middleware::Middleware;
use statsdproxy::types::Metric;

use crate::client::MetricsInitError;

/// Address of the statsd server.
///
/// Parsed from either a fully-qualified URL, where the scheme is the transport identifier
/// (`udp://host:port` or `unixgram:///path/to/socket`), or a plain `host:port` for UDP.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpstreamAddr {
    /// A `host:port` pair reached over UDP.
    Udp(String),
    /// A unix datagram socket.
    #[cfg(unix)]
    UnixDatagram(PathBuf),
}

impl UpstreamAddr {
    /// Parses and validates a statsd address.
    pub fn parse(addr: &str) -> Result<Self, MetricsInitError> {
        let invalid = || MetricsInitError::InvalidAddress(addr.to_owned());

        let (scheme, rest) = addr.split_once("://").unwrap_or(("udp", addr));
        match scheme {
            "udp" => {
                let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
                if host.is_empty() || port.parse::<u16>().is_err() {
                    return Err(invalid());
                }
                Ok(Self::Udp(rest.to_owned()))
            }
            #[cfg(unix)]
            "unixgram" if !rest.is_empty() => Ok(Self::UnixDatagram(PathBuf::from(rest))),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp(host) => write!(f, "udp://{host}"),
            #[cfg(unix)]
            Self::UnixDatagram(path) => write!(f, "unixgram://{}", path.display()),
        }
    }
}

/// How lines are written to the statsd socket.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
    /// Every line is sent in its own datagram as soon as it is emitted.
    Immediate,
    /// Lines are joined into datagrams of up to the given size, or the transport default, and
    /// sent when the buffer is full or flushed.
    Buffered(Option<usize>),
}

/// The cadence sink writing to an [`UpstreamAddr`].
///
/// Falls back to [`StatsdSink::Disconnected`] if the socket cannot be set up, so that reporting
/// stats never fails the caller.
pub enum StatsdSink {
    /// One datagram per line over UDP.
    Udp(UdpMetricSink),
    /// Batched datagrams over UDP.
    BufferedUdp(BufferedUdpMetricSink),
    /// One datagram per line over a unix socket.
    #[cfg(unix)]
    Unix(UnixMetricSink),
    /// Batched datagrams over a unix socket.
    #[cfg(unix)]
    BufferedUnix(BufferedUnixMetricSink),
    /// Setting up the socket failed, lines are dropped.
    Disconnected,
}

impl StatsdSink {
    /// Creates the sink for `addr`, logging an error and dropping all lines if that fails.
    pub fn connect(addr: &UpstreamAddr, delivery: Delivery) -> Self {
        match Self::try_connect(addr, delivery) {
            Ok(sink) => sink,
            Err(error) => {
                tchannel_log::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to connect to statsd sink at {addr}"
                );
                Self::Disconnected
            }
        }
    }

    fn try_connect(addr: &UpstreamAddr, delivery: Delivery) -> io::Result<Self> {
        Ok(match addr {
            UpstreamAddr::Udp(host) => {
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
                socket.set_nonblocking(true)?;

                let host = host.as_str();
                match delivery {
                    Delivery::Immediate => {
                        Self::Udp(UdpMetricSink::from(host, socket).map_err(io::Error::other)?)
                    }
                    Delivery::Buffered(None) => Self::BufferedUdp(
                        BufferedUdpMetricSink::from(host, socket).map_err(io::Error::other)?,
                    ),
                    Delivery::Buffered(Some(size)) => Self::BufferedUdp(
                        BufferedUdpMetricSink::with_capacity(host, socket, size)
                            .map_err(io::Error::other)?,
                    ),
                }
            }
            #[cfg(unix)]
            UpstreamAddr::UnixDatagram(path) => {
                let socket = UnixDatagram::unbound()?;
                socket.set_nonblocking(true)?;

                match delivery {
                    Delivery::Immediate => Self::Unix(UnixMetricSink::from(path, socket)),
                    Delivery::Buffered(None) => {
                        Self::BufferedUnix(BufferedUnixMetricSink::from(path, socket))
                    }
                    Delivery::Buffered(Some(size)) => Self::BufferedUnix(
                        BufferedUnixMetricSink::with_capacity(path, socket, size),
                    ),
                }
            }
        })
    }

    /// Returns `true` if lines reach a socket.
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl MetricSink for StatsdSink {
    fn emit(&self, metric: &str) -> io::Result<usize> {
        match self {
            Self::Udp(sink) => sink.emit(metric),
            Self::BufferedUdp(sink) => sink.emit(metric),
            #[cfg(unix)]
            Self::Unix(sink) => sink.emit(metric),
            #[cfg(unix)]
            Self::BufferedUnix(sink) => sink.emit(metric),
            Self::Disconnected => Ok(0),
        }
    }

    fn flush(&self) -> io::Result<()> {
        match self {
            Self::Udp(sink) => sink.flush(),
            Self::BufferedUdp(sink) => sink.flush(),
            #[cfg(unix)]
            Self::Unix(sink) => sink.flush(),
            #[cfg(unix)]
            Self::BufferedUnix(sink) => sink.flush(),
            Self::Disconnected => Ok(()),
        }
    }
}

/// Last step of the aggregation pipeline, hands aggregated lines to a [`StatsdSink`].
///
/// The aggregator submits its lines in bursts once per flush interval. The burst is flushed on
/// the next poll, so buffered sinks never hold lines for longer than one interval.
pub struct SinkUpstream {
    sink: StatsdSink,
    pending: bool,
}

impl SinkUpstream {
    /// Creates the upstream writing into `sink`.
    pub fn new(sink: StatsdSink) -> Self {
        Self {
            sink,
            pending: false,
        }
    }
}

impl Middleware for SinkUpstream {
    fn submit(&mut self, metric: &mut Metric) {
        let Ok(line) = std::str::from_utf8(&metric.raw) else {
            tchannel_log::debug!("dropping statsd line that is not valid utf-8");
            return;
        };

        if let Err(error) = self.sink.emit(line) {
            tchannel_log::warn!("failed to send metrics to upstream: {error}");
        }
        self.pending = true;
    }

    fn poll(&mut self) {
        if !self.pending {
            return;
        }

        if let Err(error) = self.sink.flush() {
            tchannel_log::warn!("failed to flush metrics to upstream: {error}");
        }
        self.pending = false;
    }
}

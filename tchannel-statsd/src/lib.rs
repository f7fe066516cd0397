//! Stats for the TChannel RPC runtime, reported to StatsD.
//!
//! ## Composing Keys
//!
//! Statsd has no tags, so the caller, callee and endpoint of a call become segments of the key.
//! [`default_metric_prefix`] composes `tchannel.<name>.<caller>.<service>.<endpoint>` from a stat
//! name and its tags, [`connection_metric_key`] does the same for per-peer connection stats and
//! [`statsd_key`] picks between them. Every segment taken from a tag is passed through [`clean`],
//! which replaces characters that are meaningful to statsd with `-`.
//!
//! ## Reporting
//!
//! The runtime reports through the [`StatsReporter`] trait. [`StatsdReporter`] composes keys and
//! sends them through the global statsd client. Without a configured client, all stats are
//! dropped.
//!
//! To initialize the client, either use [`set_client`] to pass a custom client, or use [`init`]
//! to create a default client with known arguments:
//!
//! ```no_run
//! # use std::collections::BTreeMap;
//! use tchannel_statsd::{MetricsConfig, SampleRate};
//!
//! tchannel_statsd::init(MetricsConfig {
//!     prefix: String::new(),
//!     host: "localhost:8125".to_owned(),
//!     buffer_size: None,
//!     default_tags: BTreeMap::new(),
//!     sample_rate: SampleRate::default(),
//!     aggregate: true,
//! })
//! .ok();
//! ```
//!
//! ## Manual Usage
//!
//! Already composed keys can be sent through the current client directly:
//!
//! ```
//! tchannel_statsd::with_client(|client| {
//!     client.count("tchannel.connections.initiated.10-0-0-1", 1);
//! });
//! ```
#![warn(missing_docs)]

mod client;
mod key;
#[cfg(any(test, feature = "test"))]
mod recording;
mod reporter;
mod stats;
mod upstream;

pub use self::client::*;
pub use self::key::*;
#[cfg(any(test, feature = "test"))]
pub use self::recording::*;
pub use self::reporter::*;
pub use self::stats::*;
pub use self::upstream::{Delivery, StatsdSink, UpstreamAddr};

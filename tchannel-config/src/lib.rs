//! Configuration for logging and statsd reporting.
//!
//! The configuration is read from a `config.yml` file in a config folder and can be overridden
//! from environment variables:
//!
//! ```yaml
//! logging:
//!   level: info
//!   format: json
//! metrics:
//!   statsd: udp://127.0.0.1:8125
//!   hostname_tag: host
//!   sample_rate: 1.0
//! ```
#![warn(missing_docs)]

mod config;

pub use self::config::*;

//! Wires configuration, logging and statsd reporting together for the RPC runtime.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use tchannel_stats::{init_logging, init_metrics, load_config, reporter};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = load_config(Some(Path::new("config")))?;
//! init_logging(&config);
//! init_metrics(&config)?;
//!
//! let reporter = reporter(&config);
//! # let _ = reporter;
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

mod setup;

pub use self::setup::*;

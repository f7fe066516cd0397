use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tchannel_config::{Config, OverridableConfig};
use tchannel_statsd::{CommonTags, MetricsConfig, NullStatsReporter, StatsReporter, StatsdReporter};

/// Loads the config from `path` and applies overrides from the environment.
///
/// Without a path, the defaults are used and metrics stay disabled unless `TCHANNEL_STATSD` is
/// set.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    config
        .apply_override(OverridableConfig::from_env())
        .context("invalid override from environment")?;

    Ok(config)
}

/// Initializes the logging system and prints the effective setup.
///
/// Call this at startup, before spawning threads, see [`tchannel_log::init`].
pub fn init_logging(config: &Config) {
    tchannel_log::init(config.logging());
    dump_spawn_infos(config);
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        tchannel_log::info!("launching without config folder");
    } else {
        tchannel_log::info!("launching from config folder {}", config.path().display());
    }

    match config.statsd_addr() {
        Some(addr) => tchannel_log::info!("  statsd: {addr}"),
        None => tchannel_log::info!("  statsd: -"),
    };
    tchannel_log::info!("  log level: {}", config.logging().level);
}

/// Returns the local hostname, if it is valid UTF-8.
fn local_hostname() -> Option<String> {
    hostname::get().ok().and_then(|s| s.into_string().ok())
}

/// Initialize the metric system.
///
/// Does nothing if no statsd address is configured.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = local_hostname()
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    tchannel_statsd::init(MetricsConfig {
        prefix: config.metrics_prefix().to_owned(),
        host: host.to_owned(),
        buffer_size: config.metrics_buffer_size(),
        default_tags,
        sample_rate: f64::from(config.metrics_sample_rate()).into(),
        aggregate: config.metrics_aggregate(),
    })?;

    Ok(())
}

/// Returns the tags shared by all stats of this process.
pub fn common_tags(app: Option<&str>) -> CommonTags {
    CommonTags {
        app: app.map(str::to_owned),
        host: local_hostname(),
    }
}

/// Returns the reporter the runtime should report its stats to.
///
/// Stats are dropped when metrics are disabled.
pub fn reporter(config: &Config) -> Arc<dyn StatsReporter> {
    if config.statsd_addr().is_some() {
        Arc::new(StatsdReporter::new())
    } else {
        Arc::new(NullStatsReporter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_disabled() {
        let config = Config::default();
        init_metrics(&config).unwrap();
    }

    #[test]
    fn test_init_metrics_invalid_address() {
        let yaml = "metrics:\n  statsd: 'tcp://localhost:8125'\n";
        let config = Config::from_yaml_str(yaml).unwrap();
        let error = init_metrics(&config).unwrap_err();

        assert_eq!(
            error.to_string(),
            "invalid statsd address 'tcp://localhost:8125', \
             expected host:port, udp://host:port or unixgram://path"
        );
    }

    #[test]
    fn test_common_tags() {
        let tags = common_tags(Some("echo-server"));
        assert_eq!(tags.app.as_deref(), Some("echo-server"));
    }
}

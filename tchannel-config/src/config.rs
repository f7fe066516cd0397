use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::{env, fmt, fs, io};

use serde::{Deserialize, Serialize};
use tchannel_log::{Level, LogConfig};

/// Name of the config file inside the config folder.
const CONFIG_FILE_NAME: &str = "config.yml";

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override or a validated field.
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (from file {})", file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
        }
    }

    #[inline]
    fn field(field: &str) -> Self {
        Self {
            source: ConfigErrorSource::FieldOverride(field.to_owned()),
            kind: ConfigErrorKind::InvalidValue,
        }
    }

    #[inline]
    fn file(kind: ConfigErrorKind, p: impl AsRef<Path>) -> Self {
        Self {
            source: ConfigErrorSource::File(p.as_ref().to_path_buf()),
            kind,
        }
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.kind.source()
    }
}

/// Indicates config related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile(#[source] io::Error),
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml(#[source] serde_yaml::Error),
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
    /// Writing the config as YAML failed.
    #[error("could not serialize config to yaml")]
    CouldNotSerialize(#[source] serde_yaml::Error),
}

/// Values that can be overridden from environment variables.
///
/// Every field is the raw value of the variable, it is validated in [`Config::apply_override`].
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The statsd address, from `TCHANNEL_STATSD`.
    pub statsd: Option<String>,
    /// The outer metrics prefix, from `TCHANNEL_METRICS_PREFIX`.
    pub metrics_prefix: Option<String>,
    /// The log level, from `TCHANNEL_LOG_LEVEL`.
    pub log_level: Option<String>,
}

impl OverridableConfig {
    /// Reads the overrides from the environment of the current process.
    pub fn from_env() -> Self {
        Self {
            statsd: env::var("TCHANNEL_STATSD").ok(),
            metrics_prefix: env::var("TCHANNEL_METRICS_PREFIX").ok(),
            log_level: env::var("TCHANNEL_LOG_LEVEL").ok(),
        }
    }
}

/// Control the metrics.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Metrics {
    /// Address of the statsd server, `host:port`, `udp://host:port` or `unixgram:///path`.
    ///
    /// Defaults to `None`, which disables metrics.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Composed keys already start with `tchannel.`, so this defaults to `""`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    hostname_tag: Option<String>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    ///
    /// For example, a value of `0.3` means that only 30% of the emitted metrics will be sent.
    /// Defaults to `1.0` (100%).
    sample_rate: f32,
    /// Counters and gauges are aggregated before they are sent upstream.
    ///
    /// Defaults to `true`.
    aggregate: bool,
    /// Size of the datagrams sent to the statsd server when aggregating.
    ///
    /// Defaults to the sink's default. Without aggregation every metric is its own datagram.
    #[serde(skip_serializing_if = "Option::is_none")]
    buffer_size: Option<usize>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: String::new(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            sample_rate: 1.0,
            aggregate: true,
            buffer_size: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
}

impl ConfigValues {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.metrics.sample_rate) {
            return Err(ConfigError::field("metrics.sample_rate"));
        }

        Ok(())
    }
}

/// Config struct.
#[derive(Debug, Default)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// The folder must contain a `config.yml` file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let file_path = path.join(CONFIG_FILE_NAME);
        let contents = fs::read_to_string(&file_path)
            .map_err(|e| ConfigError::file(ConfigErrorKind::CouldNotOpenFile(e), &file_path))?;

        let values: ConfigValues = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::file(ConfigErrorKind::BadYaml(e), &file_path))?;
        values.validate()?;

        Ok(Config { values, path })
    }

    /// Creates a config from a YAML string.
    ///
    /// This is mostly useful for tests.
    pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
        let values: ConfigValues = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::new(ConfigErrorKind::BadYaml(e)))?;
        values.validate()?;

        Ok(Config {
            values,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from environment variables.
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(statsd) = overrides.statsd {
            self.values.metrics.statsd = if statsd.is_empty() {
                None
            } else {
                Some(statsd)
            };
        }

        if let Some(prefix) = overrides.metrics_prefix {
            self.values.metrics.prefix = prefix;
        }

        if let Some(level) = overrides.log_level {
            self.values.logging.level = level
                .parse::<Level>()
                .map_err(|_| ConfigError::field("logging.level"))?;
        }

        Ok(self)
    }

    /// Serializes the effective configuration back to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::new(ConfigErrorKind::CouldNotSerialize(e)))
    }

    /// Returns the folder this config was loaded from.
    ///
    /// Empty for configs not loaded with [`from_path`](Self::from_path).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the address of the statsd server, if metrics are enabled.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Return the prefix for statsd metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag that should be attached to each outgoing metric.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns the global sample rate for all metrics.
    pub fn metrics_sample_rate(&self) -> f32 {
        self.values.metrics.sample_rate
    }

    /// Returns true if counters and gauges are aggregated before sending.
    pub fn metrics_aggregate(&self) -> bool {
        self.values.metrics.aggregate
    }

    /// Returns the configured datagram size for statsd.
    pub fn metrics_buffer_size(&self) -> Option<usize> {
        self.values.metrics.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use tchannel_log::LogFormat;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.statsd_addr(), None);
        assert_eq!(config.metrics_prefix(), "");
        assert_eq!(config.metrics_sample_rate(), 1.0);
        assert!(config.metrics_aggregate());
        assert_eq!(config.logging().level, Level::Info);
    }

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml_str(
            r#"
logging:
  level: debug
  format: json
metrics:
  statsd: "udp://127.0.0.1:8125"
  default_tags:
    env: prod
  hostname_tag: host
  sample_rate: 0.5
  aggregate: false
  buffer_size: 1432
"#,
        )
        .unwrap();

        assert_eq!(config.statsd_addr(), Some("udp://127.0.0.1:8125"));
        assert_eq!(config.metrics_hostname_tag(), Some("host"));
        assert_eq!(config.metrics_sample_rate(), 0.5);
        assert!(!config.metrics_aggregate());
        assert_eq!(config.metrics_buffer_size(), Some(1432));
        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.logging().format, LogFormat::Json);
        assert_eq!(config.metrics_default_tags()["env"], "prod");
    }

    #[test]
    fn test_serialize_defaults() {
        let yaml = Config::default().to_yaml_string().unwrap();
        insta::assert_snapshot!(yaml, @r"
        logging:
          level: info
          format: auto
          enable_backtraces: false
        metrics:
          statsd: null
          prefix: ''
          default_tags: {}
          hostname_tag: null
          sample_rate: 1.0
          aggregate: true
        ");
    }

    #[test]
    fn test_error_kind_messages() {
        let yaml_error = || serde_yaml::from_str::<u32>("not a number").unwrap_err();

        assert_eq!(
            ConfigError::new(ConfigErrorKind::CouldNotSerialize(yaml_error())).to_string(),
            "could not serialize config to yaml"
        );
        assert_eq!(
            ConfigError::new(ConfigErrorKind::BadYaml(yaml_error())).to_string(),
            "could not parse yaml config file"
        );
    }

    #[test]
    fn test_invalid_sample_rate() {
        let error = Config::from_yaml_str("metrics:\n  sample_rate: 1.5\n").unwrap_err();
        assert!(matches!(error.kind(), ConfigErrorKind::InvalidValue));
        assert_eq!(
            error.to_string(),
            "invalid config value (field metrics.sample_rate)"
        );
    }

    #[test]
    fn test_bad_yaml() {
        let error = Config::from_yaml_str("metrics: [").unwrap_err();
        assert!(matches!(error.kind(), ConfigErrorKind::BadYaml(_)));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.yml"),
            "metrics:\n  statsd: localhost:8125\n  prefix: rpc\n",
        )
        .unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.statsd_addr(), Some("localhost:8125"));
        assert_eq!(config.metrics_prefix(), "rpc");
        assert_eq!(config.path(), dir.path());
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = Config::from_path(dir.path()).unwrap_err();

        assert!(matches!(error.kind(), ConfigErrorKind::CouldNotOpenFile(_)));
        assert!(error.to_string().starts_with("could not open config file (from file "));
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                statsd: Some("unixgram:///tmp/statsd.sock".to_owned()),
                metrics_prefix: Some("edge".to_owned()),
                log_level: Some("TRACE".to_owned()),
            })
            .unwrap();

        assert_eq!(config.statsd_addr(), Some("unixgram:///tmp/statsd.sock"));
        assert_eq!(config.metrics_prefix(), "edge");
        assert_eq!(config.logging().level, Level::Trace);
    }

    #[test]
    fn test_override_empty_statsd_disables_metrics() {
        let mut config = Config::from_yaml_str("metrics:\n  statsd: localhost:8125\n").unwrap();
        config
            .apply_override(OverridableConfig {
                statsd: Some(String::new()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.statsd_addr(), None);
    }

    #[test]
    fn test_override_invalid_level() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                log_level: Some("loud".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.to_string(), "invalid config value (field logging.level)");
    }
}
